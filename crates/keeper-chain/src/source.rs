//! Paged, retried event scanning.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use keeper_core::{params, ChainEvent, EventKind};
use tracing::{debug, warn};

use crate::client::ChainClient;
use crate::error::{ChainError, ChainResult};

/// Scan tuning.
#[derive(Debug, Clone)]
pub struct EventSourceConfig {
    /// Widest window a single `eth_getLogs` may cover.
    pub max_block_range: u64,
    /// Retries per window before the whole scan fails.
    pub max_retries: u32,
    /// Base backoff delay; doubles per attempt.
    pub backoff_base: Duration,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            max_block_range: params::MAX_EVENT_BLOCK_RANGE,
            max_retries: 5,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// Delivers contract events for any block range as one ordered sequence.
///
/// A scan either returns the full set for `[from_block, to_block]`, in
/// ascending `(block_number, log_index)` order, or fails with
/// `EventScanFailed`; there are no partial results.
pub struct EventSource {
    client: Arc<dyn ChainClient>,
    config: EventSourceConfig,
}

impl EventSource {
    pub fn new(client: Arc<dyn ChainClient>, config: EventSourceConfig) -> Self {
        Self { client, config }
    }

    pub async fn get_events(
        &self,
        contract: Address,
        kinds: &[EventKind],
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        if from_block > to_block {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut window_start = from_block;
        while window_start <= to_block {
            let window_end = to_block.min(window_start + self.config.max_block_range - 1);
            let chunk = self
                .scan_window(contract, kinds, window_start, window_end)
                .await?;
            events.extend(chunk);
            window_start = window_end + 1;
        }

        events.sort_by_key(ChainEvent::ordering_key);
        debug!(
            %contract,
            from_block,
            to_block,
            count = events.len(),
            "Event scan complete"
        );
        Ok(events)
    }

    async fn scan_window(
        &self,
        contract: Address,
        kinds: &[EventKind],
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let mut delay = self.config.backoff_base;
        let mut attempt = 0u32;
        loop {
            match self
                .client
                .get_events(contract, kinds, from_block, to_block)
                .await
            {
                Ok(events) => return Ok(events),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        %contract,
                        from_block,
                        to_block,
                        attempt,
                        error = %e,
                        "Transient scan error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    return Err(ChainError::EventScanFailed {
                        from_block,
                        to_block,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}
