//! The signer pool: FIFO-fair scoped leases with per-key nonce tracking.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use keeper_chain::ChainClient;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::SignerError;

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct SignerPoolConfig {
    /// How long a caller waits for an idle signer before
    /// `PoolExhaustedTimeout`.
    pub acquire_timeout: Duration,
}

impl Default for SignerPoolConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(60),
        }
    }
}

/// One signing key's pooled state.
struct SignerSlot {
    index: usize,
    address: Address,
    /// Remembered next nonce; `None` forces a re-sync from the chain on
    /// the next lease.
    next_nonce: Option<u64>,
}

/// The lease view handed to a task.
///
/// A task reads `nonce()` for each submission and calls `advance()` once
/// that submission is confirmed; the final value is persisted on success.
pub struct SignerHandle {
    address: Address,
    nonce: AtomicU64,
}

impl SignerHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    /// The nonce to use for the next submission.
    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::Acquire)
    }

    /// Record one confirmed submission.
    pub fn advance(&self) {
        self.nonce.fetch_add(1, Ordering::AcqRel);
    }
}

struct PoolState {
    idle: VecDeque<SignerSlot>,
    waiters: VecDeque<oneshot::Sender<SignerSlot>>,
}

/// Fixed pool of pre-derived signing keys.
///
/// While a key is leased no other caller may use it; acquisition is served
/// in arrival order. Dropping a waiting or running `with_signer` future
/// (e.g. on shutdown) releases its place or its lease.
pub struct SignerPool {
    chain: Arc<dyn ChainClient>,
    state: Mutex<PoolState>,
    addresses: Vec<Address>,
    config: SignerPoolConfig,
}

impl SignerPool {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signers: &[PrivateKeySigner],
        config: SignerPoolConfig,
    ) -> Self {
        let addresses: Vec<Address> = signers.iter().map(|s| s.address()).collect();
        let idle = addresses
            .iter()
            .enumerate()
            .map(|(index, address)| SignerSlot {
                index,
                address: *address,
                next_nonce: None,
            })
            .collect();
        Self {
            chain,
            state: Mutex::new(PoolState {
                idle,
                waiters: VecDeque::new(),
            }),
            addresses,
            config,
        }
    }

    /// Number of configured signers.
    pub fn size(&self) -> usize {
        self.addresses.len()
    }

    /// Every pool address, for balance reporting.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Acquire an idle signer, run `task`, release on every exit path.
    ///
    /// Returns what `task` returned; the `asset` tag is used only for
    /// logging. On task failure the key is marked for nonce re-sync.
    pub async fn with_signer<T, E, F, Fut>(
        &self,
        asset: Option<&str>,
        task: F,
    ) -> Result<T, E>
    where
        E: From<SignerError>,
        F: FnOnce(Arc<SignerHandle>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.acquire().await?;

        // From here on the guard owns the slot: it goes back to the pool
        // (marked for re-sync) if this future is cancelled or panics.
        let mut guard = LeaseGuard {
            pool: self,
            slot: Some(slot),
        };

        // Sync the nonce before handing the key out.
        let (address, index, next_nonce) = {
            let slot = guard.slot.as_mut().expect("lease guard emptied early");
            if slot.next_nonce.is_none() {
                match self.chain.transaction_count(slot.address).await {
                    Ok(nonce) => slot.next_nonce = Some(nonce),
                    Err(e) => {
                        let address = slot.address;
                        // Guard drop releases the slot still unsynced.
                        drop(guard);
                        return Err(SignerError::NonceSync {
                            address: address.to_string(),
                            reason: e.to_string(),
                        }
                        .into());
                    }
                }
            }
            (slot.address, slot.index, slot.next_nonce.unwrap_or_default())
        };

        let handle = Arc::new(SignerHandle {
            address,
            nonce: AtomicU64::new(next_nonce),
        });

        debug!(
            signer = %handle.address(),
            index,
            asset = asset.unwrap_or("-"),
            "Signer leased"
        );

        let result = task(Arc::clone(&handle)).await;

        let mut slot = guard.slot.take().expect("lease guard emptied twice");
        std::mem::forget(guard);

        match &result {
            Ok(_) => slot.next_nonce = Some(handle.nonce()),
            Err(_) => {
                warn!(
                    signer = %handle.address(),
                    asset = asset.unwrap_or("-"),
                    "Task failed, marking key for nonce re-sync"
                );
                slot.next_nonce = None;
            }
        }
        self.release(slot);
        result
    }

    async fn acquire(&self) -> Result<SignerSlot, SignerError> {
        let mut rx = {
            let mut state = self.state.lock();
            if let Some(slot) = state.idle.pop_front() {
                return Ok(slot);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        match tokio::time::timeout(self.config.acquire_timeout, &mut rx).await {
            Ok(Ok(slot)) => Ok(slot),
            Ok(Err(_)) => Err(SignerError::PoolClosed),
            Err(_) => {
                // A release may have raced the timeout; hand the slot back
                // rather than leaking it.
                if let Ok(slot) = rx.try_recv() {
                    self.release(slot);
                }
                Err(SignerError::PoolExhaustedTimeout(
                    self.config.acquire_timeout,
                ))
            }
        }
    }

    fn release(&self, slot: SignerSlot) {
        let mut state = self.state.lock();
        let mut slot = slot;
        // Serve the oldest live waiter; skip waiters whose futures were
        // dropped (timeout or shutdown).
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(slot) {
                Ok(()) => return,
                Err(returned) => slot = returned,
            }
        }
        state.idle.push_back(slot);
    }
}

/// Releases a mid-task lease when the owning future is dropped.
struct LeaseGuard<'a> {
    pool: &'a SignerPool,
    slot: Option<SignerSlot>,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.next_nonce = None;
            self.pool.release(slot);
        }
    }
}
