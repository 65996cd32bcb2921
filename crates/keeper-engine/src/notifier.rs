//! Operator notification seam.

/// Out-of-band operator alerts (order evicted, signer drained, ...).
///
/// The default implementation logs; deployments may plug in a chat client
/// without touching keeper logic.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that emits a warn-level log line.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::warn!(target: "keeper::notify", "{message}");
    }
}
