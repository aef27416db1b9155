use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::runtime;

/// Trailing-edge debounce: of a burst of calls, only the last one wins.
///
/// Clones share the same burst.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the delay. `true` if no other `wait` or `cancel` happened
    /// in the meantime.
    pub async fn wait(&self) -> bool {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        runtime::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Invalidate every pending `wait`.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
