use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Progress callback, called with `(current, total)` in pieces.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

struct Shared {
    current: Mutex<u64>,
    total: u64,
    callback: Option<ProgressCallback>,
}

/// Shared piece counter.
///
/// Clones count into the same total. Each [`tick`](Progress::tick) bumps the
/// counter under the lock and reports the new value after releasing it, so
/// the callback may read [`current`](Progress::current) or tick again.
#[derive(Clone)]
pub struct Progress {
    shared: Arc<Shared>,
}

impl Progress {
    pub fn new(total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: Mutex::new(0),
                total,
                callback,
            }),
        }
    }

    /// A counter nobody listens to.
    pub fn silent() -> Self {
        Self::new(0, None)
    }

    pub fn tick(&self) {
        let current = {
            let mut guard = self.shared.current.lock();
            *guard += 1;
            *guard
        };
        if let Some(callback) = &self.shared.callback {
            callback(current, self.shared.total);
        }
    }

    pub fn current(&self) -> u64 {
        *self.shared.current.lock()
    }

    pub fn total(&self) -> u64 {
        self.shared.total
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("current", &self.current())
            .field("total", &self.shared.total)
            .finish()
    }
}
