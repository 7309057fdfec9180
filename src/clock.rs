//! Monotonic time sources.
//! 单调时钟源。

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// A monotonic clock.
///
/// 单调时钟。
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The runtime clock. Honors tokio's paused time in tests.
///
/// 运行时时钟。在测试中遵循tokio的暂停时间。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one to a component and keep
/// advancing the other.
///
/// 只有在被告知时才会前进的时钟。
/// 克隆体共享同一时间，因此测试可以把一个交给组件，同时继续推进另一个。
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward by `delta`.
    /// 将时钟向前推进 `delta`。
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
