//! Trailing-edge debounce over a watch channel.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Yields a channel's value once it has stopped changing for `window`.
pub struct Debounced<T> {
    rx: watch::Receiver<T>,
    window: Duration,
}

impl<T: Clone> Debounced<T> {
    pub fn new(rx: watch::Receiver<T>, window: Duration) -> Self {
        Self { rx, window }
    }

    /// Wait for the next change, then for a quiet period; return the latest value.
    ///
    /// Every change during the quiet period restarts it. Returns `None` once the
    /// sender is gone and no change is pending.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;

        let mut deadline = Instant::now() + self.window;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    deadline = Instant::now() + self.window;
                }
            }
        }

        Some(self.rx.borrow_and_update().clone())
    }
}
