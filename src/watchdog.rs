//! Keep-alive watchdog: fires a callback once if not kicked within its
//! window, and is inert afterward.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

struct State {
    deadline: Instant,
    active: bool,
}

/// A resettable timer. `kick` pushes the deadline back out to `expire`
/// from now; once the callback has fired (or `stop` was called), further
/// kicks are no-ops.
pub struct Watchdog {
    expire: Duration,
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Watchdog {
    #[must_use]
    pub fn new(expire: Duration, callback: impl FnOnce() + Send + 'static) -> Self {
        let state = Arc::new(Mutex::new(State {
            deadline: Instant::now() + expire,
            active: true,
        }));
        let notify = Arc::new(Notify::new());

        let task_state = state.clone();
        let task_notify = notify.clone();
        let task = tokio::spawn(async move {
            let mut callback = Some(callback);
            loop {
                let deadline = {
                    let guard = task_state.lock().unwrap();
                    if !guard.active {
                        return;
                    }
                    guard.deadline
                };
                tokio::select! {
                    () = sleep_until(deadline) => {
                        let mut guard = task_state.lock().unwrap();
                        if !guard.active {
                            return;
                        }
                        if guard.deadline > Instant::now() {
                            continue;
                        }
                        guard.active = false;
                        drop(guard);
                        if let Some(cb) = callback.take() {
                            cb();
                        }
                        return;
                    }
                    () = task_notify.notified() => {}
                }
            }
        });

        Self {
            expire,
            state,
            notify,
            task,
        }
    }

    /// Resets the deadline to `expire` from now. No-op if the watchdog has
    /// already fired or been stopped.
    pub fn kick(&self) {
        let mut guard = self.state.lock().unwrap();
        if !guard.active {
            return;
        }
        guard.deadline = Instant::now() + self.expire;
        drop(guard);
        self.notify.notify_one();
    }

    /// Cancels the watchdog. Returns `true` if it was still active.
    pub fn stop(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        if !guard.active {
            return false;
        }
        guard.active = false;
        drop(guard);
        self.notify.notify_one();
        self.task.abort();
        true
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_window_elapses() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let _wd = Watchdog::new(Duration::from_millis(50), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn kick_pushes_the_deadline_back() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let wd = Watchdog::new(Duration::from_millis(50), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(30)).await;
        wd.kick();
        tokio::time::advance(Duration::from_millis(30)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::advance(Duration::from_millis(30)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_the_callback() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let wd = Watchdog::new(Duration::from_millis(50), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });
        assert!(wd.stop());
        assert!(!wd.stop());
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
