//! Periodic background loops with cooperative shutdown.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns the background loops of a node.
///
/// Every loop shares one `watch` shutdown channel and only observes it
/// between iterations, so an iteration in progress always completes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
/// use agentmesh::BackgroundTasks;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ticks = Arc::new(AtomicUsize::new(0));
/// let mut tasks = BackgroundTasks::new();
/// let counter = Arc::clone(&ticks);
/// tasks.spawn_periodic("count", Duration::from_millis(5), move || {
///     let counter = Arc::clone(&counter);
///     async move {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// tokio::time::sleep(Duration::from_millis(20)).await;
/// tasks.shutdown().await;
/// assert!(ticks.load(Ordering::SeqCst) >= 1);
/// # }
/// ```
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    /// Creates an empty task set.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawns a loop that runs `tick` immediately and then every `period`.
    ///
    /// Missed ticks are delayed rather than burst. A panicking iteration is
    /// logged and the loop carries on with the next tick.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if `period` is zero.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(task = name, ?period, "background task started");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {
                        if let Err(panic) = AssertUnwindSafe(tick()).catch_unwind().await {
                            tracing::error!(
                                task = name,
                                panic = panic_message(panic.as_ref()),
                                "background task iteration panicked"
                            );
                        }
                    }
                }
            }

            tracing::info!(task = name, "background task stopped");
        });
        self.handles.push((name, handle));
    }

    /// Number of spawned loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no loop was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signals every loop to stop and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "background task failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn runs_on_cadence_until_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();
        let counter = Arc::clone(&ticks);
        tasks.spawn_periodic("test", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        tasks.shutdown().await;

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_a_panicking_iteration() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();
        let counter = Arc::clone(&ticks);
        tasks.spawn_periodic("flaky", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first iteration fails");
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        tasks.shutdown().await;

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panic_payloads_render() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(text.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn shutdown_with_no_tasks() {
        let tasks = BackgroundTasks::new();
        assert!(tasks.is_empty());
        assert!(!tasks.is_shutting_down());
        tasks.shutdown().await;
    }
}
