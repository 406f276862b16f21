//! Cancellable periodic task driving the accessory.

use log::warn;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Periodic task tied to the lifetime of its owner.
///
/// The first tick fires one full period after spawning. The task stops when
/// cancelled, when the timer is dropped, or when the tick callback returns
/// `false`.
pub struct PushTimer {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PushTimer {
    /// Spawn the timer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime or with a zero `period`.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Request cancellation without waiting for the task.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel the task and wait until it has stopped.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
            && e.is_panic()
        {
            warn!("[Timer] Push task panicked: {}", e);
        }
    }
}

impl Drop for PushTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_timer(period: Duration) -> (PushTimer, Arc<AtomicU32>) {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let timer = PushTimer::spawn(period, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        (timer, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (timer, ticks) = counting_timer(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticks() {
        let (timer, ticks) = counting_timer(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        timer.shutdown().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (timer, ticks) = counting_timer(Duration::from_secs(1));
        drop(timer);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_stop_timer() {
        let timer = PushTimer::spawn(Duration::from_secs(1), || false);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!timer.is_running());
    }
}
