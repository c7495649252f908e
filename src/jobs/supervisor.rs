//! Supervised periodic tasks.
//!
//! Each tick runs in its own spawned task so a panic inside one tick is
//! caught at the join point, logged, and the ticker keeps going.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Spawn `task` to run immediately and then every `period`
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, period_secs = period.as_secs(), "Periodic job started");

        loop {
            ticker.tick().await;

            match tokio::spawn(task()).await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    error!(job = name, "Periodic job panicked, will run again next tick");
                }
                Err(e) => {
                    error!(job = name, error = %e, "Periodic job was cancelled");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_does_not_stop_job() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        let handle = spawn_periodic("flaky", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                if run == 0 {
                    panic!("first tick blows up");
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(!handle.is_finished());
        handle.abort();
    }
}
