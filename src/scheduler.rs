use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep_until};

pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval_ms: u64) -> Result<Self> {
        if interval_ms == 0 {
            return Err(anyhow::anyhow!("probe interval must be positive"));
        }
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
        })
    }

    /// Run `job` on every tick until ctrl-c. Rounds are spawned so a slow
    /// round never delays the next tick.
    pub async fn run<J, F>(&self, mut job: J) -> Result<()>
    where
        J: FnMut() -> F + Send + 'static,
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut next = Instant::now();
        loop {
            next += self.interval;
            tokio::spawn(job());
            tokio::select! {
                _ = sleep_until(next) => {}
                res = tokio::signal::ctrl_c() => {
                    res?;
                    tracing::info!("Shutdown signal received, stopping scheduler");
                    return Ok(());
                }
            }
        }
    }
}
