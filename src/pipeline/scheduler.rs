use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// When to invoke a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Once,
    Every(Duration),
}

impl Schedule {
    /// `0` or negative means a single run.
    pub fn from_interval_seconds(interval_seconds: i64) -> Self {
        match u64::try_from(interval_seconds) {
            Ok(secs) if secs > 0 => Schedule::Every(Duration::from_secs(secs)),
            _ => Schedule::Once,
        }
    }
}

/// Drives `job` according to `schedule`.
///
/// `Once` returns the job's own result. `Every` keeps going after a failed run
/// (the next tick is the retry) and returns `Ok(())` once `shutdown` resolves;
/// shutdown is only observed between runs, never in the middle of one.
pub async fn run_scheduled<F, Fut, T, S>(schedule: Schedule, shutdown: S, mut job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    let interval = match schedule {
        Schedule::Once => return job().await.map(|_| ()),
        Schedule::Every(interval) => interval,
    };

    tokio::pin!(shutdown);
    let mut tick: u64 = 0;
    loop {
        tick += 1;
        if let Err(e) = job().await {
            warn!(tick, "Scheduled run failed, next attempt in {}s: {}", interval.as_secs(), e);
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => {
                info!(tick, "Shutdown requested, stopping scheduler");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parsing() {
        assert_eq!(Schedule::from_interval_seconds(0), Schedule::Once);
        assert_eq!(Schedule::from_interval_seconds(-5), Schedule::Once);
        assert_eq!(
            Schedule::from_interval_seconds(60),
            Schedule::Every(Duration::from_secs(60))
        );
    }
}
