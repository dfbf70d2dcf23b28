use crate::execution::engine::ExecutionEngine;
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Drives the execution engine at fixed clock-minute offsets.
///
/// One recurring timer replaces the historical per-offset registrations; the
/// first tick is aligned to the next multiple of the interval within the
/// hour. Overlap prevention lives in the engine itself, which skips a tick
/// that would start while a prior scan is still running.
pub struct ScanScheduler {
    interval_minutes: u32,
    engine: Arc<ExecutionEngine>,
}

impl ScanScheduler {
    pub fn new(interval_minutes: u32, engine: Arc<ExecutionEngine>) -> Self {
        Self {
            interval_minutes: interval_minutes.max(1),
            engine,
        }
    }

    /// Start the recurring due scan (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let interval_minutes = self.interval_minutes;
        let engine = self.engine.clone();

        tokio::spawn(async move {
            let delay = delay_until_aligned_tick(Utc::now(), interval_minutes);
            info!(
                "⏰ First due scan in {}s, then every {} minute(s)",
                delay.as_secs(),
                interval_minutes
            );
            tokio::time::sleep(delay).await;

            let mut ticker = interval(Duration::from_secs(u64::from(interval_minutes) * 60));

            loop {
                // The first interval tick fires immediately, landing on the
                // aligned boundary.
                ticker.tick().await;

                match engine.run_due_scan().await {
                    Ok(summary) if summary.skipped => {}
                    Ok(summary) => debug!(
                        "Tick complete: {} scanned, {} finalized, {} deferred",
                        summary.scanned, summary.finalized, summary.deferred
                    ),
                    Err(e) => error!("❌ Due scan tick failed: {}", e),
                }
            }
        })
    }
}

/// Time until the next clock-minute multiple of `interval_minutes`
fn delay_until_aligned_tick(now: DateTime<Utc>, interval_minutes: u32) -> Duration {
    let interval_secs = i64::from(interval_minutes) * 60;
    let into_hour = i64::from(now.minute()) * 60 + i64::from(now.second());
    let remainder = into_hour % interval_secs;

    if remainder == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs((interval_secs - remainder) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn aligns_to_next_five_minute_offset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap();
        let delay = delay_until_aligned_tick(now, 5);
        // 10:07:30 -> 10:10:00
        assert_eq!(delay, Duration::from_secs(150));
    }

    #[test]
    fn already_aligned_fires_immediately() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap();
        assert_eq!(delay_until_aligned_tick(now, 5), Duration::ZERO);
    }

    #[test]
    fn hour_boundary_wraps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 58, 0).unwrap();
        // 10:58 -> 11:00 with a 5 minute cadence
        assert_eq!(delay_until_aligned_tick(now, 5), Duration::from_secs(120));
    }

    #[test]
    fn one_minute_cadence() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 12).unwrap();
        assert_eq!(delay_until_aligned_tick(now, 1), Duration::from_secs(48));
    }
}
