//! Every spam process launches at the same wall-clock moment: the next
//! 5-minute boundary, provided it leaves enough time to get ready.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tpsbench_core::CancellationToken;
use tracing::info;

pub const LAUNCH_INTERVAL_SECS: i64 = 5 * 60;
pub const MIN_LAUNCH_LEAD: Duration = Duration::from_secs(60);
const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    TooSoon,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LaunchPlan {
    At { at: DateTime<Utc>, wait: Duration },
    TooSoon { at: DateTime<Utc> },
}

/// First multiple of [`LAUNCH_INTERVAL_SECS`] strictly after `now`.
fn next_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = (now.timestamp().div_euclid(LAUNCH_INTERVAL_SECS) + 1) * LAUNCH_INTERVAL_SECS;
    DateTime::from_timestamp(next, 0).unwrap_or(now)
}

fn plan_launch(now: DateTime<Utc>) -> LaunchPlan {
    let at = next_boundary(now);
    let wait = (at - now).to_std().unwrap_or_default();
    if wait < MIN_LAUNCH_LEAD {
        LaunchPlan::TooSoon { at }
    } else {
        LaunchPlan::At { at, wait }
    }
}

/// Sleeps until the next launch boundary.
pub async fn wait_for_launch(cancel: &CancellationToken) -> LaunchOutcome {
    let now = Utc::now();
    info!("time now: {}", now.format(TIME_FMT));
    match plan_launch(now) {
        LaunchPlan::TooSoon { at } => {
            info!(
                "launch is too soon ({} is less than {:?} away), aborting",
                at.format(TIME_FMT),
                MIN_LAUNCH_LEAD
            );
            LaunchOutcome::TooSoon
        }
        LaunchPlan::At { at, wait } => {
            info!("scheduled at: {}", at.format(TIME_FMT));
            tokio::select! {
                _ = cancel.cancelled() => LaunchOutcome::Cancelled,
                _ = tokio::time::sleep(wait) => LaunchOutcome::Launched,
            }
        }
    }
}
