//! Auto-checkout of abandoned attendance sessions.
//!
//! Student and staff cleanups run concurrently and independently: one failing
//! never prevents the other from closing its sessions.

use async_trait::async_trait;
use chrono::Duration;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::throttle::throttle;
use crate::config;
use crate::services::attendance_service::{AttendanceError, AttendanceService};
use crate::services::pin_service::PinService;
use crate::types::PersonKind;

/// Closes sessions left open longer than `stale_after`
#[async_trait]
pub trait StaleSessionCleaner: Send + Sync {
    async fn close_stale(&self, kind: PersonKind, stale_after: Duration) -> Result<u64, AttendanceError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupOutcome {
    pub kind: PersonKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub stale_after_minutes: i64,
    pub outcomes: Vec<CleanupOutcome>,
}

impl ReconcileReport {
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.error.is_none())
    }

    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.error.is_some())
    }

    pub fn total_closed(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.closed).sum()
    }
}

pub async fn reconcile<C>(cleaner: &C, stale_after: Duration) -> ReconcileReport
where
    C: StaleSessionCleaner + ?Sized,
{
    let runs = PersonKind::ALL.into_iter().map(|kind| async move {
        match cleaner.close_stale(kind, stale_after).await {
            Ok(closed) => CleanupOutcome {
                kind,
                closed: Some(closed),
                error: None,
            },
            Err(e) => {
                error!(kind = %kind, error = %e, "stale session cleanup failed");
                CleanupOutcome {
                    kind,
                    closed: None,
                    // Keep SQL detail in the log only
                    error: Some(match e {
                        AttendanceError::Database(_) => "database error".to_string(),
                        other => other.to_string(),
                    }),
                }
            }
        }
    });

    let report = ReconcileReport {
        stale_after_minutes: stale_after.num_minutes(),
        outcomes: join_all(runs).await,
    };

    if report.total_closed() > 0 {
        info!(closed = report.total_closed(), "auto-checked-out stale attendance sessions");
    }
    report
}

/// Spawn the periodic maintenance task: stale attendance cleanup plus expired PIN session purge.
pub fn spawn_maintenance_task(mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let interval_secs = config::config().attendance.reconcile_interval_secs.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("maintenance task shutting down");
                    break;
                }
                _ = interval.tick() => run_maintenance().await,
            }
        }
    })
}

async fn run_maintenance() {
    match AttendanceService::new().await {
        Ok(service) => {
            let report = reconcile(&service, service.stale_after()).await;
            if !report.all_ok() {
                warn!(?report, "attendance reconciliation incomplete");
            }
        }
        Err(e) => warn!(error = %e, "skipping attendance reconciliation"),
    }

    match PinService::new().await {
        Ok(service) => match service.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged expired PIN sessions"),
            Err(e) => error!(error = %e, "PIN session purge failed"),
        },
        Err(e) => warn!(error = %e, "skipping PIN session purge"),
    }

    let forgotten = throttle().sweep();
    if forgotten > 0 {
        debug!(forgotten, "dropped idle unlock throttle entries");
    }
}
