//! Per alert-kind rate limiting.
//!
//! [`CooldownTracker::allow`] is a pure read against alert history. Callers
//! that check and then record an alert hold the kind's guard from
//! [`CooldownTracker::lock`] across both steps, so two readings in flight
//! cannot both fire the same kind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::models::AlertKind;
use crate::store::AlertStore;

pub struct CooldownTracker {
    // ---
    alerts: Arc<dyn AlertStore>,
    locks: HashMap<AlertKind, Mutex<()>>,
}

impl CooldownTracker {
    // ---
    pub fn new(alerts: Arc<dyn AlertStore>) -> Self {
        // ---
        let locks = AlertKind::ALL
            .iter()
            .map(|kind| (*kind, Mutex::new(())))
            .collect();
        CooldownTracker { alerts, locks }
    }

    /// Serialize check-and-record for one kind. Other kinds are unaffected.
    pub async fn lock(&self, kind: AlertKind) -> MutexGuard<'_, ()> {
        // Every kind is seeded in `new`.
        self.locks[&kind].lock().await
    }

    /// `false` iff an alert of `kind` was created less than
    /// `cooldown_minutes` before `now`.
    pub async fn allow(
        &self,
        kind: AlertKind,
        now: DateTime<Utc>,
        cooldown_minutes: i64,
    ) -> Result<bool> {
        // ---
        let Some(last) = self.alerts.last_created(kind, now).await? else {
            return Ok(true);
        };

        let elapsed = now - last;
        let allowed = elapsed >= Duration::minutes(cooldown_minutes);
        if !allowed {
            tracing::debug!(
                "{} suppressed: last alert {}s ago, cooldown {} min",
                kind,
                elapsed.num_seconds(),
                cooldown_minutes
            );
        }
        Ok(allowed)
    }
}
