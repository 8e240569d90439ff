/*
    identity.rs - Process-lifetime identity values

    Four well-known keys shared with the telemetry collaborator:

    - instance id and first session date are written once ever
    - current session date is rewritten on every gateway initialization,
      and the value it replaces moves to last session date
*/

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core_storage::{StorageBackend, StorageResult};

pub const INSTANCE_ID_KEY: &str = "telemetry.instanceId";
pub const FIRST_SESSION_DATE_KEY: &str = "telemetry.firstSessionDate";
pub const LAST_SESSION_DATE_KEY: &str = "telemetry.lastSessionDate";
pub const CURRENT_SESSION_DATE_KEY: &str = "telemetry.currentSessionDate";

/// Seed the identity keys using the current time
pub async fn seed_identity(storage: &dyn StorageBackend) -> StorageResult<()> {
    seed_identity_at(storage, Utc::now()).await
}

/// Seed the identity keys as of `now`
pub async fn seed_identity_at(storage: &dyn StorageBackend, now: DateTime<Utc>) -> StorageResult<()> {
    if storage.get(INSTANCE_ID_KEY).is_none() {
        storage
            .store(INSTANCE_ID_KEY, &Uuid::new_v4().to_string())
            .await?;
    }

    let session_date = format_session_date(now);

    if storage.get(FIRST_SESSION_DATE_KEY).is_none() {
        storage.store(FIRST_SESSION_DATE_KEY, &session_date).await?;
    }

    // No previous session means no last session.
    match storage.get(CURRENT_SESSION_DATE_KEY) {
        Some(previous) => storage.store(LAST_SESSION_DATE_KEY, &previous).await?,
        None => storage.remove(LAST_SESSION_DATE_KEY).await?,
    }

    storage.store(CURRENT_SESSION_DATE_KEY, &session_date).await
}

/// HTTP-date style UTC stamp, e.g. `Wed, 14 Oct 2026 09:30:00 GMT`
pub fn format_session_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
