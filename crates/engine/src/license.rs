//! License verification.
//!
//! The last verdict from the cloud is kept in the settings table so a
//! startup without network access keeps the previous status.

use flagline_client::CloudApi;
use flagline_core::StateDb;

/// Settings key holding the last known verdict.
pub const LICENSE_STATUS_KEY: &str = "license_status";

/// Verify `license_key` and persist the verdict.
///
/// No key means unlicensed. When the cloud cannot be reached the persisted
/// verdict is used instead.
pub async fn check_license(cloud: &dyn CloudApi, db: &StateDb, license_key: Option<&str>) -> bool {
    let Some(key) = license_key else {
        return false;
    };

    match cloud.verify_license(key).await {
        Ok(valid) => {
            if let Err(e) = db.set_setting(LICENSE_STATUS_KEY, if valid { "valid" } else { "invalid" }).await {
                tracing::warn!(error = %e, "could not persist license status");
            }
            tracing::info!(valid, "license verified");
            valid
        }
        Err(e) => {
            let stored = match db.get_setting(LICENSE_STATUS_KEY).await {
                Ok(value) => value.is_some_and(|v| v == "valid"),
                Err(err) => {
                    tracing::warn!(error = %err, "could not read license status");
                    false
                }
            };
            tracing::warn!(error = %e, stored, "license verification failed; using last known status");
            stored
        }
    }
}
