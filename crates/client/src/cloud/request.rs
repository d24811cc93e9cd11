//! Cloud API request bodies.

use flagline_core::PendingUpload;
use serde::Serialize;

/// Largest batch the submit endpoint accepts.
pub const MAX_SUBMIT_BATCH: usize = 50;

/// Body of `POST /submit`.
#[derive(Debug, Serialize)]
pub struct SubmitRequest<'a> {
    pub users: &'a [PendingUpload],
}

impl SubmitRequest<'_> {
    /// Validate the batch before it is sent.
    pub fn validate(&self) -> Result<(), crate::ClientError> {
        if self.users.is_empty() {
            return Err(crate::ClientError::InvalidInput("submit batch is empty".to_string()));
        }
        if self.users.len() > MAX_SUBMIT_BATCH {
            return Err(crate::ClientError::InvalidInput(format!(
                "submit batch too large: {} entries (max {MAX_SUBMIT_BATCH})",
                self.users.len()
            )));
        }
        for user in self.users {
            crate::validate_handle(&user.username)?;
            if user.location.trim().is_empty() {
                return Err(crate::ClientError::InvalidInput(format!("{}: empty location", user.username)));
            }
        }
        Ok(())
    }
}

/// Body of `POST /verify-license`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequest<'a> {
    pub license_key: &'a str,
}
