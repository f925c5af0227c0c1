use thiserror::Error;

use crate::mx::MxError;

/// Setup errors of the public entry points. Per-address failures are never
/// reported through this type; they live in the result map.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid sender address '{address}': expected local@domain")]
    InvalidSender { address: String },
    #[error(transparent)]
    Mx(#[from] MxError),
}

impl VerifyError {
    pub(crate) fn invalid_sender(address: &str) -> Self {
        Self::InvalidSender {
            address: address.to_string(),
        }
    }
}
