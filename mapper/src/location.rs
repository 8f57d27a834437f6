use std::future::Future;

use shared::UserLocation;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("geolocation is not supported")]
    Unsupported,
}

/// One-shot device position query. Timeouts belong to the platform.
pub trait LocationProvider: Send + Sync {
    fn locate(&self) -> impl Future<Output = Result<UserLocation, LocationError>> + Send;
}

/// Always reports the same position; used for fixed installations where the
/// operator's location is configured rather than measured.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub UserLocation);

impl LocationProvider for FixedLocation {
    async fn locate(&self) -> Result<UserLocation, LocationError> {
        Ok(self.0)
    }
}

/// Provider for hosts with no positioning hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    async fn locate(&self) -> Result<UserLocation, LocationError> {
        Err(LocationError::Unsupported)
    }
}
