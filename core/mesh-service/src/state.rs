use crate::error::ServiceError;

/// `Idle → (init) → Initialized → (start) → Running → (stop) → Initialized`,
/// with `close()` terminal from either `Initialized` or `Running` (§4.10).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Initialized,
    Running,
    Closed,
}

impl ServiceState {
    pub fn check_init(&self) -> Result<(), ServiceError> {
        match self {
            ServiceState::Closed => Err(ServiceError::Closed),
            ServiceState::Running => Err(ServiceError::Running),
            ServiceState::Idle | ServiceState::Initialized => Ok(()),
        }
    }

    pub fn check_start(&self) -> Result<(), ServiceError> {
        match self {
            ServiceState::Closed => Err(ServiceError::Closed),
            ServiceState::Running => Err(ServiceError::Running),
            ServiceState::Idle => Err(ServiceError::NotInitialized),
            ServiceState::Initialized => Ok(()),
        }
    }

    pub fn check_stop(&self) -> Result<(), ServiceError> {
        match self {
            ServiceState::Running => Ok(()),
            ServiceState::Closed => Err(ServiceError::Closed),
            ServiceState::Idle | ServiceState::Initialized => Err(ServiceError::NotInitialized),
        }
    }

    /// Config fields that must be frozen while running (authCert,
    /// databaseConfig) are rejected with `Error::Running` here.
    pub fn check_frozen_config(&self) -> Result<(), ServiceError> {
        match self {
            ServiceState::Running => Err(ServiceError::Running),
            ServiceState::Closed => Err(ServiceError::Closed),
            ServiceState::Idle | ServiceState::Initialized => Ok(()),
        }
    }
}
