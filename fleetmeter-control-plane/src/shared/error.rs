use fleetmeter_core::CoreError;
use thiserror::Error;

/// Control plane specific errors
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Unknown capacity pool: {0}")]
    UnknownPool(String),
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Service not found: {0}")]
    ServiceNotFound(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Event handler failed: {0}")]
    HandlerFailed(String),
    #[error("Event router closed: {0}")]
    RouterClosed(String),
}

impl ControlPlaneError {
    /// Placement could not be satisfied by the pool. Never fatal for reconciliation.
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::UnknownPool(_) | ControlPlaneError::CapacityExhausted(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::TaskNotFound(_) | ControlPlaneError::ServiceNotFound(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ControlPlaneError::InvalidRequest(_) => "INVALID_REQUEST",
            ControlPlaneError::ValidationError(_) => "VALIDATION_ERROR",
            ControlPlaneError::UnknownPool(_) => "UNKNOWN_POOL",
            ControlPlaneError::CapacityExhausted(_) => "CAPACITY_EXHAUSTED",
            ControlPlaneError::TaskNotFound(_) => "TASK_NOT_FOUND",
            ControlPlaneError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            ControlPlaneError::StorageError(_) => "STORAGE_ERROR",
            ControlPlaneError::HandlerFailed(_) => "HANDLER_FAILED",
            ControlPlaneError::RouterClosed(_) => "ROUTER_CLOSED",
        }
    }
}

impl From<CoreError> for ControlPlaneError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownPool(msg) => ControlPlaneError::UnknownPool(msg),
            CoreError::CapacityExhausted(msg) => ControlPlaneError::CapacityExhausted(msg),
            CoreError::InvalidTaskId(msg) => ControlPlaneError::InvalidRequest(msg),
            CoreError::SerializationError(msg) => ControlPlaneError::InvalidRequest(msg),
            CoreError::InvalidWorkload(msg) | CoreError::InvalidStatus(msg) => {
                ControlPlaneError::ValidationError(msg)
            }
        }
    }
}

impl From<ControlPlaneError> for fleetmeter_core::ErrorResponse {
    fn from(err: ControlPlaneError) -> Self {
        let message = match &err {
            ControlPlaneError::InvalidRequest(msg)
            | ControlPlaneError::ValidationError(msg)
            | ControlPlaneError::UnknownPool(msg)
            | ControlPlaneError::CapacityExhausted(msg)
            | ControlPlaneError::TaskNotFound(msg)
            | ControlPlaneError::ServiceNotFound(msg)
            | ControlPlaneError::StorageError(msg)
            | ControlPlaneError::HandlerFailed(msg)
            | ControlPlaneError::RouterClosed(msg) => msg.clone(),
        };

        fleetmeter_core::ErrorResponse::new(err.error_code(), message)
    }
}

pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;

pub(crate) fn lock_poisoned() -> ControlPlaneError {
    ControlPlaneError::StorageError("Lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_plane_error_creation() {
        let err = ControlPlaneError::InvalidRequest("test".to_string());
        assert!(err.to_string().contains("Invalid request"));
    }

    #[test]
    fn test_capacity_errors_are_classified() {
        assert!(ControlPlaneError::UnknownPool("spot".to_string()).is_capacity_error());
        assert!(ControlPlaneError::CapacityExhausted("fixed".to_string()).is_capacity_error());
        assert!(!ControlPlaneError::TaskNotFound("abc".to_string()).is_capacity_error());
    }

    #[test]
    fn test_not_found_errors_are_classified() {
        assert!(ControlPlaneError::TaskNotFound("abc".to_string()).is_not_found());
        assert!(ControlPlaneError::ServiceNotFound("web".to_string()).is_not_found());
        assert!(!ControlPlaneError::StorageError("x".to_string()).is_not_found());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: ControlPlaneError = CoreError::CapacityExhausted("fixed-pool".to_string()).into();
        assert!(matches!(err, ControlPlaneError::CapacityExhausted(_)));

        let err: ControlPlaneError = CoreError::InvalidWorkload("cpu".to_string()).into();
        assert!(matches!(err, ControlPlaneError::ValidationError(_)));
    }

    #[test]
    fn test_control_plane_error_conversion_to_error_response() {
        let err = ControlPlaneError::TaskNotFound("abc".to_string());
        let error_response: fleetmeter_core::ErrorResponse = err.into();
        assert_eq!(error_response.error_code, "TASK_NOT_FOUND");
        assert_eq!(error_response.message, "abc");
    }

    #[test]
    fn test_control_plane_result_type() {
        type TestResult = ControlPlaneResult<String>;
        let ok: TestResult = Ok("success".to_string());
        let err: TestResult = Err(ControlPlaneError::HandlerFailed("boom".to_string()));

        assert_eq!(ok.unwrap(), "success");
        assert_eq!(err.unwrap_err().to_string(), "Event handler failed: boom");
    }
}
