use axum::http::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("device '{0}' is offline")]
    DeviceOffline(String),
}

impl CommandError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CommandError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            CommandError::DeviceOffline(_) => StatusCode::CONFLICT,
        }
    }
}
