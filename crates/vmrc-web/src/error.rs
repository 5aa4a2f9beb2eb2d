use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use vmrc_core::{CoreError, DirectoryError, TicketError};

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    /// An upstream (directory or console backend) failed.
    BadGateway(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg) | AppError::NotFound(msg) | AppError::BadGateway(msg) => msg,
            AppError::Internal(msg) => {
                // Log the real error server-side, return generic message to client
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = ErrorBody {
            success: false,
            error: message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{e:#}"))
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Ticket(TicketError::NotFound | TicketError::Expired) => {
                AppError::NotFound("Unknown or expired ticket".to_string())
            }
            CoreError::Ticket(TicketError::Duplicate) => {
                AppError::Internal("directory issued a ticket that is already pending".to_string())
            }
            CoreError::Directory(DirectoryError::ResourceNotFound(name)) => {
                AppError::NotFound(format!("No console named {name}"))
            }
            CoreError::Session(e) => {
                tracing::error!("Directory authentication failed: {e}");
                AppError::BadGateway("Console directory authentication failed".to_string())
            }
            CoreError::Directory(e) => {
                tracing::error!("Directory request failed: {e}");
                AppError::BadGateway("Console directory request failed".to_string())
            }
        }
    }
}
