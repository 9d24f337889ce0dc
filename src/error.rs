//! Error taxonomy shared by every handler, and its HTML rendering.

use crate::guard::AuthError;
use crate::project::ProjectError;
use crate::views;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

/// Marker placed on responses whose failure must log the session out.
///
/// The session layer looks for it after the handler ran and drops the
/// `token` and `csrf_token` slots.
#[derive(Debug, Clone, Copy)]
pub struct ResetAuth;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("The CSRF token is invalid")]
    Csrf,
    #[error("{0}")]
    Config(String),
    #[error("No project selected. Pick a project on the start page first.")]
    NoProjectSelected,
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Option {option} is not available for action {action}")]
    UnknownOption { action: String, option: String },
    #[error("Failed to run {tool}: {source}")]
    ExternalTool {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Missing form field: {0}")]
    MissingField(&'static str),
    #[error("Not found")]
    NotFound,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PanelError {
    pub fn status(&self) -> StatusCode {
        match self {
            PanelError::Auth(_) => StatusCode::UNAUTHORIZED,
            PanelError::Csrf => StatusCode::FORBIDDEN,
            PanelError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PanelError::NoProjectSelected => StatusCode::CONFLICT,
            PanelError::Project(ProjectError::UnknownSubproject { .. }) => StatusCode::BAD_REQUEST,
            PanelError::Project(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PanelError::UnknownAction(_)
            | PanelError::UnknownOption { .. }
            | PanelError::MissingField(_) => StatusCode::BAD_REQUEST,
            PanelError::ExternalTool { .. } => StatusCode::BAD_GATEWAY,
            PanelError::NotFound => StatusCode::NOT_FOUND,
            PanelError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only failures nobody planned for reset authentication.
    pub fn resets_auth(&self) -> bool {
        matches!(self, PanelError::Internal(_))
    }
}

impl From<tokio::task::JoinError> for PanelError {
    fn from(e: tokio::task::JoinError) -> Self {
        PanelError::Internal(format!("worker task failed: {}", e))
    }
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = views::error_page(status, &[self.to_string()]);
        let mut response = (status, Html(body)).into_response();
        if self.resets_auth() {
            response.extensions_mut().insert(ResetAuth);
        }
        response
    }
}

/// Response for a handler that panicked, used by the catch-panic layer.
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    PanelError::Internal(detail).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_carry_the_reset_marker() {
        let response = PanelError::Internal("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ResetAuth>().is_some());
    }

    #[test]
    fn config_errors_do_not_log_the_user_out() {
        let response = PanelError::Config("manifest missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ResetAuth>().is_none());
    }

    #[test]
    fn unknown_subproject_is_a_client_error() {
        let err = PanelError::Project(ProjectError::UnknownSubproject {
            name: "nope".into(),
            available: vec!["small".into()],
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn panic_payload_becomes_internal_error() {
        let response = panic_response(Box::new("handler exploded"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ResetAuth>().is_some());
    }
}
