//! Session cookie, login-token and CSRF middleware.

use crate::error::{PanelError, ResetAuth};
use crate::form::{query_param, FormFields};
use crate::state::AppState;
use crate::token::{constant_time_eq, TokenStore};
use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "caravel_session";
pub const CSRF_FIELD: &str = "_csrf_token";
const MAX_FORM_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("No login token and session token found.")]
    NoServerToken,
    #[error(
        "Other instance of caravel is running elsewhere. \
         Log in using the URL printed to the terminal when it was started."
    )]
    NotLoggedIn,
}

/// How a request was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Bypassed,
    FromQuery,
    FromSession,
}

/// Id of the session attached to the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Decide whether a request may proceed.
///
/// A token in the query string takes precedence over the one remembered by
/// the session.
pub fn authorize(
    tokens: &TokenStore,
    query_token: Option<&str>,
    session_token: Option<&str>,
) -> Result<AuthOutcome, AuthError> {
    if tokens.is_debug() {
        return Ok(AuthOutcome::Bypassed);
    }
    match (query_token, session_token) {
        (Some(candidate), _) if tokens.matches(candidate) => Ok(AuthOutcome::FromQuery),
        (Some(_), _) => Err(AuthError::InvalidToken),
        (None, Some(candidate)) if tokens.matches(candidate) => Ok(AuthOutcome::FromSession),
        (None, Some(_)) => Err(AuthError::InvalidToken),
        (None, None) if tokens.token().is_none() => Err(AuthError::NoServerToken),
        (None, None) => Err(AuthError::NotLoggedIn),
    }
}

/// The submitted CSRF token must equal the one issued to the session.
pub fn verify_csrf(issued: Option<&str>, submitted: Option<&str>) -> Result<(), PanelError> {
    match (issued, submitted) {
        (Some(issued), Some(submitted))
            if !issued.is_empty() && constant_time_eq(issued.as_bytes(), submitted.as_bytes()) =>
        {
            Ok(())
        }
        _ => Err(PanelError::Csrf),
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Attach a session to every request and clear its login after failures
/// that were not handled.
pub async fn session_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie = cookie_value(request.headers(), SESSION_COOKIE).map(str::to_string);
    let (id, created) = state.open_session(cookie.as_deref()).await;
    request.extensions_mut().insert(SessionId(id.clone()));

    let mut response = next.run(request).await;

    if response.extensions().get::<ResetAuth>().is_some() {
        state.clear_auth(&id).await;
    }
    if created {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Strict", SESSION_COOKIE, id);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "could not encode session cookie"),
        }
    }
    response
}

/// Reject requests that do not prove knowledge of the server token.
pub async fn require_token(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let query_token = query_param(request.uri().query(), "token");
    let session_token = state.session_token(&id).await;

    match authorize(&state.tokens, query_token.as_deref(), session_token.as_deref()) {
        Ok(AuthOutcome::FromQuery) => {
            debug!(session = %id, "using token from the URL argument");
            if let Some(token) = query_token {
                state.set_session_token(&id, &token).await;
            }
        }
        Ok(outcome) => debug!(session = %id, ?outcome, "request authorized"),
        Err(e) => return PanelError::Auth(e).into_response(),
    }
    next.run(request).await
}

/// Check the CSRF token of every POST before any handler sees it.
pub async fn csrf_protect(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "could not read form body");
            return PanelError::Csrf.into_response();
        }
    };
    let form = FormFields::parse(&bytes);
    let issued = state.issued_csrf_token(&id).await;
    if let Err(e) = verify_csrf(issued.as_deref(), form.get(CSRF_FIELD)) {
        warn!(session = %id, path = %parts.uri.path(), "CSRF token mismatch");
        return e.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
