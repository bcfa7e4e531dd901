//! Group session check: every non-public route needs a live session cookie.

use axum::extract::Request;
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";

/// Value of `name` in the request's `Cookie` headers, if present.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

pub async fn require_session(
    Extension(state): Extension<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(token) = cookie_value(request.headers(), SESSION_COOKIE) else {
        return AppError::Unauthorized("Not authenticated").into_response();
    };

    match state.sessions.get_session(token).await {
        Ok(Some(session)) if session.is_live(state.clock.now()) => next.run(request).await,
        Ok(_) => AppError::Unauthorized("Session expired").into_response(),
        Err(e) => AppError::Core(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; session_token=abc123"));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn ignores_prefix_matches() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("session_token_old=zzz"));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), None);
    }
}
