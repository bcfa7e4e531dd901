//! POST /auth/login: shared group credentials in, session cookie out.

use axum::extract::rejection::JsonRejection;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use passgate_core::types::GroupSession;
use passgate_core::PassGateError;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::session::SESSION_COOKIE;
use crate::state::AppState;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub expires_at: DateTime<Utc>,
}

pub fn new_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Strict");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub async fn login(
    Extension(state): Extension<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let config = &state.config;
    if body.username != config.group_username || body.password != config.group_password {
        tracing::info!("group login rejected");
        return Err(AppError::Unauthorized("Invalid credentials"));
    }

    let now = state.clock.now();
    let session = GroupSession {
        token: new_session_token(),
        created_at: now,
        expires_at: now + config.session_ttl,
    };
    state.sessions.create_session(&session).await?;

    let cookie = session_cookie(
        &session.token,
        config.session_ttl.num_seconds(),
        config.secure_cookies,
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| PassGateError::Internal(anyhow::anyhow!(e)))?;

    tracing::info!(expires_at = %session.expires_at, "group session opened");
    let mut response = Json(LoginResponse {
        success: true,
        expires_at: session.expires_at,
    })
    .into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_distinct() {
        let a = new_session_token();
        let b = new_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn cookie_attributes() {
        let plain = session_cookie("t", 60, false);
        assert_eq!(plain, "session_token=t; Path=/; Max-Age=60; HttpOnly; SameSite=Strict");
        assert!(session_cookie("t", 60, true).ends_with("; Secure"));
    }
}
