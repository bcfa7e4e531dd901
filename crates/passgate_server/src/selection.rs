//! The "selected identity" a caller claims to act as.
//!
//! Requests carry it in the `x-selected-user-id` header, realtime events in a
//! `selected_user_id` field. Both go through [`parse_selected`] so a missing or
//! malformed selection is rejected identically on every transport.

use passgate_core::types::IdentityId;
use thiserror::Error;

pub const SELECTED_IDENTITY_HEADER: &str = "x-selected-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("No selected user")]
    Missing,
    #[error("Invalid user ID")]
    Invalid,
}

impl SelectionError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Missing => 401,
            Self::Invalid => 400,
        }
    }
}

pub fn parse_selected(raw: Option<&str>) -> Result<IdentityId, SelectionError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let raw = raw.ok_or(SelectionError::Missing)?;
    raw.parse::<i64>()
        .map(IdentityId)
        .map_err(|_| SelectionError::Invalid)
}

/// Realtime payloads may send the id as a number or a string.
pub fn parse_selected_json(raw: Option<&serde_json::Value>) -> Result<IdentityId, SelectionError> {
    match raw {
        None | Some(serde_json::Value::Null) => Err(SelectionError::Missing),
        Some(serde_json::Value::Number(n)) => n.as_i64().map(IdentityId).ok_or(SelectionError::Invalid),
        Some(serde_json::Value::String(s)) => parse_selected(Some(s)),
        Some(_) => Err(SelectionError::Invalid),
    }
}
