//! Lobby request/reply wire format
//!
//! Requests are one JSON object per line, tagged by `action`. Replies are a
//! literal status token per line, except a successful login which carries the
//! presence snapshot as a JSON object.

use crate::storage::{PresenceRecord, StatusDelta};
use serde::{Deserialize, Serialize};

/// A request from a peer to the lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LobbyRequest {
    Register { username: String, password: String },
    Login { username: String, password: String },
    StatusReport {
        username: String,
        #[serde(default)]
        status: StatusDelta,
    },
    Logout { username: String },
}

impl LobbyRequest {
    pub fn username(&self) -> &str {
        match self {
            LobbyRequest::Register { username, .. }
            | LobbyRequest::Login { username, .. }
            | LobbyRequest::StatusReport { username, .. }
            | LobbyRequest::Logout { username } => username,
        }
    }

    /// Serialize as one newline-terminated line
    pub fn to_line(&self) -> String {
        // Serializing a derived enum of strings and integers cannot fail.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// Result of decoding one request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRequest {
    Request(LobbyRequest),
    /// Valid JSON object with an `action` this lobby does not handle
    UnknownAction(String),
    /// Not JSON, or a known action with missing/invalid fields
    Malformed(String),
}

/// Decode one request line
pub fn decode_request(line: &str) -> DecodedRequest {
    let value: serde_json::Value = match serde_json::from_str(line.trim()) {
        Ok(value) => value,
        Err(e) => return DecodedRequest::Malformed(e.to_string()),
    };

    let action = value
        .get("action")
        .and_then(|a| a.as_str())
        .unwrap_or_default()
        .to_string();

    if !matches!(
        action.as_str(),
        "register" | "login" | "status_report" | "logout"
    ) {
        return DecodedRequest::UnknownAction(action);
    }

    match serde_json::from_value(value) {
        Ok(request) => DecodedRequest::Request(request),
        Err(e) => DecodedRequest::Malformed(e.to_string()),
    }
}

/// A reply from the lobby
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyReply {
    RegisterSuccess,
    RegisterFailedUserExists,
    RegisterFailed,
    LoginSuccess(PresenceRecord),
    LoginFailedNoUser,
    LoginFailedWrongPassword,
    LoginFailedDuplicate,
    LoginFailed,
    LogoutOk,
    ErrorUnknownAction,
}

#[derive(Serialize, Deserialize)]
struct LoginSuccess {
    #[serde(rename = "type")]
    kind: String,
    status: PresenceRecord,
}

const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";

impl LobbyReply {
    fn token(&self) -> &'static str {
        match self {
            LobbyReply::RegisterSuccess => "REGISTER_SUCCESS",
            LobbyReply::RegisterFailedUserExists => "REGISTER_FAILED_USER_EXISTS",
            LobbyReply::RegisterFailed => "REGISTER_FAILED",
            LobbyReply::LoginSuccess(_) => LOGIN_SUCCESS,
            LobbyReply::LoginFailedNoUser => "LOGIN_FAILED_NO_USER",
            LobbyReply::LoginFailedWrongPassword => "LOGIN_FAILED_WRONG_PASSWORD",
            LobbyReply::LoginFailedDuplicate => "LOGIN_FAILED_DUPLICATE",
            LobbyReply::LoginFailed => "LOGIN_FAILED",
            LobbyReply::LogoutOk => "LOGOUT_OK",
            LobbyReply::ErrorUnknownAction => "ERROR_UNKNOWN_ACTION",
        }
    }

    /// Serialize as one newline-terminated line
    pub fn to_line(&self) -> String {
        let mut line = match self {
            LobbyReply::LoginSuccess(status) => serde_json::to_string(&LoginSuccess {
                kind: LOGIN_SUCCESS.to_string(),
                status: status.clone(),
            })
            .unwrap_or_else(|_| LOGIN_SUCCESS.to_string()),
            other => other.token().to_string(),
        };
        line.push('\n');
        line
    }

    /// Parse one reply line; `None` for anything unrecognised
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.starts_with('{') {
            let success: LoginSuccess = serde_json::from_str(line).ok()?;
            return (success.kind == LOGIN_SUCCESS).then_some(LobbyReply::LoginSuccess(success.status));
        }
        let reply = match line {
            "REGISTER_SUCCESS" => LobbyReply::RegisterSuccess,
            "REGISTER_FAILED_USER_EXISTS" => LobbyReply::RegisterFailedUserExists,
            "REGISTER_FAILED" => LobbyReply::RegisterFailed,
            "LOGIN_FAILED_NO_USER" => LobbyReply::LoginFailedNoUser,
            "LOGIN_FAILED_WRONG_PASSWORD" => LobbyReply::LoginFailedWrongPassword,
            "LOGIN_FAILED_DUPLICATE" => LobbyReply::LoginFailedDuplicate,
            "LOGIN_FAILED" => LobbyReply::LoginFailed,
            "LOGOUT_OK" => LobbyReply::LogoutOk,
            "ERROR_UNKNOWN_ACTION" => LobbyReply::ErrorUnknownAction,
            _ => return None,
        };
        Some(reply)
    }
}
