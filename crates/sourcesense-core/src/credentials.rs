//! Credential payload normalization
//!
//! Callers send credentials either nested (`{"credentials": {"token": ..}}`)
//! or flat (`{"token": ..}`). Both shapes normalize to one [`Credentials`].

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Keys that mark a flat credential payload
const CREDENTIAL_KEYS: &[&str] = &["token", "username", "password"];

/// Credential loading errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Credentials payload is empty or malformed")]
    Malformed,

    #[error("Missing credential field '{0}'")]
    MissingField(&'static str),
}

/// Normalized credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Remaining string-valued fields (e.g. `host`, `sslmode`)
    pub extra: BTreeMap<String, String>,
}

impl Credentials {
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Normalize a nested or flat payload
    pub fn from_payload(payload: &Value) -> Result<Self, CredentialError> {
        let object = payload.as_object().ok_or(CredentialError::Malformed)?;

        let source = if CREDENTIAL_KEYS.iter().any(|key| object.contains_key(*key)) {
            object
        } else {
            object
                .get("credentials")
                .and_then(Value::as_object)
                .ok_or(CredentialError::Malformed)?
        };

        let mut credentials = Self::default();
        for (key, value) in source {
            let Some(text) = value.as_str() else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match key.as_str() {
                "token" => credentials.token = Some(text.to_string()),
                "username" => credentials.username = Some(text.to_string()),
                "password" => credentials.password = Some(text.to_string()),
                _ => {
                    credentials.extra.insert(key.clone(), text.to_string());
                }
            }
        }

        if credentials.is_empty() {
            return Err(CredentialError::Malformed);
        }
        Ok(credentials)
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.extra.is_empty()
    }

    pub fn require_token(&self) -> Result<&str, CredentialError> {
        self.token
            .as_deref()
            .ok_or(CredentialError::MissingField("token"))
    }

    /// Password, falling back to the token for sources that accept either
    pub fn require_secret(&self) -> Result<&str, CredentialError> {
        self.password
            .as_deref()
            .or(self.token.as_deref())
            .ok_or(CredentialError::MissingField("password"))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}
