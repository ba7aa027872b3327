use crate::signing::VerifyError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Login attempted without a username
    #[error("Username is empty")]
    UsernameEmpty,

    /// The store returned no row for the username
    #[error("User not found")]
    UserNotFound,

    /// The store returned more than one row for the username
    #[error("{count} accounts match the username")]
    AmbiguousUser { count: usize },

    /// Locked with no expiry configured
    #[error("Account is permanently locked")]
    PermanentlyLocked,

    /// Locked and the lock window has not elapsed yet
    #[error("Account is locked until {until}")]
    TemporarilyLocked { until: DateTime<Utc> },

    /// The caller address matched none of the account's block-list entries
    #[error("Client address {address} is not allowed for this account")]
    IpBlocked { address: String },

    /// The caller address could not be parsed
    #[error("Client address is invalid - '{address}'")]
    AddressInvalid { address: String },

    /// The account has no stored secret
    #[error("Account has no password")]
    PasswordEmpty,

    /// The signing method reported a mismatch
    #[error("Password does not match")]
    PasswordNotMatch,

    /// `passwordHashAlg` names an algorithm that is not registered
    #[error("Unsupported password hash algorithm '{name}'")]
    UnknownAlgorithm { name: String },

    /// A configuration value failed validation
    #[error("Invalid configuration value for '{key}': {message}")]
    MalformedConfiguration { key: String, message: String },

    /// A store row does not fit the configured field schema
    #[error("Value of '{column}' {message}")]
    RowMapping { column: String, message: String },

    /// The lock statement ran but touched no rows
    #[error("No account updated for '{username}'")]
    NoAccountUpdated { username: String },

    /// Verification failed for a reason other than a mismatch
    #[error(transparent)]
    Verification(#[from] VerifyError),

    /// Backing store error, passed through unchanged
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An operator route was called without valid credentials
    #[error("Authentication required")]
    Unauthenticated,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedConfiguration {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn row_mapping(column: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RowMapping {
            column: column.into(),
            message: message.into(),
        }
    }

    /// True for the kinds that deny a login because of the account or the
    /// credentials, as opposed to a fault in the service.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Error::UserNotFound
                | Error::AmbiguousUser { .. }
                | Error::PermanentlyLocked
                | Error::TemporarilyLocked { .. }
                | Error::IpBlocked { .. }
                | Error::PasswordEmpty
                | Error::PasswordNotMatch
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UsernameEmpty | Error::AddressInvalid { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::UserNotFound
            | Error::AmbiguousUser { .. }
            | Error::PasswordEmpty
            | Error::PasswordNotMatch => StatusCode::UNAUTHORIZED,
            Error::PermanentlyLocked | Error::TemporarilyLocked { .. } | Error::IpBlocked { .. } => StatusCode::FORBIDDEN,
            Error::NoAccountUpdated { .. } => StatusCode::NOT_FOUND,
            Error::UnknownAlgorithm { .. }
            | Error::MalformedConfiguration { .. }
            | Error::RowMapping { .. }
            | Error::Verification(_)
            | Error::Store(_)
            | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status sent to the caller. Unless `detailed` is set, every denial is
    /// a 401 so the status cannot tell a locked account from a wrong password.
    pub fn response_status(&self, detailed: bool) -> StatusCode {
        if !detailed && self.is_denial() {
            StatusCode::UNAUTHORIZED
        } else {
            self.status_code()
        }
    }

    /// Returns a user-safe error message.
    ///
    /// Unless `detailed` is set, every account-state denial reads the same so
    /// callers cannot tell a locked account from a wrong password.
    pub fn user_message(&self, detailed: bool) -> String {
        match self {
            Error::UsernameEmpty => "Username is required".to_string(),
            Error::AddressInvalid { .. } => "Client address is invalid".to_string(),
            Error::Unauthenticated => "Authentication required".to_string(),
            Error::NoAccountUpdated { username } if detailed => format!("No account named {username}"),
            Error::NoAccountUpdated { .. } => "Account could not be locked".to_string(),
            e if e.is_denial() && detailed => e.to_string(),
            e if e.is_denial() => "Invalid username or password".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Build the HTTP response, optionally exposing which account state
    /// caused a denial.
    pub fn into_response_with(self, detailed: bool) -> Response {
        match &self {
            Error::Store(_) | Error::Verification(_) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::UnknownAlgorithm { .. } | Error::MalformedConfiguration { .. } => {
                tracing::error!("Configuration error: {}", self);
            }
            Error::AmbiguousUser { .. } | Error::RowMapping { .. } => {
                tracing::warn!("User data integrity error: {}", self);
            }
            e if e.is_denial() => {
                tracing::info!("Authentication denied: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.response_status(detailed);
        let body = json!({ "message": self.user_message(detailed) });
        (status, axum::response::Json(body)).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
