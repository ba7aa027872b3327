//! Username/password authentication against a [`UserHandler`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::AuthConfig;
use crate::errors::{Error, Result};
use crate::signing::{self, SigningMethod, VerifyError};
use crate::user::Claims;
use crate::users::UserHandler;

/// Entry point for credential checks.
#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    /// Authenticate `username` from `address`, returning the account's claims.
    async fn auth(&self, address: &str, username: &str, password: &str) -> Result<Claims>;
}

/// Looks the user up, checks that the account is usable from the caller's
/// address, then verifies the password with the configured signing method.
#[derive(Clone)]
pub struct UserAuthenticationHandler {
    users: Arc<dyn UserHandler>,
    method: Arc<dyn SigningMethod>,
    key: Option<Arc<[u8]>>,
}

impl std::fmt::Debug for UserAuthenticationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAuthenticationHandler")
            .field("method", &self.method.name())
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl UserAuthenticationHandler {
    /// Fails when `method` needs a key and none (or an empty one) is given.
    pub fn new(users: Arc<dyn UserHandler>, method: Arc<dyn SigningMethod>, key: Option<&[u8]>) -> Result<Self> {
        let key = key.filter(|k| !k.is_empty());
        if method.requires_key() && key.is_none() {
            return Err(Error::config(
                "auth.passwordHashKey",
                format!("{} requires a secret key", method.name()),
            ));
        }

        Ok(Self {
            users,
            method,
            key: key.map(Arc::from),
        })
    }

    /// Build from configuration; fails on an unknown algorithm name or a missing key.
    pub fn from_config(users: Arc<dyn UserHandler>, config: &AuthConfig) -> Result<Self> {
        let key = config.password_hash_key.as_deref();
        let method = signing::resolve(config.password_hash_alg.as_deref(), key)?;
        Self::new(users, method, key.map(str::as_bytes))
    }

    pub fn method(&self) -> &dyn SigningMethod {
        self.method.as_ref()
    }

    pub fn users(&self) -> &Arc<dyn UserHandler> {
        &self.users
    }

    /// Run the signing method off the async runtime; hashing can be slow.
    async fn verify(&self, password: &str, expected: &str) -> Result<()> {
        let method = self.method.clone();
        let key = self.key.clone();
        let password = password.to_string();
        let expected = expected.to_string();

        let outcome = tokio::task::spawn_blocking(move || method.verify(&password, &expected, key.as_deref()))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password verification task: {e}"),
            })?;

        match outcome {
            Ok(()) => Ok(()),
            Err(VerifyError::Mismatch) => Err(Error::PasswordNotMatch),
            Err(e) => Err(Error::Verification(e)),
        }
    }
}

#[async_trait]
impl AuthenticationHandler for UserAuthenticationHandler {
    #[instrument(skip(self, password), fields(method = self.method.name()), err)]
    async fn auth(&self, address: &str, username: &str, password: &str) -> Result<Claims> {
        if username.is_empty() {
            return Err(Error::UsernameEmpty);
        }

        let mut users = self.users.read_user(username).await?;
        let user = match users.len() {
            0 => return Err(Error::UserNotFound),
            1 => users.remove(0),
            count => return Err(Error::AmbiguousUser { count }),
        };

        user.can_use(address)?;

        if user.password().is_empty() {
            return Err(Error::PasswordEmpty);
        }

        self.verify(password, user.password()).await?;

        debug!("credentials verified");
        Ok(user.into_data())
    }
}
