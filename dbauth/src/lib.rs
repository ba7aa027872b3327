//! # dbauth: database-backed username/password authentication
//!
//! `dbauth` checks a username and password against accounts stored in a SQL
//! database. Account rows are read with a configurable query, mapped into a
//! [`user::UserRecord`] through a configurable field schema, checked for usability
//! (an IP allow-list and an optional time-windowed lock), and finally verified
//! with a pluggable [`signing::SigningMethod`]. On success the caller receives the
//! account row as a JSON object of claims.
//!
//! ## Request Flow
//!
//! ```text
//! auth(address, username, password)
//!   -> UserHandler::read_user(username)     zero, one or many records
//!   -> UserRecord::can_use(address)          allow-list, then lock
//!   -> SigningMethod::verify(password, stored secret, key)
//!   -> claims
//! ```
//!
//! Every failure is a distinct [`errors::Error`] kind. The HTTP layer in [`api`]
//! collapses account-state denials into one generic message unless detailed
//! errors are enabled.
//!
//! ## Using the library
//!
//! The handlers take their collaborators explicitly, so any [`store::UserStore`]
//! works:
//!
//! ```no_run
//! use std::sync::Arc;
//! use dbauth::{
//!     AuthenticationHandler, UserAuthenticationHandler,
//!     config::{AuthConfig, UsersConfig},
//!     store::{MemoryStore, Row},
//!     users::DbUserHandler,
//! };
//!
//! # async fn run() -> dbauth::errors::Result<()> {
//! let store = MemoryStore::new("username")
//!     .with_rows([Row::new().with("username", "alice").with("password", "wonderland")]);
//! let users = Arc::new(DbUserHandler::new(Arc::new(store), &UsersConfig::default())?);
//! let handler = UserAuthenticationHandler::from_config(users, &AuthConfig::default())?;
//!
//! let claims = handler.auth("10.0.0.1", "alice", "wonderland").await?;
//! assert_eq!(claims["username"], "alice");
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the service
//!
//! The `dbauth` binary loads [`Config`] from `config.yaml` (see [`config`]),
//! connects a [`store::PgUserStore`] and serves the routes in [`api`].

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod ip;
pub mod signing;
pub mod store;
pub mod telemetry;
pub mod user;
pub mod users;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub use auth::{AuthenticationHandler, UserAuthenticationHandler};
pub use config::Config;
pub use user::{Claims, UserRecord};
pub use users::{DbUserHandler, UserHandler};

use crate::api::AppState;
use crate::store::{PgUserStore, UserStore};

/// The HTTP service with its handlers wired up.
pub struct Application {
    router: axum::Router,
    config: Config,
    pool: Option<sqlx::PgPool>,
}

impl Application {
    /// Connect to the configured database and build the handlers.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // the config carries the hash key and database credentials
        debug!(bind = %config.bind_address(), users = ?config.users, "Starting dbauth");

        let store = PgUserStore::connect(&config.database.url, &config.database.pool).await?;
        let pool = store.pool().clone();
        info!("Connected to user store");

        let mut app = Self::with_store(config, Arc::new(store))?;
        app.pool = Some(pool);
        Ok(app)
    }

    /// Build the handlers over an existing store.
    pub fn with_store(config: Config, store: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let users: Arc<dyn UserHandler> = Arc::new(DbUserHandler::new(store, &config.users)?);
        let authenticator = UserAuthenticationHandler::from_config(users.clone(), &config.auth)?;
        info!(method = authenticator.method().name(), "Password verification configured");

        let state = AppState::new(Arc::new(authenticator), users, config.api.clone());
        Ok(Self {
            router: api::router(state),
            config,
            pool: None,
        })
    }

    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then close the connection pool.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("dbauth listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}
