//! An HTTP relay between a client application and its identity providers
//!
//! * `GET /` answers `Hello`.
//! * `POST /refresh` exchanges a `refreshToken` for a fresh token pair at a
//!   third-party token endpoint and relays the response.
//! * `POST /` requires a bearer JWT issued by the tenant. The relay obtains
//!   a machine token with the client credentials grant and returns the
//!   profile of the token's subject from the management API.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clap::Parser;
//! use keyrelay::{RelayConfig, Settings};
//!
//! # async fn example() -> color_eyre::Result<()> {
//! let settings = Settings::parse();
//! let config = Arc::new(RelayConfig::from_settings(&settings)?);
//! let app = keyrelay::router(config, reqwest::Client::new());
//!
//! let listener = tokio::net::TcpListener::bind(settings.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod config;
mod error;
mod routes;

pub use config::{ConfigError, RelayConfig, Settings};
pub use error::RelayError;
pub use routes::{router, AppState};
