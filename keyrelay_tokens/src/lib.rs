//! Outbound calls to OAuth2 authorities
//!
//! * the client credentials grant, for machine access tokens
//!   ([`oauth2::ClientCredentialsTokenSource`]),
//! * the refresh token grant at a third-party token endpoint
//!   ([`oauth2::RefreshTokenExchange`]),
//! * user profile lookups with a machine access token
//!   ([`management::ManagementClient`]).
//!
//! Nothing is cached or retried. Every failure surfaces as a
//! [`TokenRequestError`].

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

use reqwest::StatusCode;
use thiserror::Error;

mod braids;
pub mod management;
pub mod oauth2;

pub use braids::*;

/// An error while requesting tokens or token-protected resources from an
/// authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// Unable to send the request to the authority
    #[error("error sending request to authority")]
    Send(#[source] reqwest::Error),

    /// The authority responded with a non-success status
    #[error("authority responded with {status}")]
    Status {
        /// The response status
        status: StatusCode,
        /// The body of the error response
        body: String,
    },

    /// Unable to read the response body
    #[error("error reading response body")]
    BodyRead(#[source] reqwest::Error),

    /// The response body was not the expected JSON
    #[error("malformed response body from authority")]
    Malformed(#[from] serde_json::Error),

    /// The configured API location cannot carry a path
    #[error("API base URL cannot carry a path")]
    UnsupportedUrl,
}

async fn read_success_body(resp: reqwest::Response) -> Result<Vec<u8>, TokenRequestError> {
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.map_err(TokenRequestError::BodyRead)?;
        tracing::warn!(
            response.status = status.as_u16(),
            response.body = %body,
            "authority refused request"
        );
        return Err(TokenRequestError::Status { status, body });
    }

    let body = resp.bytes().await.map_err(TokenRequestError::BodyRead)?;
    Ok(body.to_vec())
}
