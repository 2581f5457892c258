//! Bearer token verification against a remote JSON Web Key Set
//!
//! An [`Authority`] authenticates RS256 tokens using public keys published
//! by an identity platform. Keys come from a [`KeyResolver`], which fetches
//! the key set lazily on a cache miss, keeps the signing keys for a bounded
//! time, and caps how often the key set may be fetched.
//!
//! ```no_run
//! use keyrelay_authority::{Authority, KeyResolver};
//! use keyrelay_jose::{jwa, jwt, JwtRef};
//!
//! # async fn example(token: &JwtRef) -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = KeyResolver::new(
//!     "https://tenant.example.com/.well-known/jwks.json".parse()?,
//!     reqwest::Client::new(),
//! );
//!
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::RS256)
//!     .add_allowed_audience(jwt::Audience::from_static("https://tenant.example.com/api/v2/"))
//!     .require_issuer(jwt::Issuer::from_static("https://tenant.example.com/"));
//!
//! let authority = Authority::new(resolver, validator);
//! let claims = authority.verify_token(token).await?;
//! # drop(claims);
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

mod authority;
mod cache;
mod limiter;
mod resolver;

pub use authority::{Authority, AuthorityError};
pub use cache::KeyCache;
pub use limiter::{FetchLimiter, SharedClock};
pub use resolver::{KeyResolutionError, KeyResolver, ResolverOptions};
