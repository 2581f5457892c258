//! Tower middleware that authenticates bearer JWTs with a
//! [`keyrelay_authority::Authority`].
//!
//! The verification needs to look keys up in a remote key set, so it runs
//! as an asynchronous authorizer under
//! [`AsyncRequireAuthorizationLayer`][tower_http::auth::AsyncRequireAuthorizationLayer].
//!
//! ```no_run
//! use keyrelay_authority::Authority;
//! use keyrelay_tower::{JsonErrorHandler, VerifyJwt};
//!
//! # fn example(authority: Authority) {
//! let layer = VerifyJwt::new(authority, JsonErrorHandler::<String>::new()).into_layer();
//! # drop(layer);
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

mod jwt;
pub mod util;

pub use crate::jwt::*;
