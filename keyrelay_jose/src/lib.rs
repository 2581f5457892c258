//! The subset of the Javascript/JSON Object Signing and Encryption (JOSE)
//! standards needed to authenticate bearer tokens issued by a remote
//! identity platform:
//!
//! * JSON Web Key (JWK) and JSON Web Key Set (JWKS): [RFC7517][]
//! * RS256 signatures from the JSON Web Algorithms (JWA): [RFC7518][]
//! * JSON Web Token (JWT) decomposition and claim validation: [RFC7519][]
//!
//! Only verification is supported. Signing lives behind the `test-util`
//! feature and exists to mint tokens in tests.
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use keyrelay_jose::{jwa, jwt, jwt::CoreClaims, Jwks, JwtRef};
//!
//! # fn example(jwks: &Jwks, token: &JwtRef) -> Result<(), Box<dyn std::error::Error>> {
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::RS256)
//!     .add_allowed_audience(jwt::Audience::from_static("https://tenant.example.com/api/v2/"))
//!     .require_issuer(jwt::Issuer::from_static("https://tenant.example.com/"));
//!
//! let decomposed: jwt::Decomposed = token.decompose()?;
//! let kid = decomposed.kid().ok_or("token has no key id")?;
//! let key = jwks.get_key_by_id(kid, decomposed.alg()).ok_or("unknown key")?;
//!
//! let validated: jwt::Validated = decomposed.verify(key.public_key(), &validator)?;
//! println!("subject: {:?}", validated.claims().sub());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
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

pub mod clock;
pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jwt;

#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod test_util;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

/// Unpadded base64url on output; tolerant of padding on input, which some
/// key set publishers emit for `n` and `e`.
pub(crate) const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
