//! Errors raised while parsing keys and verifying tokens

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::jwa::Algorithm;

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// A key was asked to verify an algorithm it does not support
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key cannot verify {alg} signatures")]
pub struct IncompatibleAlgorithm {
    alg: Algorithm,
}

pub(crate) fn incompatible_algorithm(alg: Algorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// An `alg` value that is not a registered JWS algorithm
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unrecognized algorithm {name:?}")]
pub struct UnknownAlgorithm {
    name: String,
}

pub(crate) fn unknown_algorithm(name: String) -> UnknownAlgorithm {
    UnknownAlgorithm { name }
}

/// A published key that cannot be used for verification
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("key rejected: {reason}")]
pub struct KeyRejected {
    reason: String,
}

pub(crate) fn key_rejected(reason: impl fmt::Display) -> KeyRejected {
    KeyRejected {
        reason: reason.to_string(),
    }
}

/// The part of a compact JWT that could not be decoded
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    /// The token is not three `.`-separated sections
    Structure,
    /// The base64url JSON header
    Header,
    /// The base64url JSON claims
    Payload,
    /// The base64url signature
    Signature,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Structure => "structure",
            Self::Header => "header",
            Self::Payload => "payload",
            Self::Signature => "signature",
        })
    }
}

/// A token that is not a well-formed compact JWS
#[derive(Debug, Error)]
#[error("malformed JWT {section}")]
pub struct MalformedJwt {
    section: Section,
    #[source]
    source: Option<BoxedSource>,
}

pub(crate) fn malformed_jwt() -> MalformedJwt {
    MalformedJwt {
        section: Section::Structure,
        source: None,
    }
}

pub(crate) fn malformed_jwt_header(source: impl Into<BoxedSource>) -> MalformedJwt {
    MalformedJwt {
        section: Section::Header,
        source: Some(source.into()),
    }
}

pub(crate) fn malformed_jwt_payload(source: impl Into<BoxedSource>) -> MalformedJwt {
    MalformedJwt {
        section: Section::Payload,
        source: Some(source.into()),
    }
}

pub(crate) fn malformed_jwt_signature(source: impl Into<BoxedSource>) -> MalformedJwt {
    MalformedJwt {
        section: Section::Signature,
        source: Some(source.into()),
    }
}

/// A key refused to vouch for a signature
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum JwkVerifyError {
    /// The key does not support the token's algorithm
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// The signature was not produced by this key
    #[error("signature mismatch")]
    SignatureMismatch,
}

/// A token that failed verification
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The signing key refused the token
    #[error("token rejected by JWK")]
    JwkVerifyError(#[from] JwkVerifyError),

    /// The token could not be decoded
    #[error(transparent)]
    Malformed(#[from] MalformedJwt),

    /// The signature held but the claims did not
    #[error("token rejected by claims validator")]
    ClaimsRejected(#[from] ClaimsRejected),
}

impl JwtVerifyError {
    /// Whether the token could not be decoded at all
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// A validator check that the token's header or claims did not pass
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum ClaimsRejected {
    /// `alg` is not approved
    #[error("invalid algorithm")]
    InvalidAlgorithm,

    /// No `aud` entry is allowed
    #[error("invalid audience")]
    InvalidAudience,

    /// `iss` is not the required issuer
    #[error("invalid issuer")]
    InvalidIssuer,

    /// `exp` has passed
    #[error("token expired")]
    TokenExpired,

    /// `nbf` has not been reached
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// A claim the validator checks is absent
    #[error("required {0} claim missing")]
    MissingRequiredClaim(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_sections_keep_their_cause() {
        let cause = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = malformed_jwt_header(cause);

        assert_eq!(err.section, Section::Header);
        assert_eq!(err.to_string(), "malformed JWT header");
        assert!(err.source().is_some());

        let err = malformed_jwt();
        assert_eq!(err.to_string(), "malformed JWT structure");
        assert!(err.source().is_none());
    }

    #[test]
    fn verify_errors_name_the_stage() {
        let err = JwtVerifyError::from(ClaimsRejected::MissingRequiredClaim("exp"));
        assert_eq!(err.to_string(), "token rejected by claims validator");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("required exp claim missing")
        );

        let err = JwtVerifyError::from(JwkVerifyError::from(incompatible_algorithm(
            Algorithm::ES256,
        )));
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("key cannot verify ES256 signatures")
        );
    }
}
