//! JSON Web Tokens
//!
//! The specifications for this standard can be found in [RFC7519][].
//!
//! A signed JWT is three base64url sections separated by `.`: a JSON
//! header naming the algorithm and key, a JSON payload of claims, and the
//! signature over the first two sections. Nothing in the header or payload
//! should be trusted before the signature has been checked.
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519

use std::fmt;

use aliri_braid::braid;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, System, UnixTime},
    error, jwa, jwk, BASE64_URL,
};

/// An audience
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of JWTs
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a JWT
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A JSON Web Token
///
/// [`Debug`][JwtRef#impl-Debug] and [`Display`][JwtRef#impl-Display] never
/// print the signature, so a token that ends up in a log line cannot be
/// replayed.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "A borrowed reference to a JSON Web Token ([`Jwt`])"
)]
#[must_use]
pub struct Jwt;

impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            match self.0.rfind('.') {
                Some(last_period) => write!(f, "\"{}…\"", &self.0[..=last_period]),
                None => f.write_str("\"…\""),
            }
        } else {
            f.write_str("***JWT***")
        }
    }
}

impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("***JWT***")
    }
}

/// A type representing one or more items, primarily for serialization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single item
    One(T),

    /// Zero or more items, to be serialized/deserialized as an array
    Many(Vec<T>),
}

/// The `aud` claim, which may be a single string or an array
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
pub struct Audiences(Vec<Audience>);

impl Audiences {
    /// An empty set of audiences
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// A single audience
    #[must_use]
    pub fn single(aud: impl Into<Audience>) -> Self {
        Self(vec![aud.into()])
    }

    /// Whether there are no audiences
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the audiences
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(|a| &**a)
    }
}

impl From<OneOrMany<Audience>> for Audiences {
    fn from(v: OneOrMany<Audience>) -> Self {
        match v {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    fn from(mut v: Audiences) -> Self {
        if v.0.len() == 1 {
            OneOrMany::One(v.0.remove(0))
        } else {
            OneOrMany::Many(v.0)
        }
    }
}

impl From<Vec<Audience>> for Audiences {
    fn from(v: Vec<Audience>) -> Self {
        Self(v)
    }
}

impl From<Audience> for Audiences {
    fn from(aud: Audience) -> Self {
        Self(vec![aud])
    }
}

/// Types that expose the signing algorithm of a token
pub trait HasAlgorithm {
    /// The algorithm named in the token header
    fn alg(&self) -> jwa::Algorithm;
}

/// Headers that most tokens carry
pub trait CoreHeaders: HasAlgorithm {
    /// The key ID of the key used to sign the token
    fn kid(&self) -> Option<&jwk::KeyIdRef>;
}

/// Core claims that most compliant and secure JWT tokens should have
pub trait CoreClaims {
    /// Not before
    ///
    /// A verifier MUST reject this token before the given time.
    fn nbf(&self) -> Option<UnixTime> {
        None
    }

    /// Expires
    ///
    /// A verifier MUST reject this token after the given time.
    fn exp(&self) -> Option<UnixTime> {
        None
    }

    /// Audience
    ///
    /// The intended audience. A verifier MUST reject this token if it does
    /// not identify itself as one of the audiences.
    fn aud(&self) -> &Audiences;

    /// Issuer
    fn iss(&self) -> Option<&IssuerRef> {
        None
    }

    /// Subject
    ///
    /// The principal the token is about.
    fn sub(&self) -> Option<&SubjectRef> {
        None
    }
}

/// Minimal set of headers for common JWTs
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct BasicHeaders {
    alg: jwa::Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<jwk::KeyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

impl BasicHeaders {
    /// Headers naming only the algorithm
    pub const fn new(alg: jwa::Algorithm) -> Self {
        Self {
            alg,
            kid: None,
            typ: None,
        }
    }

    /// Headers naming the algorithm and the signing key
    pub fn with_key_id(alg: jwa::Algorithm, kid: impl Into<jwk::KeyId>) -> Self {
        Self {
            alg,
            kid: Some(kid.into()),
            typ: Some("JWT".to_owned()),
        }
    }
}

impl HasAlgorithm for BasicHeaders {
    fn alg(&self) -> jwa::Algorithm {
        self.alg
    }
}

impl CoreHeaders for BasicHeaders {
    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.kid.as_deref()
    }
}

/// The registered claims plus any extra claims carried by the token
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct BasicClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<UnixTime>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl BasicClaims {
    /// An empty claims set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `aud` claim to a single audience
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Audiences::single(aud);
        self
    }

    /// Sets the `iss` claim
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the `sub` claim
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets `iat` to now and `exp` to `secs` seconds from now
    pub fn with_future_expiration(self, secs: u64) -> Self {
        self.with_future_expiration_from_clock(secs, &System)
    }

    /// Sets `iat` to now and `exp` to `secs` seconds from now, according
    /// to `clock`
    pub fn with_future_expiration_from_clock<C: Clock>(mut self, secs: u64, clock: &C) -> Self {
        let now = clock.now();
        self.iat = Some(now);
        self.exp = Some(UnixTime(now.0.saturating_add(secs)));
        self
    }

    /// Sets the `exp` claim
    pub fn with_expiration(mut self, time: UnixTime) -> Self {
        self.exp = Some(time);
        self
    }

    /// Sets the `nbf` claim
    pub fn with_not_before(mut self, time: UnixTime) -> Self {
        self.nbf = Some(time);
        self
    }

    /// A claim outside the registered set
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

impl CoreClaims for BasicClaims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}

/// The validated headers and claims of a JWT
///
/// This type can _only_ be generated within this crate to assert that the
/// headers and claims held by this type have already been validated.
#[derive(Clone, Debug, PartialEq)]
pub struct Validated<C = BasicClaims, H = BasicHeaders> {
    headers: H,
    claims: C,
}

impl<C, H> Validated<C, H> {
    /// Extracts the header and claims from the token
    pub fn extract(self) -> (H, C) {
        (self.headers, self.claims)
    }

    /// The validated token headers
    pub fn headers(&self) -> &H {
        &self.headers
    }

    /// The validated token claims
    pub fn claims(&self) -> &C {
        &self.claims
    }
}

/// A JWT split into its parts with the header decoded
///
/// Inspect the header to pick a key, then call [`verify()`][Self::verify].
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a, H = BasicHeaders> {
    header: H,
    message: &'a str,
    payload: &'a str,
    signature: Vec<u8>,
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

impl JwtRef {
    /// Decomposes the JWT into its parts, preparing it for later processing
    ///
    /// # Errors
    ///
    /// Returns an error if the JWT is malformed.
    pub fn decompose<H>(&self) -> Result<Decomposed<'_, H>, error::JwtVerifyError>
    where
        H: for<'de> Deserialize<'de>,
    {
        let (s_str, message) =
            expect_two!(self.as_str().rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let (payload, h_str) =
            expect_two!(message.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;

        let h_raw = BASE64_URL
            .decode(h_str)
            .map_err(error::malformed_jwt_header)?;
        let signature = BASE64_URL
            .decode(s_str)
            .map_err(error::malformed_jwt_signature)?;
        let header: H = serde_json::from_slice(&h_raw).map_err(error::malformed_jwt_header)?;

        Ok(Decomposed {
            header,
            message,
            payload,
            signature,
        })
    }
}

impl<'a, H> Decomposed<'a, H>
where
    H: CoreHeaders,
{
    /// Verifies the decomposed JWT against the given key and validator
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not approved, the signature
    /// does not match, or the claims are rejected by the validator.
    pub fn verify<C, V>(
        self,
        key: &V,
        validator: &CoreValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        V: jwa::Verifier + ?Sized,
    {
        self.verify_with_clock(key, validator, &System)
    }

    /// Verifies the decomposed JWT, reading the current time from `clock`
    ///
    /// # Errors
    ///
    /// Same as [`verify()`][Self::verify].
    pub fn verify_with_clock<C, V, K>(
        self,
        key: &V,
        validator: &CoreValidator,
        clock: &K,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        V: jwa::Verifier + ?Sized,
        K: Clock,
    {
        validator.check_algorithm(self.header.alg())?;

        key.verify(
            self.header.alg(),
            self.message.as_bytes(),
            &self.signature,
        )?;

        let p_raw = BASE64_URL
            .decode(self.payload)
            .map_err(error::malformed_jwt_payload)?;
        let claims: C = serde_json::from_slice(&p_raw).map_err(error::malformed_jwt_payload)?;

        validator.validate_with_clock(&self.header, &claims, clock)?;

        Ok(Validated {
            headers: self.header,
            claims,
        })
    }

    /// The key ID named by the untrusted header
    #[must_use]
    pub fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.header.kid()
    }

    /// The algorithm named by the untrusted header
    #[must_use]
    pub fn alg(&self) -> jwa::Algorithm {
        self.header.alg()
    }
}

/// A core validator for JWTs
///
/// Checks the algorithm, lifetime, audience and issuer of a token. `exp`
/// is required and a token is expired from the second it names onward.
/// `nbf` is optional, but a token that carries one is refused until that
/// second arrives. There is no grace period on either bound.
///
/// The default validator does not accept any algorithms.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct CoreValidator {
    approved_algorithms: Vec<jwa::Algorithm>,
    allowed_audiences: Vec<Audience>,
    issuer: Option<Issuer>,
}

impl CoreValidator {
    /// Adds a single audience to the set of allowed audiences
    #[inline]
    pub fn add_allowed_audience(mut self, audience: Audience) -> Self {
        self.allowed_audiences.push(audience);
        self
    }

    /// Approves a single algorithm
    #[inline]
    pub fn add_approved_algorithm(mut self, alg: jwa::Algorithm) -> Self {
        self.approved_algorithms.push(alg);
        self
    }

    /// Require that tokens specify a particular issuer
    #[inline]
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// Rejects algorithms that were not approved
    ///
    /// An empty approval list rejects everything.
    ///
    /// # Errors
    ///
    /// `alg` is not approved.
    pub fn check_algorithm(&self, alg: jwa::Algorithm) -> Result<(), error::ClaimsRejected> {
        if self.approved_algorithms.contains(&alg) {
            Ok(())
        } else {
            Err(error::ClaimsRejected::InvalidAlgorithm)
        }
    }

    /// Validates the header and claims of a token against the current time
    ///
    /// # Errors
    ///
    /// The first check that fails.
    pub fn validate<H: CoreHeaders, T: CoreClaims>(
        &self,
        header: &H,
        claims: &T,
    ) -> Result<(), error::ClaimsRejected> {
        self.validate_with_clock(header, claims, &System)
    }

    /// Validates the header and claims of a token against `clock`
    ///
    /// # Errors
    ///
    /// The first check that fails.
    pub fn validate_with_clock<C: Clock, H: CoreHeaders, T: CoreClaims>(
        &self,
        header: &H,
        claims: &T,
        clock: &C,
    ) -> Result<(), error::ClaimsRejected> {
        let now = clock.now();

        self.check_algorithm(header.alg())?;

        let exp = claims
            .exp()
            .ok_or(error::ClaimsRejected::MissingRequiredClaim("exp"))?;
        if exp <= now {
            return Err(error::ClaimsRejected::TokenExpired);
        }

        if let Some(nbf) = claims.nbf() {
            if nbf > now {
                return Err(error::ClaimsRejected::TokenNotYetValid);
            }
        }

        if !self.allowed_audiences.is_empty() {
            if claims.aud().is_empty() {
                return Err(error::ClaimsRejected::MissingRequiredClaim("aud"));
            }

            let found = claims.aud().iter().any(|a| {
                self.allowed_audiences
                    .iter()
                    .any(|e| a.as_str() == e.as_str())
            });
            if !found {
                return Err(error::ClaimsRejected::InvalidAudience);
            }
        }

        if let Some(allowed_iss) = &self.issuer {
            let iss = claims
                .iss()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("iss"))?;
            if iss.as_str() != allowed_iss.as_str() {
                return Err(error::ClaimsRejected::InvalidIssuer);
            }
        }

        Ok(())
    }
}
