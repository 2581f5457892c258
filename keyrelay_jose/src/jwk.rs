//! JSON Web Keys
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//! Only RSA public keys are modeled; other key types fail to deserialize
//! and are skipped when they appear inside a [`Jwks`][crate::Jwks].
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use std::convert::TryFrom;

use aliri_braid::braid;
use base64::Engine;
use serde::Deserialize;

use crate::{error, jwa, BASE64_URL};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to JWK identifier ([`KeyId`])")]
pub struct KeyId;

const MIN_MODULUS_LEN: usize = 2048 / 8;
const MAX_MODULUS_LEN: usize = 8192 / 8;

/// RSA public key components
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaPublicKey {
    /// Constructs a public key from the big-endian modulus and exponent
    ///
    /// # Errors
    ///
    /// The modulus is shorter than 2048 bits or longer than 8192 bits, or
    /// the exponent is empty.
    pub fn from_components(
        modulus: impl Into<Vec<u8>>,
        exponent: impl Into<Vec<u8>>,
    ) -> Result<Self, error::KeyRejected> {
        let modulus = strip_leading_zeros(modulus.into());
        let exponent = strip_leading_zeros(exponent.into());

        if modulus.len() < MIN_MODULUS_LEN || modulus.len() > MAX_MODULUS_LEN {
            return Err(error::key_rejected(format!(
                "key modulus must be between 2048 and 8192 bits, got {}",
                modulus.len() * 8
            )));
        }

        if exponent.is_empty() {
            return Err(error::key_rejected("key exponent is empty"));
        }

        Ok(Self { modulus, exponent })
    }

    /// Constructs a public key from the base64url-encoded `n` and `e`
    /// members of a JWK
    ///
    /// # Errors
    ///
    /// Either component is not valid base64url or the decoded key is
    /// rejected by [`from_components`][Self::from_components].
    pub fn from_encoded(n: &str, e: &str) -> Result<Self, error::KeyRejected> {
        let modulus = BASE64_URL.decode(n).map_err(error::key_rejected)?;
        let exponent = BASE64_URL.decode(e).map_err(error::key_rejected)?;
        Self::from_components(modulus, exponent)
    }

    /// The public key's modulus
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// The public key's exponent
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }
}

fn strip_leading_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    let zeros = bytes.iter().take_while(|&&b| b == 0).count();
    bytes.drain(..zeros);
    bytes
}

impl jwa::Verifier for RsaPublicKey {
    fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::JwkVerifyError> {
        let params = alg
            .verification_params()
            .ok_or_else(|| error::incompatible_algorithm(alg))?;

        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(params, data, signature)
            .map_err(|_| error::JwkVerifyError::SignatureMismatch)
    }
}

/// An identified JSON Web Key holding an RSA public key
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    usage: Option<jwa::Usage>,
    algorithm: Option<jwa::Algorithm>,
    key: RsaPublicKey,
}

impl Jwk {
    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The RSA public key material
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Whether this key may verify a signature made with `alg`
    ///
    /// The key type must fit the algorithm, and any `alg` or `use` the key
    /// declares must agree with it.
    #[must_use]
    pub fn can_verify(&self, alg: jwa::Algorithm) -> bool {
        alg.is_rsa()
            && self.algorithm.map_or(true, |a| a == alg)
            && self.usage.map_or(true, |u| u == alg.to_usage())
    }
}

impl jwa::Verifier for Jwk {
    fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::JwkVerifyError> {
        if !self.can_verify(alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        self.key.verify(alg, data, signature)
    }
}

#[derive(Debug, Deserialize)]
struct JwkDto {
    #[serde(rename = "kid", default)]
    key_id: Option<KeyId>,

    #[serde(rename = "use", default)]
    usage: Option<jwa::Usage>,

    #[serde(rename = "alg", default)]
    algorithm: Option<jwa::Algorithm>,

    kty: String,

    #[serde(default)]
    n: Option<String>,

    #[serde(default)]
    e: Option<String>,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::KeyRejected;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        if dto.kty != "RSA" {
            return Err(error::key_rejected(format!(
                "unsupported key type '{}'",
                dto.kty
            )));
        }

        if let Some(alg) = dto.algorithm {
            if !alg.is_rsa() {
                return Err(error::key_rejected(error::incompatible_algorithm(alg)));
            }
        }

        let (n, e) = match (dto.n.as_deref(), dto.e.as_deref()) {
            (Some(n), Some(e)) => (n, e),
            _ => return Err(error::key_rejected("RSA key is missing `n` or `e`")),
        };

        Ok(Self {
            key_id: dto.key_id,
            usage: dto.usage,
            algorithm: dto.algorithm,
            key: RsaPublicKey::from_encoded(n, e)?,
        })
    }
}
