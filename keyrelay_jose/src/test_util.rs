//! Fixtures for minting RS256 tokens in tests
//!
//! The trusted signing key is the private half of the key published in
//! [`JWKS`]. The untrusted key is unrelated to anything published.

#![allow(missing_docs, clippy::missing_panics_doc)]

use base64::Engine;
use ring::{rand::SystemRandom, signature};
use serde::Serialize;

use crate::{jwa, jwk, jwt, BASE64_URL};

pub const TEST_KEY_ID: &str = "ZcS-0i1Iup0eWo7Nx4oNs";
pub const JWK: &str = include_str!("../data/rsa/jwk.json");
pub const JWKS: &str = include_str!("../data/rsa/jwks.json");

const SIGNING_KEY: &[u8] = include_bytes!("../data/rsa/signing-key.pk8");
const UNTRUSTED_KEY: &[u8] = include_bytes!("../data/rsa/untrusted-key.pk8");

/// Signs tokens with one of the fixture RSA keys
pub struct TestSigner {
    key_pair: signature::RsaKeyPair,
    kid: jwk::KeyId,
}

impl std::fmt::Debug for TestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSigner")
            .field("kid", &self.kid)
            .field("key_pair", &"<redacted>")
            .finish()
    }
}

impl TestSigner {
    /// The key whose public half is published in [`JWKS`]
    #[must_use]
    pub fn trusted() -> Self {
        Self::from_pkcs8(SIGNING_KEY)
    }

    /// A key that nobody publishes, labeled with the trusted key ID
    #[must_use]
    pub fn untrusted() -> Self {
        Self::from_pkcs8(UNTRUSTED_KEY)
    }

    fn from_pkcs8(der: &[u8]) -> Self {
        let key_pair = signature::RsaKeyPair::from_pkcs8(der).expect("fixture key is valid PKCS#8");
        Self {
            key_pair,
            kid: jwk::KeyId::from_static(TEST_KEY_ID),
        }
    }

    /// Labels tokens with a different key ID
    #[must_use]
    pub fn with_key_id(self, kid: impl Into<jwk::KeyId>) -> Self {
        Self {
            kid: kid.into(),
            ..self
        }
    }

    /// Signs `claims` with an RS256 header naming this signer's key ID
    #[must_use]
    pub fn sign<C: Serialize>(&self, claims: &C) -> jwt::Jwt {
        let header = jwt::BasicHeaders::with_key_id(jwa::Algorithm::RS256, self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Signs `claims` under an arbitrary header
    ///
    /// The signature always uses PKCS#1 v1.5 padding. The digest follows
    /// the header's `alg` for RS384 and RS512 and is SHA-256 otherwise, so
    /// headers naming other algorithms produce tokens that should be
    /// refused.
    #[must_use]
    pub fn sign_with_header<H: Serialize + jwt::HasAlgorithm, C: Serialize>(
        &self,
        header: &H,
        claims: &C,
    ) -> jwt::Jwt {
        let header_json = serde_json::to_vec(header).expect("header serializes");
        let claims_json = serde_json::to_vec(claims).expect("claims serialize");

        let message = format!(
            "{}.{}",
            BASE64_URL.encode(header_json),
            BASE64_URL.encode(claims_json)
        );

        let padding: &'static dyn signature::RsaEncoding = match header.alg() {
            jwa::Algorithm::RS384 => &signature::RSA_PKCS1_SHA384,
            jwa::Algorithm::RS512 => &signature::RSA_PKCS1_SHA512,
            _ => &signature::RSA_PKCS1_SHA256,
        };

        let mut sig = vec![0; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(padding, &SystemRandom::new(), message.as_bytes(), &mut sig)
            .expect("signing with a fixture key succeeds");

        jwt::Jwt::new(format!("{}.{}", message, BASE64_URL.encode(sig)))
    }
}
