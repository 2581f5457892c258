use std::sync::Arc;

use keyrelay_jose::{
    clock::{Clock, System},
    error::JwtVerifyError,
    jwt, JwtRef,
};
use thiserror::Error;

use crate::{KeyResolutionError, KeyResolver};

/// Reasons a bearer token was not accepted
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The token header does not name a signing key
    #[error("JWT does not identify its signing key")]
    MissingKeyId,

    /// No key could be found to validate the token
    #[error("no matching key found to validate JWT")]
    KeyResolution(#[from] KeyResolutionError),

    /// The token was malformed or otherwise defective
    #[error("invalid JWT")]
    JwtVerifyError(#[from] JwtVerifyError),
}

#[derive(Debug)]
struct Inner<C> {
    resolver: KeyResolver<C>,
    validator: jwt::CoreValidator,
}

/// An authority that verifies tokens against keys held by a remote
/// JSON Web Key Set
#[derive(Debug)]
#[must_use]
pub struct Authority<C = System> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Authority<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> Authority<C> {
    /// Constructs an authority resolving keys with `resolver` and checking
    /// claims with `validator`
    pub fn new(resolver: KeyResolver<C>, validator: jwt::CoreValidator) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                validator,
            }),
        }
    }

    /// Authenticates the token, returning its claims
    ///
    /// The algorithm is checked before any key lookup, so tokens naming an
    /// algorithm the validator does not approve never cause a key set
    /// fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, names no key or an
    /// unknown key, has an invalid signature, or carries rejected claims.
    pub async fn verify_token(&self, token: &JwtRef) -> Result<jwt::BasicClaims, AuthorityError> {
        let decomposed: jwt::Decomposed = token.decompose()?;

        let alg = decomposed.alg();
        self.inner
            .validator
            .check_algorithm(alg)
            .map_err(JwtVerifyError::from)?;

        let kid = decomposed.kid().ok_or_else(|| {
            tracing::debug!(%alg, "JWT has no key ID");
            AuthorityError::MissingKeyId
        })?;

        let key = self.inner.resolver.resolve(kid).await?;

        let validated: jwt::Validated = decomposed.verify_with_clock(
            &*key,
            &self.inner.validator,
            self.inner.resolver.clock(),
        )?;

        let (_, claims) = validated.extract();

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use color_eyre::Result;
    use keyrelay_jose::{
        clock::{TestClock, UnixTime},
        error::ClaimsRejected,
        jwa,
        jwt::{Audience, BasicClaims, BasicHeaders, CoreClaims, Issuer, Subject, SubjectRef},
        test_util::{self, TestSigner},
    };
    use reqwest::{Client, Url};
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::ResolverOptions;

    const ISSUER: &str = "https://tenant.example.com/";
    const AUDIENCE: &str = "https://tenant.example.com/api/v2/";

    struct Fixture {
        server: MockServer,
        clock: TestClock,
        authority: Authority<TestClock>,
    }

    async fn fixture() -> Result<Fixture> {
        let server = MockServer::start().await;
        let jwks: serde_json::Value = serde_json::from_str(test_util::JWKS)?;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&server)
            .await;

        let clock = TestClock::new(UnixTime(1_700_000_000));
        let url = Url::parse(&format!("{}/.well-known/jwks.json", server.uri()))?;
        let resolver =
            KeyResolver::with_clock(url, Client::new(), ResolverOptions::default(), clock.clone());

        let validator = jwt::CoreValidator::default()
            .add_approved_algorithm(jwa::Algorithm::RS256)
            .add_allowed_audience(Audience::from_static(AUDIENCE))
            .require_issuer(Issuer::from_static(ISSUER));

        Ok(Fixture {
            server,
            clock,
            authority: Authority::new(resolver, validator),
        })
    }

    fn claims(clock: &TestClock) -> BasicClaims {
        BasicClaims::new()
            .with_issuer(Issuer::from_static(ISSUER))
            .with_audience(Audience::from_static(AUDIENCE))
            .with_subject(Subject::from_static("abc123"))
            .with_future_expiration_from_clock(300, clock)
    }

    async fn fetches(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn accepts_token_signed_with_published_key() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::trusted().sign(&claims(&f.clock));

        let verified = f.authority.verify_token(&token).await?;
        assert_eq!(verified.sub().map(SubjectRef::as_str), Some("abc123"));
        Ok(())
    }

    #[tokio::test]
    async fn second_verification_uses_cached_key() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::trusted().sign(&claims(&f.clock));

        let _ = f.authority.verify_token(&token).await?;
        let _ = f.authority.verify_token(&token).await?;

        assert_eq!(fetches(&f.server).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_token_without_key_id() -> Result<()> {
        let f = fixture().await?;
        let header = BasicHeaders::new(jwa::Algorithm::RS256);
        let token = TestSigner::trusted().sign_with_header(&header, &claims(&f.clock));

        let err = f.authority.verify_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthorityError::MissingKeyId));
        assert_eq!(fetches(&f.server).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unapproved_algorithm_without_fetching() -> Result<()> {
        let f = fixture().await?;
        let header = BasicHeaders::with_key_id(
            jwa::Algorithm::HS256,
            keyrelay_jose::jwk::KeyId::from_static(test_util::TEST_KEY_ID),
        );
        let token = TestSigner::trusted().sign_with_header(&header, &claims(&f.clock));

        let err = f.authority.verify_token(&token).await.unwrap_err();
        match err {
            AuthorityError::JwtVerifyError(JwtVerifyError::ClaimsRejected(
                ClaimsRejected::InvalidAlgorithm,
            )) => {}
            other => panic!("expected algorithm rejection, got {other:?}"),
        }
        assert_eq!(fetches(&f.server).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unknown_key_id() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::trusted()
            .with_key_id("retired-key")
            .sign(&claims(&f.clock));

        let err = f.authority.verify_token(&token).await.unwrap_err();
        assert!(matches!(
            err,
            AuthorityError::KeyResolution(KeyResolutionError::UnknownKeyId)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_forged_signature() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::untrusted().sign(&claims(&f.clock));

        let err = f.authority.verify_token(&token).await.unwrap_err();
        assert!(matches!(
            err,
            AuthorityError::JwtVerifyError(JwtVerifyError::JwkVerifyError(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_expired_token() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::trusted().sign(&claims(&f.clock));
        f.clock.advance(Duration::from_secs(301));

        let err = f.authority.verify_token(&token).await.unwrap_err();
        match err {
            AuthorityError::JwtVerifyError(JwtVerifyError::ClaimsRejected(
                ClaimsRejected::TokenExpired,
            )) => {}
            other => panic!("expected expiry rejection, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejects_token_expiring_this_second() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::trusted()
            .sign(&claims(&f.clock).with_expiration(UnixTime(1_700_000_000)));

        let err = f.authority.verify_token(&token).await.unwrap_err();
        match err {
            AuthorityError::JwtVerifyError(JwtVerifyError::ClaimsRejected(
                ClaimsRejected::TokenExpired,
            )) => {}
            other => panic!("expected expiry rejection, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejects_token_not_yet_valid() -> Result<()> {
        let f = fixture().await?;
        let token = TestSigner::trusted().sign(
            &claims(&f.clock)
                .with_expiration(UnixTime(1_700_010_000))
                .with_not_before(UnixTime(1_700_005_000)),
        );

        let err = f.authority.verify_token(&token).await.unwrap_err();
        match err {
            AuthorityError::JwtVerifyError(JwtVerifyError::ClaimsRejected(
                ClaimsRejected::TokenNotYetValid,
            )) => {}
            other => panic!("expected not-before rejection, got {other:?}"),
        }
        Ok(())
    }
}
