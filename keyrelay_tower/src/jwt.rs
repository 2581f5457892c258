use std::{fmt, future::Future, marker::PhantomData, pin::Pin};

use http::{Request, Response};
use keyrelay_authority::{Authority, AuthorityError, KeyResolutionError};
use keyrelay_jose::{clock::Clock, error::JwtVerifyError, Jwt};
use tower_http::auth::{AsyncAuthorizeRequest, AsyncRequireAuthorizationLayer};

use crate::util::unauthorized_json;

/// Authenticates bearer JWTs before a request reaches the inner service
///
/// On success the [`Jwt`] and its verified
/// [`BasicClaims`][keyrelay_jose::jwt::BasicClaims] are inserted into the
/// request extensions. On failure the inner service is never called and
/// the error handler's response is returned instead.
pub struct VerifyJwt<OnError, C = keyrelay_jose::clock::System> {
    authority: Authority<C>,
    on_error: OnError,
}

impl<OnError, C> Clone for VerifyJwt<OnError, C>
where
    OnError: Clone,
{
    #[inline]
    fn clone(&self) -> Self {
        Self {
            authority: self.authority.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<OnError, C> fmt::Debug for VerifyJwt<OnError, C>
where
    OnError: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VerifyJwt")
            .field("authority", &self.authority)
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl<OnError, C> VerifyJwt<OnError, C> {
    /// Verifies tokens with `authority`, responding to failures with `on_error`
    #[inline]
    pub fn new(authority: Authority<C>, on_error: OnError) -> Self {
        Self {
            authority,
            on_error,
        }
    }

    /// Wraps this verifier in a layer
    #[inline]
    pub fn into_layer(self) -> AsyncRequireAuthorizationLayer<Self> {
        AsyncRequireAuthorizationLayer::new(self)
    }
}

fn handle_jwt_invalid<OnError: OnJwtError>(
    on_error: &OnError,
    error: AuthorityError,
) -> Response<OnError::Body> {
    match error {
        AuthorityError::MissingKeyId => on_error.on_missing_or_malformed(),
        AuthorityError::KeyResolution(KeyResolutionError::UnknownKeyId) => {
            on_error.on_no_matching_jwk()
        }
        AuthorityError::KeyResolution(err) => on_error.on_key_set_unavailable(err),
        AuthorityError::JwtVerifyError(err) if err.is_malformed() => {
            on_error.on_missing_or_malformed()
        }
        AuthorityError::JwtVerifyError(err) => on_error.on_jwt_invalid(err),
    }
}

type AuthorizeFuture<ReqBody, ResBody> =
    Pin<Box<dyn Future<Output = Result<Request<ReqBody>, Response<ResBody>>> + Send>>;

impl<OnError, C, ReqBody> AsyncAuthorizeRequest<ReqBody> for VerifyJwt<OnError, C>
where
    OnError: OnJwtError + Clone + Send + Sync + 'static,
    OnError::Body: Send + 'static,
    C: Clock + Send + Sync + 'static,
    ReqBody: Send + 'static,
{
    type RequestBody = ReqBody;
    type ResponseBody = OnError::Body;
    type Future = AuthorizeFuture<ReqBody, OnError::Body>;

    fn authorize(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let authority = self.authority.clone();
        let on_error = self.on_error.clone();

        Box::pin(async move {
            let jwt = request
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_jwt)
                .ok_or_else(|| on_error.on_missing_or_malformed())?;

            let claims = authority
                .verify_token(&jwt)
                .await
                .map_err(|err| handle_jwt_invalid(&on_error, err))?;

            tracing::trace!("jwt was valid");

            let extensions = request.extensions_mut();
            extensions.insert(jwt);
            extensions.insert(claims);

            Ok::<_, Response<OnError::Body>>(request)
        })
    }
}

/// Handler for responding to failures while verifying a JWT
pub trait OnJwtError {
    /// The body type returned on an error
    type Body;

    /// Response when the JWT was not found or was otherwise malformed
    fn on_missing_or_malformed(&self) -> Response<Self::Body>;

    /// Response when the JWT names a JWK that the key set does not hold
    fn on_no_matching_jwk(&self) -> Response<Self::Body>;

    /// Response when the key set could not be consulted
    fn on_key_set_unavailable(&self, error: KeyResolutionError) -> Response<Self::Body>;

    /// Response when the JWT was rejected by the authority as invalid
    fn on_jwt_invalid(&self, error: JwtVerifyError) -> Response<Self::Body>;
}

macro_rules! delegate_impls {
    ($($ty:ty)*) => {
        $(
            impl<T> OnJwtError for $ty
            where
                T: OnJwtError,
            {
                type Body = T::Body;

                fn on_missing_or_malformed(&self) -> Response<Self::Body> {
                    T::on_missing_or_malformed(self)
                }

                fn on_no_matching_jwk(&self) -> Response<Self::Body> {
                    T::on_no_matching_jwk(self)
                }

                fn on_key_set_unavailable(&self, error: KeyResolutionError) -> Response<Self::Body> {
                    T::on_key_set_unavailable(self, error)
                }

                fn on_jwt_invalid(&self, error: JwtVerifyError) -> Response<Self::Body> {
                    T::on_jwt_invalid(self, error)
                }
            }
        )*
    }
}

delegate_impls!(
    &'_ T
    Box<T>
    std::sync::Arc<T>
);

/// Responds with `401 Unauthorized` and a JSON body of the form
/// `{"message": "..."}` describing why the token was refused
pub struct JsonErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> JsonErrorHandler<ResBody> {
    /// Instantiates a new instance over a given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for JsonErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("JsonErrorHandler")
    }
}

impl<ResBody> Default for JsonErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<ResBody> Clone for JsonErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<ResBody> Copy for JsonErrorHandler<ResBody> {}

impl<ResBody> OnJwtError for JsonErrorHandler<ResBody>
where
    ResBody: From<String>,
{
    type Body = ResBody;

    fn on_missing_or_malformed(&self) -> Response<Self::Body> {
        let message = "authorization token is missing or malformed";
        tracing::debug!("JWT validation failed: {message}");
        unauthorized_json(message)
    }

    fn on_no_matching_jwk(&self) -> Response<Self::Body> {
        let message = "token signing key (kid) is not trusted";
        tracing::debug!("JWT validation failed: {message}");
        unauthorized_json(message)
    }

    fn on_key_set_unavailable(&self, error: KeyResolutionError) -> Response<Self::Body> {
        let description = describe(&error);
        tracing::debug!("JWT validation failed: {description}");
        unauthorized_json(&description)
    }

    fn on_jwt_invalid(&self, error: JwtVerifyError) -> Response<Self::Body> {
        let description = describe(&error);
        tracing::debug!("JWT validation failed: {description}");
        unauthorized_json(&description)
    }
}

fn describe(error: &(dyn std::error::Error + 'static)) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(next) = source {
        description.push_str(": ");
        description.push_str(&next.to_string());
        source = next.source();
    }
    description
}

fn extract_jwt(auth: &str) -> Option<Jwt> {
    if auth.len() <= 7 || !auth.is_char_boundary(7) || !auth[..7].eq_ignore_ascii_case("bearer ") {
        return None;
    }

    let token = auth[7..].trim();
    if token.is_empty() {
        return None;
    }

    Some(Jwt::from(token))
}
