//! Token grants against an OAuth2 token endpoint

use keyrelay_jose::jwt;

use crate::{AccessToken, ClientIdRef, RefreshTokenRef, TokenRequestError};

pub mod dto;

/// Credentials that can be presented to a token endpoint
pub trait CredentialsSource: serde::Serialize {
    /// The client ID of the client making the request
    fn client_id(&self) -> &ClientIdRef;
    /// The grant type or flow to be performed
    fn grant_type() -> &'static str;
    /// The optional audience of the request
    fn audience(&self) -> Option<&jwt::AudienceRef>;
}

/// Obtains machine access tokens with the client credentials grant
///
/// Every call performs a fresh exchange. Tokens are not cached.
#[derive(Debug, Clone)]
pub struct ClientCredentialsTokenSource {
    client: reqwest::Client,
    token_url: reqwest::Url,
    credentials: dto::ClientCredentialsWithAudience,
}

impl ClientCredentialsTokenSource {
    /// Constructs a new client credentials source
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        credentials: dto::ClientCredentialsWithAudience,
    ) -> Self {
        Self {
            client,
            token_url,
            credentials,
        }
    }

    /// Requests a new access token from the authority
    ///
    /// # Errors
    ///
    /// The request could not be sent, the authority refused it, or the
    /// response did not carry an access token.
    pub async fn request_token(&self) -> Result<AccessToken, TokenRequestError> {
        let body = request_token(&self.client, self.token_url.clone(), &self.credentials).await?;
        let resp: dto::TokenResponse = serde_json::from_slice(&body)?;

        tracing::debug!(
            expires_in = maybe_value(&resp.expires_in),
            "received machine access token"
        );

        Ok(resp.access_token.to_owned())
    }
}

/// Exchanges refresh tokens for new tokens at a third-party token endpoint
#[derive(Debug, Clone)]
pub struct RefreshTokenExchange {
    client: reqwest::Client,
    token_url: reqwest::Url,
    credentials: std::sync::Arc<dto::ClientCredentials>,
}

impl RefreshTokenExchange {
    /// Constructs a new refresh token exchange
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        credentials: std::sync::Arc<dto::ClientCredentials>,
    ) -> Self {
        Self {
            client,
            token_url,
            credentials,
        }
    }

    /// Exchanges `refresh_token`, returning the authority's token payload
    /// as it was received
    ///
    /// # Errors
    ///
    /// The request could not be sent, the authority refused it, or the
    /// response was not JSON.
    pub async fn exchange(
        &self,
        refresh_token: &RefreshTokenRef,
    ) -> Result<serde_json::Value, TokenRequestError> {
        let credentials = dto::RefreshTokenCredentials {
            credentials: &self.credentials,
            refresh_token,
        };

        let body = request_token(&self.client, self.token_url.clone(), &credentials).await?;
        let payload: serde_json::Value = serde_json::from_slice(&body)?;

        tracing::info!(
            has_id_token = payload.get("id_token").is_some(),
            has_refresh_token = payload.get("refresh_token").is_some(),
            "received refreshed tokens"
        );

        Ok(payload)
    }
}

fn maybe_value<'a, T: tracing::Value + 'a>(v: &'a Option<T>) -> &'a dyn tracing::Value {
    if let Some(v) = v {
        v
    } else {
        &tracing::field::Empty
    }
}

#[tracing::instrument(
    err,
    skip(client, token_url, credentials),
    fields(
        token_url = %token_url,
        credentials.grant_type = R::grant_type(),
        credentials.client_id = %credentials.client_id(),
        credentials.audience = maybe_value(&credentials.audience().map(|a| a.as_str())),
    ),
)]
async fn request_token<R: CredentialsSource>(
    client: &reqwest::Client,
    token_url: reqwest::Url,
    credentials: &R,
) -> Result<Vec<u8>, TokenRequestError> {
    tracing::trace!("requesting token from authority");

    let resp = client
        .post(token_url)
        .json(credentials)
        .send()
        .await
        .map_err(TokenRequestError::Send)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received token response from issuing authority"
    );

    crate::read_success_body(resp).await
}
