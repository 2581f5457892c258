//! DTOs for interacting with OAuth2 token endpoints

use keyrelay_jose::jwt;
use serde::{Deserialize, Serialize, Serializer};

use crate::{AccessTokenRef, ClientId, ClientIdRef, ClientSecret, RefreshTokenRef};

/// Client credentials
#[derive(Debug, Clone, Serialize)]
pub struct ClientCredentials {
    /// The client ID
    pub client_id: ClientId,

    /// The client secret
    pub client_secret: ClientSecret,
}

/// Client credentials with an audience
#[derive(Debug, Clone)]
pub struct ClientCredentialsWithAudience {
    /// The client credentials
    pub credentials: std::sync::Arc<ClientCredentials>,

    /// The target audience
    pub audience: jwt::Audience,
}

impl Serialize for ClientCredentialsWithAudience {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentialsWithAudience", 4)?;
        ser.serialize_field("client_id", &self.credentials.client_id)?;
        ser.serialize_field("client_secret", &self.credentials.client_secret)?;
        ser.serialize_field("audience", &self.audience)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        ser.end()
    }
}

impl super::CredentialsSource for ClientCredentialsWithAudience {
    fn client_id(&self) -> &ClientIdRef {
        &self.credentials.client_id
    }
    fn grant_type() -> &'static str {
        "client_credentials"
    }
    fn audience(&self) -> Option<&jwt::AudienceRef> {
        Some(&self.audience)
    }
}

/// Refresh token credentials
///
/// Borrows the refresh token, which arrives with each request and is
/// never retained.
#[derive(Debug)]
pub struct RefreshTokenCredentials<'a> {
    /// The client credentials
    pub credentials: &'a ClientCredentials,

    /// The refresh token
    pub refresh_token: &'a RefreshTokenRef,
}

impl Serialize for RefreshTokenCredentials<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("RefreshTokenCredentials", 4)?;
        ser.serialize_field("client_id", &self.credentials.client_id)?;
        ser.serialize_field("client_secret", &self.credentials.client_secret)?;
        ser.serialize_field("refresh_token", self.refresh_token)?;
        ser.serialize_field("grant_type", "refresh_token")?;
        ser.end()
    }
}

impl super::CredentialsSource for RefreshTokenCredentials<'_> {
    fn client_id(&self) -> &ClientIdRef {
        &self.credentials.client_id
    }
    fn grant_type() -> &'static str {
        "refresh_token"
    }
    fn audience(&self) -> Option<&jwt::AudienceRef> {
        None
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse<'a> {
    #[serde(borrow)]
    pub access_token: &'a AccessTokenRef,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use color_eyre::Result;

    use super::*;

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: ClientId::from_static("relay-client"),
            client_secret: ClientSecret::from_static("relay-secret"),
        }
    }

    #[test]
    fn client_credentials_body_names_the_grant() -> Result<()> {
        let body = serde_json::to_value(ClientCredentialsWithAudience {
            credentials: Arc::new(credentials()),
            audience: jwt::Audience::from_static("https://tenant.example.com/api/v2/"),
        })?;

        assert_eq!(
            body,
            serde_json::json!({
                "client_id": "relay-client",
                "client_secret": "relay-secret",
                "audience": "https://tenant.example.com/api/v2/",
                "grant_type": "client_credentials",
            })
        );
        Ok(())
    }

    #[test]
    fn refresh_body_carries_the_token() -> Result<()> {
        let credentials = credentials();
        let body = serde_json::to_value(RefreshTokenCredentials {
            credentials: &credentials,
            refresh_token: RefreshTokenRef::from_str("1//0gLw4BQ"),
        })?;

        assert_eq!(
            body,
            serde_json::json!({
                "client_id": "relay-client",
                "client_secret": "relay-secret",
                "refresh_token": "1//0gLw4BQ",
                "grant_type": "refresh_token",
            })
        );
        Ok(())
    }
}
