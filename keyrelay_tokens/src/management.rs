//! User profile lookups against the identity platform's management API

use reqwest::Url;

use crate::{AccessTokenRef, TokenRequestError, UserIdRef};

/// A client for the management API rooted at `https://{domain}/api/v2/`
#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: reqwest::Client,
    api_base: Url,
}

impl ManagementClient {
    /// Constructs a client for the management API at `api_base`
    pub fn new(client: reqwest::Client, api_base: Url) -> Self {
        Self { client, api_base }
    }

    /// The location of a user's profile
    ///
    /// The user ID is percent-encoded as a single path segment, so IDs
    /// containing `/` or `?` cannot escape the users collection.
    ///
    /// # Errors
    ///
    /// The API base URL cannot carry a path.
    pub fn user_url(&self, user_id: &UserIdRef) -> Result<Url, TokenRequestError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| TokenRequestError::UnsupportedUrl)?
            .pop_if_empty()
            .push("users")
            .push(user_id.as_str());
        Ok(url)
    }

    /// Fetches a user's profile, returning it as it was received
    ///
    /// # Errors
    ///
    /// The request could not be sent, the API refused it, or the response
    /// was not JSON.
    #[tracing::instrument(err, skip(self, access_token, user_id), fields(user.id = %user_id))]
    pub async fn get_user(
        &self,
        access_token: &AccessTokenRef,
        user_id: &UserIdRef,
    ) -> Result<serde_json::Value, TokenRequestError> {
        let url = self.user_url(user_id)?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(access_token.as_str())
            .send()
            .await
            .map_err(TokenRequestError::Send)?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received profile response from management API"
        );

        let body = crate::read_success_body(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use reqwest::StatusCode;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn management(server: &MockServer) -> Result<ManagementClient> {
        Ok(ManagementClient::new(
            reqwest::Client::new(),
            format!("{}/api/v2/", server.uri()).parse()?,
        ))
    }

    #[test]
    fn user_id_is_a_single_path_segment() -> Result<()> {
        let client = ManagementClient::new(
            reqwest::Client::new(),
            "https://tenant.example.com/api/v2/".parse()?,
        );

        assert_eq!(
            client.user_url(UserIdRef::from_str("abc123"))?.as_str(),
            "https://tenant.example.com/api/v2/users/abc123"
        );
        assert_eq!(
            client.user_url(UserIdRef::from_str("../a/b?c#d"))?.as_str(),
            "https://tenant.example.com/api/v2/users/..%2Fa%2Fb%3Fc%23d"
        );
        Ok(())
    }

    #[tokio::test]
    async fn fetches_profile_with_bearer_token() -> Result<()> {
        let profile = serde_json::json!({
            "user_id": "abc123",
            "email": "someone@example.com",
            "identities": [{ "provider": "google-oauth2", "access_token": "ya29" }],
        });

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/abc123"))
            .and(header("authorization", "Bearer machine-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let received = management(&server)?
            .get_user(
                AccessTokenRef::from_str("machine-token"),
                UserIdRef::from_str("abc123"),
            )
            .await?;

        assert_eq!(received, profile);
        Ok(())
    }

    #[tokio::test]
    async fn missing_user_is_a_status_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/nobody"))
            .respond_with(ResponseTemplate::new(404).set_body_string("The user does not exist."))
            .mount(&server)
            .await;

        let err = management(&server)?
            .get_user(
                AccessTokenRef::from_str("machine-token"),
                UserIdRef::from_str("nobody"),
            )
            .await
            .unwrap_err();

        match err {
            TokenRequestError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "The user does not exist.");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
        Ok(())
    }
}
