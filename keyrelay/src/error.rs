use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keyrelay_tokens::TokenRequestError;
use thiserror::Error;

/// An error handling a relay request
///
/// Client input errors become `400 Bad Request` with an empty body.
/// Upstream failures become `403 Forbidden` with a `{"message": "..."}`
/// body, whatever their cause.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The verified token carries no subject
    #[error("token has no subject")]
    MissingSubject,

    /// The request body carries no usable `refreshToken`
    #[error("request body has no refresh token")]
    MissingRefreshToken,

    /// An outbound exchange with an identity provider failed
    #[error("upstream exchange failed")]
    Upstream(#[from] TokenRequestError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingSubject | Self::MissingRefreshToken => {
                tracing::debug!(reason = %self, "rejecting request");
                StatusCode::BAD_REQUEST.into_response()
            }
            Self::Upstream(err) => {
                let message = describe(&err);
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "upstream exchange failed");
                (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({ "message": message })),
                )
                    .into_response()
            }
        }
    }
}

fn describe(error: &(dyn std::error::Error + 'static)) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        description.push_str(": ");
        description.push_str(&err.to_string());
        source = err.source();
    }
    description
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use color_eyre::Result;

    use super::*;

    #[tokio::test]
    async fn input_errors_have_empty_bodies() -> Result<()> {
        for err in [RelayError::MissingSubject, RelayError::MissingRefreshToken] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = to_bytes(response.into_body(), usize::MAX).await?;
            assert!(body.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn upstream_errors_carry_a_message() -> Result<()> {
        let response = RelayError::from(TokenRequestError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: r#"{"error":"access_denied"}"#.into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(
            body,
            serde_json::json!({ "message": "authority responded with 401 Unauthorized" })
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_upstream_bodies_name_the_parse_failure() -> Result<()> {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let response = RelayError::from(TokenRequestError::from(parse_err)).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&body)?;
        let message = body["message"].as_str().unwrap_or_default();
        assert!(
            message.starts_with("malformed response body from authority: "),
            "{message}"
        );
        Ok(())
    }
}
