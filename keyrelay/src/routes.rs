use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use keyrelay_authority::{Authority, KeyResolver};
use keyrelay_jose::jwt::{self, CoreClaims};
use keyrelay_tokens::{
    management::ManagementClient,
    oauth2::{dto, ClientCredentialsTokenSource, RefreshTokenExchange},
    RefreshToken, UserIdRef,
};
use keyrelay_tower::{JsonErrorHandler, VerifyJwt};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::RelayConfig, error::RelayError};

/// Shared by every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    machine_tokens: ClientCredentialsTokenSource,
    management: ManagementClient,
    refresh: RefreshTokenExchange,
}

impl AppState {
    /// Builds the outbound clients for `config`, all sharing `client`
    pub fn new(config: &RelayConfig, client: reqwest::Client) -> Self {
        let machine_tokens = ClientCredentialsTokenSource::new(
            client.clone(),
            config.token_url.clone(),
            dto::ClientCredentialsWithAudience {
                credentials: Arc::clone(&config.api_credentials),
                audience: config.audience.clone(),
            },
        );
        let management = ManagementClient::new(client.clone(), config.api_base.clone());
        let refresh = RefreshTokenExchange::new(
            client,
            config.refresh_token_url.clone(),
            Arc::clone(&config.refresh_credentials),
        );

        Self {
            machine_tokens,
            management,
            refresh,
        }
    }
}

/// The relay's routes
///
/// | Route          | Authentication |
/// |----------------|----------------|
/// | `GET /`        | none           |
/// | `POST /`       | bearer JWT     |
/// | `POST /refresh`| none           |
///
/// Cross-origin requests are permitted from anywhere.
pub fn router(config: Arc<RelayConfig>, client: reqwest::Client) -> Router {
    let resolver =
        KeyResolver::with_options(config.jwks_url.clone(), client.clone(), config.resolver);
    let authority = Authority::new(resolver, config.validator());
    let verify_jwt = VerifyJwt::new(authority, JsonErrorHandler::<Body>::new());

    Router::new()
        .route(
            "/",
            get(greet).merge(post(fetch_profile).route_layer(verify_jwt.into_layer())),
        )
        .route("/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(&config, client))
}

async fn greet() -> &'static str {
    "Hello"
}

#[tracing::instrument(skip_all, fields(user.id))]
async fn fetch_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<jwt::BasicClaims>,
) -> Result<Json<Value>, RelayError> {
    let subject = claims.sub().ok_or(RelayError::MissingSubject)?;
    let user_id = UserIdRef::from_str(subject.as_str());
    tracing::Span::current().record("user.id", tracing::field::display(user_id));

    let access_token = state.machine_tokens.request_token().await?;
    let profile = state.management.get_user(&access_token, user_id).await?;

    tracing::info!("relayed user profile");
    Ok(Json(profile))
}

/// Takes `refreshToken` from a JSON object body
///
/// The field is only refused when it is missing or falsy: `null`, `false`,
/// zero or the empty string. Any other value is forwarded in its string
/// form, so `42` is sent as `"42"` and `["a", "b"]` as `"a,b"`.
async fn refresh(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let refresh_token = body
        .as_object()
        .and_then(|fields| fields.get("refreshToken"))
        .filter(|value| is_truthy(value))
        .map(|value| RefreshToken::from(coerce_to_string(value)))
        .ok_or(RelayError::MissingRefreshToken)?;

    let payload = state.refresh.exchange(&refresh_token).await?;
    Ok(Json(payload))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(coerce_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}
