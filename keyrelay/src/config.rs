//! Process configuration
//!
//! [`Settings`] is what the operator provides, through flags or the
//! environment. [`RelayConfig`] is derived from it once at startup and is
//! immutable afterwards.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use keyrelay_authority::ResolverOptions;
use keyrelay_jose::{jwa, jwt};
use keyrelay_tokens::{oauth2::dto::ClientCredentials, ClientId, ClientSecret};
use reqwest::Url;
use thiserror::Error;

/// The third-party endpoint that exchanges refresh tokens
pub const GOOGLE_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Relays profile lookups and refresh token exchanges to identity providers
#[derive(Debug, Clone, clap::Parser)]
#[command(version, about)]
pub struct Settings {
    /// The identity platform tenant host, e.g. `tenant.example.com`, with
    /// an optional port, e.g. `localhost:8443`
    #[arg(long, env = "DOMAIN")]
    pub domain: String,

    /// The client ID used for the client credentials grant
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: ClientId,

    /// The client secret used for the client credentials grant
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: ClientSecret,

    /// The client ID presented when exchanging refresh tokens
    #[arg(long, env = "G_ID")]
    pub g_id: ClientId,

    /// The client secret presented when exchanging refresh tokens
    #[arg(long, env = "G_SECRET", hide_env_values = true)]
    pub g_secret: ClientSecret,

    /// The address to listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    /// The token endpoint used for refresh token exchanges
    #[arg(long, env = "REFRESH_TOKEN_URL", default_value = GOOGLE_TOKEN_URL)]
    pub refresh_token_url: Url,

    /// Key set fetches allowed per minute
    #[arg(long, env = "JWKS_REQUESTS_PER_MINUTE", default_value_t = 5)]
    pub jwks_requests_per_minute: usize,

    /// Seconds that fetched signing keys are trusted before a refetch
    #[arg(long, env = "JWKS_CACHE_MAX_AGE_SECS", default_value_t = 600)]
    pub jwks_cache_max_age_secs: u64,

    /// Maximum number of signing keys kept from a key set
    #[arg(long, env = "JWKS_CACHE_MAX_ENTRIES", default_value_t = 5)]
    pub jwks_cache_max_entries: usize,
}

/// An error deriving the relay configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The domain is not a host name with an optional port
    #[error("domain {domain:?} is not a host name with an optional port")]
    InvalidDomain {
        /// The configured domain
        domain: String,
    },

    /// An endpoint could not be derived from the origin
    #[error("unable to derive endpoint URL")]
    InvalidUrl(#[from] url::ParseError),
}

/// The immutable configuration shared by every request
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Credentials for the client credentials grant
    pub api_credentials: Arc<ClientCredentials>,

    /// Credentials for the refresh token grant
    pub refresh_credentials: Arc<ClientCredentials>,

    /// The required `iss` claim, `https://{domain}/`
    pub issuer: jwt::Issuer,

    /// The required `aud` claim and the audience requested for machine
    /// tokens, `https://{domain}/api/v2/`
    pub audience: jwt::Audience,

    /// The published signing key set
    pub jwks_url: Url,

    /// The identity platform's token endpoint
    pub token_url: Url,

    /// The root of the management API
    pub api_base: Url,

    /// The third-party token endpoint for refresh token exchanges
    pub refresh_token_url: Url,

    /// Tunables for the signing key cache
    pub resolver: ResolverOptions,
}

impl RelayConfig {
    /// Derives the configuration for the tenant named by `settings`
    ///
    /// # Errors
    ///
    /// The domain is anything other than a host name and an optional
    /// port. A port that `https` implies, such as `:443`, is refused as
    /// well since it would not appear in the derived issuer.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidDomain {
            domain: settings.domain.clone(),
        };

        let origin =
            Url::parse(&format!("https://{}/", settings.domain)).map_err(|_| invalid())?;
        let authority = match (origin.host_str(), origin.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => return Err(invalid()),
        };
        if !authority.eq_ignore_ascii_case(&settings.domain) || origin.path() != "/" {
            return Err(invalid());
        }

        Self::with_origin(
            origin,
            settings.refresh_token_url.clone(),
            ClientCredentials {
                client_id: settings.client_id.clone(),
                client_secret: settings.client_secret.clone(),
            },
            ClientCredentials {
                client_id: settings.g_id.clone(),
                client_secret: settings.g_secret.clone(),
            },
            ResolverOptions {
                requests_per_minute: settings.jwks_requests_per_minute,
                cache_max_age: Duration::from_secs(settings.jwks_cache_max_age_secs),
                cache_max_entries: settings.jwks_cache_max_entries,
            },
        )
    }

    /// Derives every identity platform endpoint from its `origin`
    ///
    /// # Errors
    ///
    /// An endpoint cannot be joined onto `origin`.
    pub fn with_origin(
        origin: Url,
        refresh_token_url: Url,
        api_credentials: ClientCredentials,
        refresh_credentials: ClientCredentials,
        resolver: ResolverOptions,
    ) -> Result<Self, ConfigError> {
        let api_base = origin.join("api/v2/")?;

        Ok(Self {
            api_credentials: Arc::new(api_credentials),
            refresh_credentials: Arc::new(refresh_credentials),
            issuer: jwt::Issuer::from(origin.as_str()),
            audience: jwt::Audience::from(api_base.as_str()),
            jwks_url: origin.join(".well-known/jwks.json")?,
            token_url: origin.join("oauth/token")?,
            api_base,
            refresh_token_url,
            resolver,
        })
    }

    /// The validator applied to inbound bearer tokens
    ///
    /// Only RS256 is accepted. The token must be issued by this tenant for
    /// the management API, must not be expired and, if it carries `nbf`,
    /// must already be valid.
    pub fn validator(&self) -> jwt::CoreValidator {
        jwt::CoreValidator::default()
            .add_approved_algorithm(jwa::Algorithm::RS256)
            .add_allowed_audience(self.audience.clone())
            .require_issuer(self.issuer.clone())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use color_eyre::Result;

    use super::*;

    fn settings(extra: &[&str]) -> Result<Settings> {
        settings_for("tenant.example.com", extra)
    }

    fn settings_for(domain: &str, extra: &[&str]) -> Result<Settings> {
        let mut args = vec![
            "keyrelay",
            "--domain",
            domain,
            "--client-id",
            "relay-client",
            "--client-secret",
            "relay-secret",
            "--g-id",
            "google-client",
            "--g-secret",
            "google-secret",
        ];
        args.extend_from_slice(extra);
        Ok(Settings::try_parse_from(args)?)
    }

    #[test]
    fn derives_tenant_endpoints() -> Result<()> {
        let config = RelayConfig::from_settings(&settings(&[])?)?;

        assert_eq!(config.issuer.as_str(), "https://tenant.example.com/");
        assert_eq!(config.audience.as_str(), "https://tenant.example.com/api/v2/");
        assert_eq!(
            config.jwks_url.as_str(),
            "https://tenant.example.com/.well-known/jwks.json"
        );
        assert_eq!(
            config.token_url.as_str(),
            "https://tenant.example.com/oauth/token"
        );
        assert_eq!(
            config.api_base.as_str(),
            "https://tenant.example.com/api/v2/"
        );
        assert_eq!(config.refresh_token_url.as_str(), GOOGLE_TOKEN_URL);
        Ok(())
    }

    #[test]
    fn defaults_match_the_published_limits() -> Result<()> {
        let settings = settings(&[])?;
        assert_eq!(settings.listen_addr, "0.0.0.0:3000".parse()?);

        let config = RelayConfig::from_settings(&settings)?;
        assert_eq!(config.resolver, ResolverOptions::default());
        Ok(())
    }

    #[test]
    fn key_cache_tunables_are_overridable() -> Result<()> {
        let config = RelayConfig::from_settings(&settings(&[
            "--jwks-requests-per-minute",
            "2",
            "--jwks-cache-max-age-secs",
            "30",
            "--jwks-cache-max-entries",
            "1",
        ])?)?;

        assert_eq!(
            config.resolver,
            ResolverOptions {
                requests_per_minute: 2,
                cache_max_age: Duration::from_secs(30),
                cache_max_entries: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn domain_may_carry_a_port() -> Result<()> {
        let config = RelayConfig::from_settings(&settings_for("localhost:8443", &[])?)?;

        assert_eq!(config.issuer.as_str(), "https://localhost:8443/");
        assert_eq!(
            config.jwks_url.as_str(),
            "https://localhost:8443/.well-known/jwks.json"
        );
        assert_eq!(
            config.token_url.as_str(),
            "https://localhost:8443/oauth/token"
        );
        Ok(())
    }

    #[test]
    fn domain_must_be_a_host_and_port() -> Result<()> {
        for domain in [
            "tenant.example.com/evil",
            "user@tenant.example.com",
            "tenant.example.com:443",
            "tenant.example.com:",
            "",
        ] {
            let err = RelayConfig::from_settings(&settings_for(domain, &[])?).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidDomain { .. }),
                "{domain:?} gave {err:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn missing_secrets_are_rejected() {
        let err = Settings::try_parse_from(["keyrelay", "--domain", "tenant.example.com"]);
        assert!(err.is_err());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() -> Result<()> {
        let rendered = format!("{:?}", settings(&[])?);
        assert!(!rendered.contains("relay-secret"));
        assert!(!rendered.contains("google-secret"));
        Ok(())
    }
}
