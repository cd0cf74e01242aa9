//! Application registration settings.

use std::env;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_TOKEN_URL: &str = "https://launchpad.37signals.com/authorization/token";

/// Identity of the integrating application, as registered with the remote
/// API. `user_agent` should name the app and give a contact URL or email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub user_agent: String,
    pub token_url: String,
}

impl ClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            user_agent: user_agent.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Read `BCX_CLIENT_ID`, `BCX_CLIENT_SECRET`, `BCX_REDIRECT_URI`,
    /// `BCX_USER_AGENT` and optionally `BCX_TOKEN_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |name: &'static str| env::var(name).map_err(|_| ConfigError::Missing(name));
        let mut config = Self::new(
            required("BCX_CLIENT_ID")?,
            required("BCX_CLIENT_SECRET")?,
            required("BCX_REDIRECT_URI")?,
            required("BCX_USER_AGENT")?,
        );
        if let Ok(token_url) = env::var("BCX_TOKEN_URL") {
            config.token_url = token_url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
            ("user_agent", &self.user_agent),
        ];
        if let Some((name, _)) = fields.into_iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Missing(name));
        }
        Url::parse(&self.token_url).map_err(|e| ConfigError::InvalidTokenUrl {
            url: self.token_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
