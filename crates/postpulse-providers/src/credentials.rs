//! Credential lookup contract.
//!
//! Token refresh is the implementor's job: whatever [`CredentialProvider`]
//! returns must be valid for the immediate call.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use postpulse_core::{AppConfig, Provider};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
}

impl Credentials {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[redacted]")
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns credentials for `user_id` on `provider`, or `None` if the user
    /// has not connected that provider or the token cannot be refreshed.
    async fn get_valid_credentials(&self, provider: Provider, user_id: &str) -> Option<Credentials>;
}

/// One configured token per provider, used for every user id.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    tokens: HashMap<Provider, Credentials>,
}

impl StaticCredentialProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, provider: Provider, access_token: impl Into<String>) -> Self {
        self.tokens.insert(provider, Credentials::new(access_token));
        self
    }

    /// Collects the `POSTPULSE_<PROVIDER>_ACCESS_TOKEN` values present in
    /// `config`.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Provider::ALL
            .into_iter()
            .fold(Self::new(), |creds, provider| {
                match &config.provider(provider).access_token {
                    Some(token) => creds.with_token(provider, token.clone()),
                    None => creds,
                }
            })
    }

    #[must_use]
    pub fn has_token(&self, provider: Provider) -> bool {
        self.tokens.contains_key(&provider)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_valid_credentials(&self, provider: Provider, _user_id: &str) -> Option<Credentials> {
        self.tokens.get(&provider).cloned()
    }
}
