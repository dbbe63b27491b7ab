//! Provider credentials, loaded from the environment.

use anyhow::{Context, Result};

/// Endpoint and basic-auth credentials for the broker-copy provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("COPIER_API_URL").context("COPIER_API_URL not set")?,
            api_key: std::env::var("COPIER_API_KEY").context("COPIER_API_KEY not set")?,
            api_secret: std::env::var("COPIER_API_SECRET").context("COPIER_API_SECRET not set")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env() {
        std::env::set_var("COPIER_API_URL", "https://copy.example.com/api");
        std::env::set_var("COPIER_API_KEY", "key");
        std::env::set_var("COPIER_API_SECRET", "secret");

        let config = ProviderConfig::from_env().unwrap();
        assert_eq!(config.base_url, "https://copy.example.com/api");

        std::env::remove_var("COPIER_API_SECRET");
        let err = ProviderConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("COPIER_API_SECRET"));
    }
}
