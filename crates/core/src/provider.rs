use serde::{Deserialize, Serialize};

use crate::{error::LlmError, rate_limiter::RateLimitPreset};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Openai,
    Grok,
    Gemini,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-4o-mini",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Openai => "OpenAI",
            Provider::Grok => "Grok",
            Provider::Gemini => "Gemini",
        }
    }

    pub fn rate_limit_preset(&self) -> RateLimitPreset {
        match self {
            Provider::Openai => RateLimitPreset::OPENAI,
            Provider::Gemini => RateLimitPreset::GEMINI,
            Provider::Grok => RateLimitPreset::DEFAULT,
        }
    }

    /// Resolve the API key, preferring the provider's env var over `stored`.
    pub fn resolve_api_key(&self, stored: Option<&str>) -> Result<String, LlmError> {
        let config = self.config();
        let from_env = std::env::var(config.env_var)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let from_config = stored
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        from_env
            .or(from_config)
            .ok_or_else(|| LlmError::MissingApiKey {
                provider: self.name().to_string(),
                env_var: config.env_var.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_is_the_default_provider() {
        let provider = Provider::default();
        assert_eq!(provider, Provider::Openai);
        assert_eq!(provider.config().env_var, "OPENAI_API_KEY");
        assert_eq!(provider.rate_limit_preset(), RateLimitPreset::OPENAI);
    }

    #[test]
    fn stored_key_is_used_when_env_is_unset() {
        // GEMINI_API_KEY is not expected in the test environment
        if std::env::var("GEMINI_API_KEY").is_ok() {
            return;
        }
        let key = Provider::Gemini.resolve_api_key(Some("  stored-key "));
        assert_eq!(key.unwrap(), "stored-key");

        let missing = Provider::Gemini.resolve_api_key(Some("   "));
        assert!(matches!(missing, Err(LlmError::MissingApiKey { .. })));
    }

    #[test]
    fn provider_names_round_trip_through_toml_strings() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            provider: Provider,
        }
        let parsed: Holder = toml::from_str("provider = \"grok\"").unwrap();
        assert_eq!(parsed.provider, Provider::Grok);
    }
}
