use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration of a single chat model endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "type")]
    pub provider: ModelProvider,
    #[serde(default, flatten)]
    pub settings: HashMap<String, serde_yaml::Value>,
}

/// Supported provider integrations (serialized as lowercase strings).
///
/// All three speak the OpenAI chat completions protocol; they differ in the
/// default endpoint and API key environment variable.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Openai,
    Deepseek,
    Xai,
}

impl From<ModelProvider> for String {
    fn from(val: ModelProvider) -> Self {
        val.as_str().into()
    }
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match &self {
            ModelProvider::Openai => "openai",
            ModelProvider::Deepseek => "deepseek",
            ModelProvider::Xai => "xai",
        }
    }

    /// Endpoint used when the model settings carry no `base_url`.
    pub fn default_base_url(&self) -> &'static str {
        match &self {
            ModelProvider::Openai => "https://api.openai.com/v1",
            ModelProvider::Deepseek => "https://api.deepseek.com/v1",
            ModelProvider::Xai => "https://api.x.ai/v1",
        }
    }

    /// Environment variable consulted when the model settings carry no
    /// `api_key`.
    pub fn default_key_var(&self) -> &'static str {
        match &self {
            ModelProvider::Openai => "OPENAI_API_KEY",
            ModelProvider::Deepseek => "DEEPSEEK_API_KEY",
            ModelProvider::Xai => "XAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelMetrics {
    pub init_latency_ms: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        let yaml = "type: deepseek\nname: deepseek-chat\n";
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider, ModelProvider::Deepseek);
        assert_eq!(config.name, "deepseek-chat");
        assert_eq!(String::from(config.provider), "deepseek");
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(
            ModelProvider::Xai.default_base_url(),
            "https://api.x.ai/v1"
        );
        assert_eq!(ModelProvider::Openai.default_key_var(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_settings_are_flattened() {
        let yaml = "type: openai\nname: gpt-4o\nbase_url: http://localhost:8080\n";
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.settings.get("base_url").and_then(|v| v.as_str()),
            Some("http://localhost:8080")
        );
    }
}
