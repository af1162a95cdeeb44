use crate::completion::CompletionModel;
use crate::model::ModelProvider;
use crate::provider::openai;
use anyhow::Result;
use tracing::instrument;

#[instrument(skip(model_config))]
pub fn get_completion_llm(
    model_config: crate::model::ModelConfig,
) -> Result<Box<dyn CompletionModel + Send + Sync>> {
    // Every supported provider speaks the OpenAI chat completions protocol,
    // so a single implementation covers all of them. The provider variant
    // picks the endpoint and key defaults.
    match model_config.provider {
        ModelProvider::Openai | ModelProvider::Deepseek | ModelProvider::Xai => {
            let model = openai::OpenAIChatModel::new(model_config)?;
            Ok(Box::new(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelConfig, ModelProvider};
    use std::collections::HashMap;

    #[test]
    fn test_get_completion_llm_openai_provider() {
        let mut settings = HashMap::new();
        settings.insert("base_url".to_string(), "http://localhost:1234".into());
        settings.insert("api_key".to_string(), "sk-dummy".into());
        let model_config = ModelConfig {
            name: "test-openai".to_string(),
            provider: ModelProvider::Openai,
            settings,
        };
        let model = get_completion_llm(model_config);
        assert!(model.is_ok());
    }

    #[test]
    fn test_get_completion_llm_deepseek_provider() {
        let mut settings = HashMap::new();
        settings.insert("api_key".to_string(), "sk-dummy".into());
        let model_config = ModelConfig {
            name: "deepseek-chat".to_string(),
            provider: ModelProvider::Deepseek,
            settings,
        };
        let model = get_completion_llm(model_config);
        assert!(model.is_ok());
    }
}
