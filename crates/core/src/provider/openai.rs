use crate::completion::{
    CancellationToken, ChatMessage, Completion, CompletionMetrics, CompletionModel,
    CompletionResponse, SenderType,
};
use crate::model::{ModelConfig, ModelMetrics};
use anyhow::{Result, anyhow};
use async_openai::config::OpenAIConfig;
use async_openai::{
    Client as OpenAIClient,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionStreamOptions, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::time::Instant;

/// Endpoint settings for an OpenAI-compatible provider. Both fields fall
/// back to the provider defaults when absent.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct EndpointSettings {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
}

/// Chat model served over the OpenAI chat completions protocol. Used for
/// the openai, deepseek and xai providers alike.
#[derive(Debug)]
pub struct OpenAIChatModel {
    config: ModelConfig,
    client: OpenAIClient<OpenAIConfig>,
    metrics: ModelMetrics,
}

impl OpenAIChatModel {
    pub fn new(model_config: ModelConfig) -> Result<Self> {
        let settings: EndpointSettings = serde_yaml::from_value(
            serde_yaml::to_value(&model_config.settings)
                .map_err(|_e| anyhow!("Invalid settings structure"))?,
        )?;

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| model_config.provider.default_base_url().to_string());
        let api_key = resolve_api_key(&settings, &model_config)?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        let client = OpenAIClient::with_config(config);

        Ok(Self {
            config: model_config,
            client,
            metrics: ModelMetrics {
                init_latency_ms: 0.0,
            },
        })
    }

    fn to_openai_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.sender {
            SenderType::System => ChatCompletionRequestMessage::System(
                async_openai::types::chat::ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.text.as_str())
                    .build()
                    .unwrap(),
            ),
            SenderType::Assistant => ChatCompletionRequestMessage::Assistant(
                async_openai::types::chat::ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.text.as_str())
                    .build()
                    .unwrap(),
            ),
            SenderType::User => ChatCompletionRequestMessage::User(
                async_openai::types::chat::ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.text.as_str())
                    .build()
                    .unwrap(),
            ),
        }
    }
}

/// Resolves the API key for a model.
///
/// A literal key in the settings wins. A `env:VAR` value reads `VAR` from
/// the environment. With no key configured at all, the provider's default
/// environment variable is consulted.
fn resolve_api_key(settings: &EndpointSettings, model_config: &ModelConfig) -> Result<String> {
    match settings.api_key.as_deref() {
        Some(value) if value.starts_with("env:") => {
            let env_key = value[4..].trim();
            std::env::var(env_key)
                .map_err(|_| anyhow!("Environment variable {} not found", env_key))
        }
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => {
            let env_key = model_config.provider.default_key_var();
            std::env::var(env_key).map_err(|_| {
                anyhow!(
                    "No API key for model '{}': set `api_key` in config or export {}",
                    model_config.name,
                    env_key
                )
            })
        }
    }
}

#[async_trait]
impl CompletionModel for OpenAIChatModel {
    fn metrics(&self) -> ModelMetrics {
        self.metrics.clone()
    }

    async fn load(&mut self, _text: &str) -> Result<()> {
        // No-op for remote models
        Ok(())
    }

    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        settings: &HashMap<String, String>,
        cancel_token: CancellationToken,
    ) -> BoxStream<'_, Result<Completion>> {
        let openai_messages: Vec<ChatCompletionRequestMessage> = messages
            .iter()
            .map(OpenAIChatModel::to_openai_message)
            .collect();

        let max_tokens = settings
            .get("max_tokens")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1024u32);
        let temperature = settings
            .get("temperature")
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.7);
        let top_p = settings
            .get("top_p")
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(1.0);

        let stream_options = ChatCompletionStreamOptions {
            include_usage: Some(true),
            include_obfuscation: None,
        };
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.config.name.clone())
            .messages(openai_messages)
            .max_tokens(max_tokens)
            .temperature(temperature)
            .top_p(top_p)
            .stream(true)
            .stream_options(stream_options)
            .build();

        let request = match request {
            Ok(req) => req,
            Err(err) => {
                return Box::pin(futures::stream::once(async move {
                    Err(anyhow!("Invalid request: {:?}", err))
                }));
            }
        };

        let start_time = Instant::now();
        let prev_time = start_time;
        let mut first_chunk = true;

        let outer_stream = async_stream::stream! {
            let mut prev_time = prev_time;
            let mut prompt_eval_latency = 0.0;
            let mut completion_latency = 0.0;

            match self.client.chat().create_stream(request).await {
                Ok(response) => {
                    let mut stream = response;

                    while let Some(next) = stream.next().await {
                        // Check for cancellation *before* processing the chunk
                        if cancel_token.is_cancelled() {
                            yield Err(anyhow!("Cancelled by user"));
                            break;
                        }

                        let now = Instant::now();
                        let elapsed = now.duration_since(prev_time).as_millis() as f32;
                        prev_time = now;

                        match next {
                            Ok(chunk) => {
                                let raw_json = serde_json::to_string(&chunk).unwrap_or_default();

                                if let Some(choice) = chunk.choices.first() {
                                    let text = choice.delta.content.clone().unwrap_or_default();
                                    if first_chunk {
                                        prompt_eval_latency = elapsed;
                                        first_chunk = false;
                                    }

                                    completion_latency += elapsed;

                                    yield Ok(Completion::Response(CompletionResponse {
                                        text,
                                        finish_reason: choice.finish_reason.as_ref().map(|x| format!("{x:?}")),
                                        raw_chunk: Some(raw_json.clone()),
                                    }));
                                }

                                // Some openai compatible servers club usage with the
                                // final response, others send a separate chunk.
                                if let Some(usage) = chunk.usage {
                                    yield Ok(Completion::Metrics(CompletionMetrics {
                                        prompt_tokens: usage.prompt_tokens,
                                        prompt_eval_latency_ms: prompt_eval_latency,
                                        completion_tokens: usage.completion_tokens,
                                        completion_latency_ms: completion_latency,
                                        raw_chunk: Some(raw_json.clone()),
                                    }));
                                }
                            }
                            Err(err) => {
                                yield Err(anyhow!("{} stream error: {}", self.config.provider.as_str(), err));
                            }
                        }
                    }
                }
                Err(err) => {
                    yield Err(anyhow!("{} request failed: {:?}", self.config.provider.as_str(), err));
                }
            }
        };

        Box::pin(outer_stream)
    }
}
