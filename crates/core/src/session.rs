//! A session is the shared context between a human and the AI assistant:
//! the system prompt plus the conversation so far.
use crate::{
    completion::{CancellationToken, ChatMessage, Completion, CompletionModel, SenderType},
    model::{ModelConfig, ModelMetrics},
};
use anyhow::{Context, Result};
use futures::stream::BoxStream;
use std::collections::HashMap;

/// A conversation with a single completion model.
pub struct Session {
    model: Box<dyn CompletionModel + Send + Sync>,
    system_prompt: String,
    messages: Vec<ChatMessage>,
    metrics: Option<ModelMetrics>,
}

impl Session {
    /// Create a new session with the given model configuration.
    pub async fn new(model_config: ModelConfig, system_prompt: &str) -> Result<Self> {
        Self::with_history(model_config, system_prompt, Vec::new()).await
    }

    /// Create a session seeded with an existing conversation. Used when
    /// switching models mid-chat and when restoring a saved transcript.
    pub async fn with_history(
        model_config: ModelConfig,
        system_prompt: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Self> {
        let mut model = crate::get_completion_llm(model_config)
            .context("Failed to initialize session model")?;

        model
            .load(system_prompt)
            .await
            .context("Failed to load model")?;

        let metrics = Some(model.metrics());

        Ok(Self {
            model,
            system_prompt: system_prompt.to_string(),
            messages,
            metrics,
        })
    }

    /// Add a new message to the conversation history
    pub fn add_message(&mut self, sender: SenderType, text: &str) {
        self.messages.push(ChatMessage {
            sender,
            text: text.to_string(),
        });
    }

    /// Generate a response stream for the current conversation.
    ///
    /// The system prompt is always the first message sent to the provider;
    /// it is not part of the conversation history.
    pub async fn generate(
        &mut self,
        settings: HashMap<String, String>,
        cancel_token: CancellationToken,
    ) -> Result<BoxStream<'_, Result<Completion>>> {
        let mut prompt_messages = Vec::with_capacity(self.messages.len() + 1);
        if !self.system_prompt.is_empty() {
            prompt_messages.push(ChatMessage {
                sender: SenderType::System,
                text: self.system_prompt.clone(),
            });
        }
        prompt_messages.extend(self.messages.iter().cloned());

        Ok(self
            .model
            .complete(&prompt_messages, &settings, cancel_token)
            .await)
    }

    /// Clear the conversation history
    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    /// Snapshot of the conversation, without the system prompt.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drop the last message if it came from the given sender. Used to
    /// unwind a user message after a failed or cancelled generation.
    pub fn pop_last_message(&mut self, sender: SenderType) -> Option<ChatMessage> {
        if self.messages.last().map(|m| m.sender == sender) == Some(true) {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Get model metrics if available
    pub fn metrics(&self) -> Option<&ModelMetrics> {
        self.metrics.as_ref()
    }

    /// Get the last message from the assistant
    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == SenderType::Assistant)
    }
}
