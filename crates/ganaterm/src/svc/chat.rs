use anyhow::{Context, Result};
use futures::stream::{BoxStream, StreamExt};
use ganaterm_core::completion::{
    CancellationToken, ChatMessage, Completion, CompletionResponse, SenderType,
};
use ganaterm_core::config::{Config, ModeConfig, ProfileConfig};
use ganaterm_core::extract;
use ganaterm_core::history::Transcript;
use ganaterm_core::model::ModelConfig;
use ganaterm_core::session::Session;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ux::{ChatMessageType, style_chat_text};

/// Shown when every configured model failed or was unusable.
pub(crate) const OFFLINE_NOTICES: [&str; 5] = [
    "The network seems to be having trouble, no provider could be reached.",
    "The API services are unavailable right now, try again in a bit.",
    "Could not reach any AI service. Check your network connection.",
    "No provider responded. Try again later.",
    "All API calls failed. Check that your API keys are valid.",
];

fn offline_notice() -> String {
    OFFLINE_NOTICES
        .choose(&mut rand::rng())
        .unwrap_or(&OFFLINE_NOTICES[0])
        .to_string()
}

/// Chat conversation between human and AI model, with model switching,
/// fallback across configured models and transcript persistence.
pub struct Chat {
    session: Arc<Mutex<Session>>,
    models: HashMap<String, ModelConfig>,
    fallback: Vec<String>,
    profile: ProfileConfig,
    system_prompt: String,
    model_key: String,
    transcript: Option<Transcript>,
    last_log: String,
}

impl Chat {
    /// Create a chat over the given mode (`config.chat` or `config.task`).
    ///
    /// With `resume` set, the saved transcript seeds the conversation.
    pub async fn new(
        config: &Config,
        model: Option<String>,
        mode: &ModeConfig,
        transcript: Option<Transcript>,
        resume: bool,
    ) -> Result<Self> {
        let mut models = config.models.clone();

        let (model_key, model_config) = match model {
            Some(name) => {
                let model_config = models
                    .get(name.as_str())
                    .cloned()
                    .context(format!("Model '{name}' not found in config."))?;
                (name, model_config)
            }
            None => {
                // The mode's model may be a reference into `models` or an
                // inline definition; inline ones get registered under
                // their own name so switching back works.
                let key = models
                    .iter()
                    .find(|(_, v)| **v == mode.model)
                    .map(|(k, _)| k.clone());
                match key {
                    Some(k) => {
                        let model_config = models[&k].clone();
                        (k, model_config)
                    }
                    None => {
                        let k = mode.model.name.clone();
                        models.insert(k.clone(), mode.model.clone());
                        (k, mode.model.clone())
                    }
                }
            }
        };

        let messages = match (&transcript, resume) {
            (Some(t), true) => t.load().unwrap_or_else(|e| {
                warn!("Failed to load transcript: {e:#}");
                Vec::new()
            }),
            _ => Vec::new(),
        };

        let session =
            Session::with_history(model_config, &config.system_prompt, messages).await?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            models,
            fallback: config.fallback.clone(),
            profile: mode.profile.clone(),
            system_prompt: config.system_prompt.clone(),
            model_key,
            transcript,
            last_log: String::new(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_key
    }

    pub fn available_model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    /// Switch the active model, preserving the conversation.
    pub async fn set_model(&mut self, key: &str) -> Result<()> {
        let model_config = self
            .models
            .get(key)
            .cloned()
            .context(format!("Model '{key}' not found in config."))?;

        let mut session = self.session.lock().await;
        let messages = session.messages().to_vec();
        *session = Session::with_history(model_config, &self.system_prompt, messages).await?;
        self.model_key = key.to_string();
        Ok(())
    }

    pub async fn add_user_message(&self, text: &str) -> Result<()> {
        self.session
            .lock()
            .await
            .add_message(SenderType::User, text);
        if let Some(transcript) = &self.transcript {
            transcript.append(&SenderType::User, text)?;
        }
        Ok(())
    }

    /// Record the completed assistant reply in the session and transcript.
    /// The transcript gets the reply with `!`/`$` command markers stripped,
    /// so saved conversations read cleanly.
    pub async fn complete_turn(&self, text: &str) -> Result<()> {
        self.session
            .lock()
            .await
            .add_message(SenderType::Assistant, text);
        if let Some(transcript) = &self.transcript {
            let display_text = extract::strip_command_markers(text);
            transcript.append(&SenderType::Assistant, &display_text)?;
        }
        Ok(())
    }

    /// Drop the dangling user message after a failed generation, so a
    /// retry does not send it twice.
    pub async fn abandon_turn(&self) {
        self.session
            .lock()
            .await
            .pop_last_message(SenderType::User);
    }

    pub async fn clear(&self) -> Result<()> {
        self.session.lock().await.clear_history();
        if let Some(transcript) = &self.transcript {
            transcript.clear()?;
        }
        Ok(())
    }

    pub async fn last_assistant_message(&self) -> Option<ChatMessage> {
        self.session.lock().await.last_assistant_message().cloned()
    }

    pub fn set_last_log(&mut self, log: String) {
        self.last_log = log;
    }

    /// Raw provider chunks of the last reply.
    pub fn last_log(&self) -> &str {
        &self.last_log
    }

    /// Start a completion for the active model.
    ///
    /// A model that fails before producing any content is abandoned and
    /// the fallback chain is tried in order; models without a usable key
    /// are skipped. With everything exhausted, the stream carries a local
    /// offline notice instead of an error.
    pub async fn stream_response(
        &mut self,
        cancel_token: CancellationToken,
    ) -> Result<BoxStream<'static, Result<Completion>>> {
        let settings = self.profile.as_settings();

        let mut candidates = vec![self.model_key.clone()];
        for key in &self.fallback {
            if !candidates.contains(key) {
                candidates.push(key.clone());
            }
        }

        let total = candidates.len();
        for (index, key) in candidates.into_iter().enumerate() {
            if cancel_token.is_cancelled() {
                return Ok(futures::stream::empty().boxed());
            }
            if index > 0 {
                match self.set_model(&key).await {
                    Ok(()) => {
                        eprintln!(
                            "{}",
                            style_chat_text(
                                &format!("Trying model '{key}'..."),
                                ChatMessageType::Notice
                            )
                        );
                    }
                    Err(e) => {
                        debug!("Skipping fallback model '{key}': {e:#}");
                        continue;
                    }
                }
            }

            let mut stream =
                session_stream(self.session.clone(), settings.clone(), cancel_token.clone());
            match stream.next().await {
                None => return Ok(futures::stream::empty().boxed()),
                Some(Ok(first)) => {
                    return Ok(futures::stream::once(async move { Ok(first) })
                        .chain(stream)
                        .boxed());
                }
                Some(Err(e)) => {
                    warn!("Model '{key}' failed: {e:#}");
                    if index + 1 < total {
                        eprintln!(
                            "{}",
                            style_chat_text(
                                &format!("Model '{key}' failed, trying the next one..."),
                                ChatMessageType::Notice
                            )
                        );
                    }
                }
            }
        }

        let notice = offline_notice();
        Ok(futures::stream::once(async move {
            Ok(Completion::Response(CompletionResponse {
                text: notice,
                finish_reason: Some("unavailable".to_string()),
                raw_chunk: None,
            }))
        })
        .boxed())
    }
}

/// An owned stream over the shared session. The session stays locked for
/// the lifetime of the stream, so drop it before touching the session.
fn session_stream(
    session: Arc<Mutex<Session>>,
    settings: HashMap<String, String>,
    cancel_token: CancellationToken,
) -> BoxStream<'static, Result<Completion>> {
    Box::pin(async_stream::stream! {
        let mut session_lock = session.lock().await;
        let mut inner_stream = match session_lock.generate(settings, cancel_token).await {
            Ok(stream) => stream,
            Err(e) => {
                yield Err(e);
                return;
            }
        };

        while let Some(item) = inner_stream.next().await {
            yield item;
        }
    })
}
