use std::sync::Arc;

use anyhow::{Result, bail};
use console::Term;
use ganaterm_core::config::Config;
use ganaterm_core::history::Transcript;
use tokio::sync::Mutex;
use tracing::warn;

use crate::chat::process_message;
use crate::svc::chat::Chat;
use crate::ux::{TerminalRenderer, get_render_theme};

/// One-shot mode: send a question with the `task` defaults, render the
/// reply, run the review flow, done.
pub async fn execute(question: Vec<String>, model: Option<String>, config: &Config) -> Result<()> {
    let question = question.join(" ");
    if question.trim().is_empty() {
        bail!("Please provide a question.");
    }

    // Single questions still land in the transcript, but do not resume it.
    let transcript = match Transcript::in_data_dir() {
        Ok(transcript) => Some(transcript),
        Err(e) => {
            warn!("Transcript unavailable: {e:#}");
            None
        }
    };

    let chat = Chat::new(config, model, &config.task, transcript, false).await?;
    let chat = Arc::new(Mutex::new(chat));

    let theme = get_render_theme(&config.theme);
    let mut term = Term::stdout();
    let mut renderer = TerminalRenderer::new(&mut term, &theme, &config.typewriter);

    process_message(chat, &mut renderer, &theme, question, true).await
}
