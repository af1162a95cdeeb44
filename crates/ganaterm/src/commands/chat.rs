use std::sync::Arc;

use anyhow::Result;
use console::Term;
use ganaterm_core::config::Config;
use ganaterm_core::history::Transcript;
use tokio::sync::Mutex;
use tracing::warn;

use crate::chat::repl;
use crate::svc::chat::Chat;
use crate::ux::{TerminalRenderer, get_render_theme};

/// Interactive chat over the `chat` defaults, resuming the saved
/// transcript unless asked not to.
pub async fn execute(model: Option<String>, no_history: bool, config: &Config) -> Result<()> {
    let transcript = match Transcript::in_data_dir() {
        Ok(transcript) => Some(transcript),
        Err(e) => {
            warn!("Transcript unavailable: {e:#}");
            None
        }
    };

    let chat = Chat::new(config, model, &config.chat, transcript, !no_history).await?;
    let chat = Arc::new(Mutex::new(chat));

    let theme = get_render_theme(&config.theme);
    let mut term = Term::stdout();
    let mut renderer = TerminalRenderer::new(&mut term, &theme, &config.typewriter);

    repl::run(chat, &mut renderer, &theme).await
}
