pub mod repl;

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use ganaterm_core::completion::{CancellationToken, Completion, CompletionMetrics};
use syntect::highlighting::Theme;
use tokio::sync::Mutex;

use crate::actions::{self, ReviewOutcome};
use crate::svc::chat::Chat;
use crate::ux::{ChatMessageType, GenerationSpinner, TerminalRenderer, format_footer_metrics, style_chat_text};

/// Send one user message, stream-render the reply, then walk the user
/// through anything actionable in it. A "request changes" review outcome
/// feeds back into another turn.
pub(crate) async fn process_message(
    chat: Arc<Mutex<Chat>>,
    renderer: &mut TerminalRenderer<'_>,
    theme: &Theme,
    text: String,
    review: bool,
) -> Result<()> {
    let mut metrics = CompletionMetrics::default();
    let mut finish_reason: Option<String> = None;
    let mut collected = String::new();
    let mut raw_logs = String::new();
    let mut stream_error = false;

    // Clear renderer state for this new message processing cycle.
    renderer.clear();

    let spinner = GenerationSpinner::new("Thinking...".to_string());
    let cancel_token = CancellationToken::new();

    let mut stream = {
        let mut chat_guard = chat.lock().await;
        chat_guard.add_user_message(&text).await?;
        match chat_guard.stream_response(cancel_token.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                spinner.clear();
                return Err(e);
            }
        }
    };

    let mut first_token_received = false;
    let mut was_cancelled = false;

    // Start listening for Ctrl-C
    let mut ctrl_c_stream = Box::pin(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = &mut ctrl_c_stream => {
                cancel_token.cancel();
                was_cancelled = true;
                break;
            },

            next = stream.next() => {
                match next {
                    Some(response) => {
                        if !first_token_received {
                            spinner.clear();
                            first_token_received = true;
                        }

                        match response {
                            Ok(Completion::Response(chunk)) => {
                                if let Some(raw) = &chunk.raw_chunk {
                                    raw_logs.push_str(raw);
                                    raw_logs.push('\n');
                                }
                                if !chunk.text.is_empty() {
                                    renderer.render_markdown(&chunk.text).await?;
                                    collected.push_str(&chunk.text);
                                }
                                if let Some(reason) = &chunk.finish_reason {
                                    finish_reason = Some(reason.clone());
                                }
                            }
                            Ok(Completion::Metrics(m)) => {
                                if let Some(raw) = &m.raw_chunk {
                                    raw_logs.push_str(raw);
                                    raw_logs.push('\n');
                                }
                                metrics = m;
                            }
                            Err(e) => {
                                eprintln!("{}", style_chat_text(&format!("Error: {e}"), ChatMessageType::Error));
                                stream_error = true;
                                break;
                            }
                        }
                    }
                    // End of stream
                    None => break,
                }
            }
        }
    }

    // The stream holds the session lock; release it before recording.
    drop(stream);
    spinner.clear();

    if was_cancelled {
        // No partial assistant message survives a cancellation.
        println!();
        let footer = format_footer_metrics(&CompletionMetrics::default(), None, true);
        println!("{}", style_chat_text(&footer, ChatMessageType::Footer));
        return Ok(());
    }

    if stream_error {
        chat.lock().await.abandon_turn().await;
        return Ok(());
    }

    // Flush any partial line before the footer.
    renderer.render_markdown("\n").await?;

    {
        let mut chat_guard = chat.lock().await;
        chat_guard.set_last_log(raw_logs);
        chat_guard.complete_turn(&collected).await?;
    }

    let footer = format_footer_metrics(&metrics, finish_reason.as_deref(), false);
    println!();
    println!("{}", style_chat_text(&footer, ChatMessageType::Footer));

    if review {
        if let ReviewOutcome::Revise(feedback) = actions::review_response(&collected, theme).await? {
            let followup = format!("Please revise the code: {feedback}");
            return Box::pin(process_message(chat, renderer, theme, followup, review)).await;
        }
    }

    Ok(())
}
