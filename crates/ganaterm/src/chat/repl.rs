use crate::chat::process_message;
use crate::svc::chat::Chat;
use crate::ux::{ChatMessageType, TerminalRenderer, style_chat_text};
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rustyline::completion::{Candidate, Completer};
use rustyline::error::ReadlineError;
use rustyline::hint::Hinter;
use rustyline::{CompletionType, Editor, Helper, Highlighter, Validator};
use std::sync::Arc;
use syntect::highlighting::Theme;
use tokio::sync::Mutex;

// -------------
// REPL commands
// -------------
#[derive(Parser, Debug)]
#[command(multicall = true)]
struct CliCommand {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Hash, PartialEq, Eq)]
enum Command {
    /// Clear chat history, including the saved transcript
    Clear,
    /// Show raw provider chunks for the last assistant message
    Log,
    /// Manage chat models.
    ///
    /// With no arguments, shows the current model.
    /// Use "list" to see available models.
    #[command(alias = "m")]
    Model {
        /// Model name to switch to, or "list"
        name: Option<String>,
    },
    /// Exit the chat session
    #[command(alias = "q", alias = "quit")]
    Exit,
}

impl Command {
    /// Executes a REPL command.
    ///
    /// Returns `Ok(false)` if the REPL should exit.
    pub async fn execute(self, session: Arc<Mutex<Chat>>) -> Result<bool> {
        match self {
            Command::Clear => {
                session.lock().await.clear().await?;
                println!("Chat history cleared");
            }
            Command::Log => {
                let chat_guard = session.lock().await;
                let log = chat_guard.last_log();
                if log.is_empty() {
                    println!("No logs for the last reply.");
                } else {
                    println!("{log}");
                }
            }
            Command::Model { name } => match name {
                Some(name) => {
                    if name == "list" {
                        let chat_guard = session.lock().await;
                        let model_names = chat_guard.available_model_names();
                        println!("Available models: {}", model_names.join(", "));
                    } else {
                        let mut chat_guard = session.lock().await;
                        match chat_guard.set_model(&name).await {
                            Ok(()) => {
                                println!("Model switched to: {name}");
                            }
                            Err(e) => {
                                let error_msg = format!("Error switching model: {e}");
                                eprintln!(
                                    "{}",
                                    style_chat_text(&error_msg, ChatMessageType::Error)
                                );
                            }
                        }
                    }
                }
                None => {
                    let chat_guard = session.lock().await;
                    println!("Current model: {}", chat_guard.model_name());
                }
            },
            Command::Exit => {
                println!("Bye!");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// Model command completion
fn model_compl(
    line: &str,
    pos: usize,
    model_names: &[String],
) -> Result<(usize, Vec<CompletionCandidate>), ReadlineError> {
    let line_to_pos = &line[..pos];
    if let Some(space_pos) = line_to_pos.rfind(' ') {
        let model_prefix_start = space_pos + 1;
        if model_prefix_start <= line_to_pos.len() {
            let model_prefix = &line_to_pos[model_prefix_start..];
            let mut candidates = model_names
                .iter()
                .filter(|name| name.starts_with(model_prefix))
                .map(|name| CompletionCandidate::new(name))
                .collect::<Vec<_>>();

            if "list".starts_with(model_prefix) && !model_names.contains(&"list".to_string()) {
                candidates.push(CompletionCandidate::new("list"));
            }
            return Ok((model_prefix_start, candidates));
        }
    }
    Ok((0, Vec::new()))
}

// -------------
// REPL completion
// -------------
#[derive(Helper, Validator, Highlighter)]
struct Repl {
    pub command_names: Vec<String>,
    pub model_names: Vec<String>,
}

#[derive(Debug)]
struct CompletionCandidate {
    text: String,
    display_string: String,
}

impl CompletionCandidate {
    pub fn new(text: &str) -> Self {
        let display_string = style_chat_text(text, ChatMessageType::Footer).to_string();
        Self {
            text: text.to_owned(),
            display_string,
        }
    }
}

impl Candidate for CompletionCandidate {
    fn display(&self) -> &str {
        &self.display_string
    }

    fn replacement(&self) -> &str {
        &self.text
    }
}

impl Completer for Repl {
    type Candidate = CompletionCandidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> Result<(usize, Vec<Self::Candidate>), ReadlineError> {
        if !line.starts_with('/') {
            return Ok((0, Vec::new()));
        }

        let args = shlex::split(line).unwrap_or_default();
        if let Ok(cli_command) = CliCommand::try_parse_from(&args) {
            return match cli_command.command {
                Command::Model { .. } => model_compl(line, pos, &self.model_names),
                _ => Ok((0, Vec::new())),
            };
        }

        let candidates = self
            .command_names
            .iter()
            .filter(|name| name.starts_with(line))
            .map(|name| CompletionCandidate::new(name))
            .collect();

        Ok((0, candidates))
    }
}

impl Hinter for Repl {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if line.is_empty() || pos < line.len() {
            return None;
        }
        if line.starts_with('/') {
            // Suggest command completions
            self.command_names
                .iter()
                .find(|&cmd_name| cmd_name.starts_with(line))
                .map(|cmd_name| cmd_name[line.len()..].into())
        } else {
            None
        }
    }
}

/// Runs the interactive REPL for the chat session.
pub async fn run(
    chat: Arc<Mutex<Chat>>,
    renderer: &mut TerminalRenderer<'_>,
    theme: &Theme,
) -> Result<()> {
    println!("Welcome to ganaterm! Type '/help' for commands, '/q' to exit.");

    let config = rustyline::Config::builder()
        .history_ignore_dups(true)?
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let command_names = CliCommand::command()
        .get_subcommands()
        .flat_map(|c| c.get_name_and_visible_aliases())
        .map(|s| format!("/{s}"))
        .collect::<Vec<_>>();
    let model_names = {
        let chat_guard = chat.lock().await;
        chat_guard.available_model_names()
    };

    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(Repl {
        command_names,
        model_names,
    }));

    loop {
        let prompt = {
            let chat_guard = chat.lock().await;
            let prompt_meta = format!("[model: {}]", chat_guard.model_name());
            format!(
                "\n{}\n{}",
                style_chat_text(&prompt_meta, ChatMessageType::Prompt),
                style_chat_text("> ", ChatMessageType::Prompt)
            )
        };
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(&line)?;
                let trimmed_line = line.trim();

                if trimmed_line.is_empty() {
                    continue;
                }

                if trimmed_line.starts_with('/') {
                    let args = shlex::split(trimmed_line).unwrap_or_default();
                    match CliCommand::try_parse_from(args) {
                        Ok(cli_command) => {
                            if !cli_command.command.execute(chat.clone()).await? {
                                return Ok(()); // Exit REPL
                            }
                        }
                        Err(e) => {
                            e.print()?;
                        }
                    }
                } else {
                    process_message(chat.clone(), renderer, theme, line.to_string(), true)
                        .await?;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Type /exit to quit.");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nBye!");
                return Ok(());
            }
            Err(err) => {
                return Err(err.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::DefaultHistory;

    #[test]
    fn test_model_command_completion() {
        let history = DefaultHistory::new();

        let repl = Repl {
            command_names: vec![],
            model_names: vec!["model1".to_string(), "model2".to_string()],
        };

        // Simulate user typing "/model mod"
        let line = "/model mod";
        let (start, candidates) = repl
            .complete(line, line.len(), &rustyline::Context::new(&history))
            .unwrap();

        // Expecting completion to start at the model prefix (after the space)
        assert_eq!(start, 7); // "/model ".len() is 7
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].replacement(), "model1");
        assert_eq!(candidates[1].replacement(), "model2");

        // Simulate user typing "/model l"
        let line = "/model l";
        let (start, candidates) = repl
            .complete(line, line.len(), &rustyline::Context::new(&history))
            .unwrap();
        assert_eq!(start, 7);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].replacement(), "list");
    }

    #[test]
    fn test_command_name_completion() {
        let history = DefaultHistory::new();

        let repl = Repl {
            command_names: vec!["/clear".to_string(), "/log".to_string(), "/exit".to_string()],
            model_names: vec![],
        };

        let line = "/c";
        let (start, candidates) = repl
            .complete(line, line.len(), &rustyline::Context::new(&history))
            .unwrap();
        assert_eq!(start, 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].replacement(), "/clear");
    }

    #[test]
    fn test_plain_text_is_not_completed() {
        let history = DefaultHistory::new();
        let repl = Repl {
            command_names: vec!["/clear".to_string()],
            model_names: vec![],
        };

        let line = "how do I clear the screen?";
        let (_, candidates) = repl
            .complete(line, line.len(), &rustyline::Context::new(&history))
            .unwrap();
        assert!(candidates.is_empty());
    }
}
