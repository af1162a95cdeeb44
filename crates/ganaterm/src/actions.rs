//! Review flow for assistant replies: offer detected commands for
//! execution and detected code blocks for saving, behind explicit
//! confirmation.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};
use ganaterm_core::extract::{self, CodeBlock};
use syntect::highlighting::Theme;

use crate::exec;
use crate::ux::{ChatMessageType, highlight_snippet, style_chat_text};

/// What the user asked for after reviewing a block.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Done,
    /// Send this feedback back to the model for another round.
    Revise(String),
}

/// Split a reply into command suggestions and file candidates.
///
/// Commands come from `!`/`$` lines and from `command`-tagged fences (one
/// command per non-empty line); the remaining fenced blocks are file
/// candidates.
pub fn collect_suggestions(text: &str) -> (Vec<String>, Vec<CodeBlock>) {
    let mut commands = extract::command_lines(text);
    let mut files = Vec::new();

    for block in extract::detect_code_blocks(text) {
        if block.is_command {
            commands.extend(
                block
                    .content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from),
            );
        } else {
            files.push(block);
        }
    }
    (commands, files)
}

/// Walk the user through everything actionable in a reply.
pub async fn review_response(text: &str, theme: &Theme) -> Result<ReviewOutcome> {
    let (commands, blocks) = collect_suggestions(text);

    for command in &commands {
        offer_command(command).await?;
    }
    for block in &blocks {
        if let ReviewOutcome::Revise(feedback) = offer_block(block, theme).await? {
            return Ok(ReviewOutcome::Revise(feedback));
        }
    }
    Ok(ReviewOutcome::Done)
}

async fn offer_command(command: &str) -> Result<()> {
    if extract::is_dangerous(command) {
        eprintln!(
            "{}",
            style_chat_text(
                &format!("Refusing to offer a dangerous command: {command}"),
                ChatMessageType::Error
            )
        );
        return Ok(());
    }

    let run = Confirm::new()
        .with_prompt(format!("Run `{command}`?"))
        .default(false)
        .interact()?;
    if run {
        // Checked again right before the spawn; the prompt text the user
        // confirmed is exactly what runs.
        if extract::is_dangerous(command) {
            return Ok(());
        }
        exec::run_shell_command(command).await?;
    } else {
        println!(
            "{}",
            style_chat_text("Skipped.", ChatMessageType::Footer)
        );
    }
    Ok(())
}

async fn offer_block(block: &CodeBlock, theme: &Theme) -> Result<ReviewOutcome> {
    let mut target = std::env::current_dir()?.join(extract::suggest_filename(block));

    loop {
        let prompt = format!(
            "Found a {} block. Save to {}?",
            block.language,
            target.display()
        );
        let choice = Select::new()
            .with_prompt(prompt)
            .items(&["Write", "Show content", "Rename", "Request changes", "Discard"])
            .default(0)
            .interact()?;

        match choice {
            0 => {
                write_block(&target, block).await?;
                return Ok(ReviewOutcome::Done);
            }
            1 => {
                println!("{}", highlight_snippet(&block.content, &block.language, theme));
            }
            2 => {
                let input: String = Input::new()
                    .with_prompt("New file name")
                    .interact_text()?;
                if input.trim().is_empty() {
                    println!(
                        "{}",
                        style_chat_text("No file name given.", ChatMessageType::Footer)
                    );
                    continue;
                }
                target = expand_path(input.trim())?;
            }
            3 => {
                let feedback: String = Input::new()
                    .with_prompt("What should change")
                    .allow_empty(true)
                    .interact_text()?;
                if feedback.trim().is_empty() {
                    println!(
                        "{}",
                        style_chat_text("No feedback given.", ChatMessageType::Footer)
                    );
                    continue;
                }
                return Ok(ReviewOutcome::Revise(feedback.trim().to_string()));
            }
            _ => {
                println!(
                    "{}",
                    style_chat_text("Discarded.", ChatMessageType::Footer)
                );
                return Ok(ReviewOutcome::Done);
            }
        }
    }
}

/// Expand `~` and environment variables; relative paths resolve against
/// the current directory.
fn expand_path(input: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(input)
        .map_err(|e| anyhow::anyhow!("Cannot expand '{input}': {e}"))?;
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

async fn write_block(target: &Path, block: &CodeBlock) -> Result<()> {
    let mut content = block.content.clone();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    std::fs::write(target, content)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!(
        "{}",
        style_chat_text(
            &format!("Wrote {}", target.display()),
            ChatMessageType::Notice
        )
    );

    offer_execution(target, &block.language).await
}

/// Follow-up action after saving a block to disk.
#[derive(Debug, Clone, PartialEq)]
enum PostWriteAction {
    /// Shell scripts get `chmod +x` first, then run directly.
    MakeExecutableThenRun,
    /// Scripts run through an interpreter.
    RunWith(&'static str),
    None,
}

fn post_write_action(target: &Path, language: &str) -> PostWriteAction {
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match language.to_lowercase().as_str() {
        "sh" | "bash" | "shell" => PostWriteAction::MakeExecutableThenRun,
        "python" | "py" => PostWriteAction::RunWith("python3"),
        "javascript" | "js" => PostWriteAction::RunWith("node"),
        _ => match ext {
            "sh" => PostWriteAction::MakeExecutableThenRun,
            "py" => PostWriteAction::RunWith("python3"),
            "js" => PostWriteAction::RunWith("node"),
            _ => PostWriteAction::None,
        },
    }
}

async fn offer_execution(target: &Path, language: &str) -> Result<()> {
    let path_str = target.to_string_lossy();
    let quoted = shlex::try_quote(&path_str)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| path_str.to_string());

    match post_write_action(target, language) {
        PostWriteAction::MakeExecutableThenRun => {
            let chmod = format!("chmod +x {quoted}");
            let confirmed = Confirm::new()
                .with_prompt(format!("Run `{chmod}`?"))
                .default(false)
                .interact()?;
            if confirmed && exec::run_shell_command(&chmod).await? {
                let run = Confirm::new()
                    .with_prompt(format!("Run `{quoted}`?"))
                    .default(false)
                    .interact()?;
                if run {
                    exec::run_shell_command(&quoted).await?;
                }
            }
        }
        PostWriteAction::RunWith(interpreter) => {
            let command = format!("{interpreter} {quoted}");
            let run = Confirm::new()
                .with_prompt(format!("Run `{command}`?"))
                .default(false)
                .interact()?;
            if run {
                exec::run_shell_command(&command).await?;
            }
        }
        PostWriteAction::None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_suggestions_splits_commands_and_files() {
        let text = "Try this:\n! df -h\n```command\nuname -a\n```\n```python\nprint('hi')\n```";
        let (commands, files) = collect_suggestions(text);
        assert_eq!(commands, vec!["df -h".to_string(), "uname -a".to_string()]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].language, "python");
    }

    #[test]
    fn test_collect_suggestions_multiline_command_block() {
        let text = "```command\ncd /tmp\n\nls -la\n```";
        let (commands, files) = collect_suggestions(text);
        assert_eq!(commands, vec!["cd /tmp".to_string(), "ls -la".to_string()]);
        assert!(files.is_empty());
    }

    #[test]
    fn test_expand_path_tilde() {
        let home = std::env::var("HOME").unwrap();
        let path = expand_path("~/notes.txt").unwrap();
        assert_eq!(path, PathBuf::from(home).join("notes.txt"));
    }

    #[test]
    fn test_expand_path_relative() {
        let path = expand_path("out/snippet.py").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("out/snippet.py"));
    }

    #[test]
    fn test_post_write_action() {
        assert_eq!(
            post_write_action(Path::new("/tmp/script.sh"), "bash"),
            PostWriteAction::MakeExecutableThenRun
        );
        assert_eq!(
            post_write_action(Path::new("/tmp/main.py"), "python"),
            PostWriteAction::RunWith("python3")
        );
        assert_eq!(
            post_write_action(Path::new("/tmp/app.js"), "text"),
            PostWriteAction::RunWith("node")
        );
        assert_eq!(
            post_write_action(Path::new("/tmp/notes.txt"), "text"),
            PostWriteAction::None
        );
    }
}
