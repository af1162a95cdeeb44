//! Shell command execution with live output.
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use console::Style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::ux::{ChatMessageType, style_chat_text};

/// Run a command through `sh -c`, echoing stdout as it arrives and stderr
/// in red. Returns whether the command exited successfully.
pub async fn run_shell_command(command: &str) -> Result<bool> {
    println!(
        "{}",
        style_chat_text(&format!("Running: {command}"), ChatMessageType::Notice)
    );

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn command: {command}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Child process has no stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("Child process has no stderr"))?;

    let echo_stdout = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            println!("{line}");
        }
        Ok::<(), std::io::Error>(())
    };
    let echo_stderr = async {
        let err_style = Style::new().red();
        let mut lines = BufReader::new(stderr).lines();
        while let Some(line) = lines.next_line().await? {
            eprintln!("{}", err_style.apply_to(line));
        }
        Ok::<(), std::io::Error>(())
    };
    tokio::try_join!(echo_stdout, echo_stderr)?;

    let status = child.wait().await?;
    if status.success() {
        println!(
            "{}",
            style_chat_text("Command succeeded", ChatMessageType::Notice)
        );
    } else {
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        eprintln!(
            "{}",
            style_chat_text(
                &format!("Command failed with exit code {code}"),
                ChatMessageType::Error
            )
        );
    }
    Ok(status.success())
}
