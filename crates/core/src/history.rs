//! Append-only JSONL transcript of the conversation, one record per line.
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    str::FromStr,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::completion::{ChatMessage, SenderType};

#[derive(Debug, Serialize, Deserialize)]
struct TranscriptRecord {
    time: DateTime<Utc>,
    role: String,
    content: String,
}

/// Conversation transcript persisted across runs.
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Transcript at the default location, `<data_dir>/history.jsonl`.
    pub fn in_data_dir() -> Result<Self> {
        let data_dir = crate::get_data_dir().context("Failed to get data directory")?;
        Ok(Self::new(data_dir.join("history.jsonl")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load all messages. Malformed lines are skipped with a warning so a
    /// partially corrupted transcript never blocks startup.
    pub fn load(&self) -> Result<Vec<ChatMessage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open transcript: {}", self.path.display()))?;
        let mut messages = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptRecord>(&line) {
                Ok(record) => match SenderType::from_str(&record.role) {
                    Ok(sender) => messages.push(ChatMessage {
                        sender,
                        text: record.content,
                    }),
                    Err(_) => warn!("Skipping transcript line {}: unknown role", index + 1),
                },
                Err(e) => warn!("Skipping malformed transcript line {}: {e}", index + 1),
            }
        }
        Ok(messages)
    }

    /// Append one message.
    pub fn append(&self, sender: &SenderType, content: &str) -> Result<()> {
        let record = TranscriptRecord {
            time: Utc::now(),
            role: sender.as_str().to_string(),
            content: content.to_string(),
        };
        let line = serde_json::to_string(&record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open transcript: {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Remove all saved messages.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            File::create(&self.path)
                .with_context(|| format!("Failed to truncate: {}", self.path.display()))?;
        }
        Ok(())
    }
}
