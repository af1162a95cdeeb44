//! Parsing of assistant replies into actionable pieces: fenced code
//! blocks, suggested shell commands, and file name hints.
use std::ops::Range;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

/// Fence tags that mark a block as a runnable shell command rather than a
/// file candidate.
const COMMAND_TAGS: [&str; 2] = ["command", "run"];

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```([A-Za-z0-9_+-]*)[ \t]*\n((?s).*?)\n?```").unwrap());

static COMMAND_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[!$]\s*(.+)$").unwrap());

// Deny-list of command shapes that are never offered for execution.
static DANGEROUS_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\brm\s+(-[a-zA-Z]+\s+)*(/|~|\.\.)",     // delete from a root-ish path
        r"\bmv\s+\S+\s+(/|~)",                    // move onto a root-ish path
        r"\bdd\s+",                               // raw disk writes
        r"\bformat\b",
        r"\bmkfs\b",
        r"\b(halt|poweroff|shutdown|reboot)\b",
        r":\(\)\s*\{.*\}\s*;\s*:",                // fork bomb
        r"\bchmod\s+(-[a-zA-Z]*R[a-zA-Z]*\s+).*777\b", // recursive chmod 777
        r"\b(wget|curl)\b.*\|\s*(bash|sh)\b",     // pipe a download into a shell
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static FILENAME_MARKER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^\s*(?://|#)\s*filename\s*:\s*(\S+)",
        r"/\*\s*filename\s*:\s*(\S+)\s*\*/",
        r"<!--\s*filename\s*:\s*(\S+)\s*-->",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// A fenced code block found in an assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
    /// Byte range of the whole fenced block in the source text.
    pub span: Range<usize>,
    /// The fence was tagged as a runnable command (`command` / `run`).
    pub is_command: bool,
}

/// Find all closed fenced code blocks. An unclosed trailing fence yields
/// no block.
pub fn detect_code_blocks(text: &str) -> Vec<CodeBlock> {
    FENCE_RE
        .captures_iter(text)
        .map(|caps| {
            let whole = caps.get(0).unwrap();
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let is_command = COMMAND_TAGS.contains(&tag.to_lowercase().as_str());
            let language = if is_command {
                "bash".to_string()
            } else if tag.is_empty() {
                "text".to_string()
            } else {
                tag.to_string()
            };
            CodeBlock {
                language,
                content: caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_string(),
                span: whole.range(),
                is_command,
            }
        })
        .collect()
}

/// Lines starting with `!` or `$` outside code fences are inline command
/// suggestions.
pub fn command_lines(text: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = COMMAND_LINE_RE.captures(trimmed) {
            let cmd = caps[1].trim().to_string();
            if !cmd.is_empty() {
                commands.push(cmd);
            }
        }
    }
    commands
}

/// Remove the `!`/`$` markers from command lines so the displayed reply
/// reads cleanly.
pub fn strip_command_markers(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            out.push(line.to_string());
            continue;
        }
        if !in_fence && COMMAND_LINE_RE.is_match(trimmed) {
            out.push(COMMAND_LINE_RE.replace(trimmed, "$1").into_owned());
        } else {
            out.push(line.to_string());
        }
    }
    let mut joined = out.join("\n");
    if text.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Whether a command matches the deny-list. Dangerous commands are shown
/// but never offered for execution.
pub fn is_dangerous(command: &str) -> bool {
    DANGEROUS_RES.iter().any(|re| re.is_match(command))
}

fn extension_for(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "python" | "py" => ".py",
        "javascript" | "js" => ".js",
        "typescript" | "ts" => ".ts",
        "html" => ".html",
        "css" => ".css",
        "json" => ".json",
        "yaml" | "yml" => ".yaml",
        "toml" => ".toml",
        "bash" | "shell" | "sh" => ".sh",
        "ruby" | "rb" => ".rb",
        "go" => ".go",
        "java" => ".java",
        "c" => ".c",
        "cpp" | "c++" => ".cpp",
        "rust" | "rs" => ".rs",
        _ => ".txt",
    }
}

/// Suggest a file name for a code block.
///
/// A `filename:` marker comment inside the block wins; otherwise a few
/// language heuristics apply, and the fallback is a timestamped name with
/// a language-derived extension.
pub fn suggest_filename(block: &CodeBlock) -> String {
    for re in FILENAME_MARKER_RES.iter() {
        if let Some(caps) = re.captures(&block.content) {
            return caps[1].to_string();
        }
    }

    let language = block.language.to_lowercase();
    let content = block.content.as_str();
    match language.as_str() {
        "python" | "py" => {
            if content.contains("def main") || content.contains("if __name__ == \"__main__\"") {
                return "main.py".to_string();
            }
            static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"class\s+(\w+)").unwrap());
            if let Some(caps) = CLASS_RE.captures(content) {
                return format!("{}.py", caps[1].to_lowercase());
            }
        }
        "javascript" | "js" => {
            if content.contains("function main") || content.contains("const main") {
                return "main.js".to_string();
            }
        }
        "html" => return "index.html".to_string(),
        "bash" | "shell" | "sh" => return "script.sh".to_string(),
        _ => {}
    }

    format!(
        "snippet-{}{}",
        Utc::now().timestamp(),
        extension_for(&language)
    )
}
