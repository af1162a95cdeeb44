use std::io::Write;
use std::time::Duration;

use console::Term;
use ganaterm_core::config::TypewriterConfig;
use syntect::{
    easy::HighlightLines,
    highlighting::{Style as SyntectStyle, Theme, ThemeSet},
    parsing::SyntaxSet,
    util::{LinesWithEndings, as_24_bit_terminal_escaped},
};

/// Returns a syntect theme matching the configured appearance.
pub fn get_render_theme(theme_name: &str) -> Theme {
    let theme_set = ThemeSet::load_defaults();
    let theme_key = match theme_name {
        "dark" => "base16-ocean.dark",
        _ => "InspiredGitHub",
    };
    theme_set.themes[theme_key].clone()
}

/// Streaming markdown renderer for the terminal.
///
/// Highlights whatever arrives through `render_markdown`, one line at a
/// time, and optionally paces the output like a typewriter.
pub struct TerminalRenderer<'a> {
    term: &'a mut Term,
    syntax_set: SyntaxSet,
    theme: &'a Theme,
    highlighter: HighlightLines<'a>,
    char_delay: Option<Duration>,
}

impl<'a> TerminalRenderer<'a> {
    pub fn new(term: &'a mut Term, theme: &'a Theme, typewriter: &TypewriterConfig) -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let syntax = syntax_set.find_syntax_by_extension("md").unwrap();
        let highlighter = HighlightLines::new(syntax, theme);

        Self {
            term,
            syntax_set,
            theme,
            highlighter,
            char_delay: char_delay(typewriter),
        }
    }

    /// Reset highlighter state for a new rendering session.
    pub fn clear(&mut self) {
        let syntax = self.syntax_set.find_syntax_by_extension("md").unwrap();
        self.highlighter = HighlightLines::new(syntax, self.theme);
    }

    /// Render a chunk of streamed markdown. The chunk may end mid-line;
    /// highlighting state carries over to the next call.
    pub async fn render_markdown(&mut self, text: &str) -> Result<(), anyhow::Error> {
        let lines: Vec<&str> = LinesWithEndings::from(text).collect();
        for line in lines {
            let ranges = self
                .highlighter
                .highlight_line(line, &self.syntax_set)
                .unwrap_or_else(|_| vec![(SyntectStyle::default(), line)]);

            match self.char_delay {
                None => {
                    let highlighted = as_24_bit_terminal_escaped(&ranges[..], false);
                    self.term.write_all(highlighted.as_bytes())?;
                }
                Some(delay) => {
                    // Emit one character at a time so the pacing stays
                    // even across styled segments.
                    for (style, segment) in &ranges {
                        for ch in segment.chars() {
                            let buf = ch.to_string();
                            let escaped =
                                as_24_bit_terminal_escaped(&[(*style, buf.as_str())], false);
                            self.term.write_all(escaped.as_bytes())?;
                            self.term.flush()?;
                            if ch != '\n' {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }
            }
        }
        // as_24_bit_terminal_escaped leaves the last color active
        self.term.write_all(b"\x1b[0m")?;
        self.term.flush()?;
        Ok(())
    }
}

fn char_delay(typewriter: &TypewriterConfig) -> Option<Duration> {
    if !typewriter.enabled || typewriter.chars_per_sec == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(
        1.0 / typewriter.chars_per_sec as f64,
    ))
}

/// One-shot highlighting of a complete code block, used when showing a
/// block before saving it.
pub fn highlight_snippet(code: &str, language: &str, theme: &Theme) -> String {
    let syntax_set = SyntaxSet::load_defaults_newlines();
    let syntax = syntax_set
        .find_syntax_by_token(language)
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text());

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = String::new();
    for line in LinesWithEndings::from(code) {
        let ranges = highlighter
            .highlight_line(line, &syntax_set)
            .unwrap_or_else(|_| vec![(SyntectStyle::default(), line)]);
        out.push_str(&as_24_bit_terminal_escaped(&ranges[..], false));
    }
    out.push_str("\x1b[0m");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_delay() {
        let off = TypewriterConfig {
            enabled: false,
            chars_per_sec: 80,
        };
        assert!(char_delay(&off).is_none());

        let on = TypewriterConfig {
            enabled: true,
            chars_per_sec: 100,
        };
        assert_eq!(char_delay(&on), Some(Duration::from_millis(10)));

        let zero = TypewriterConfig {
            enabled: true,
            chars_per_sec: 0,
        };
        assert!(char_delay(&zero).is_none());
    }

    #[test]
    fn test_get_render_theme_known_names() {
        // Both names must resolve without panicking.
        let _ = get_render_theme("dark");
        let _ = get_render_theme("light");
        let _ = get_render_theme("anything-else");
    }

    #[test]
    fn test_highlight_snippet_preserves_text() {
        let theme = get_render_theme("dark");
        let out = highlight_snippet("print('hi')\n", "python", &theme);
        assert!(out.contains("print"));
        assert!(out.contains("hi"));
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn test_highlight_snippet_unknown_language() {
        let theme = get_render_theme("light");
        let out = highlight_snippet("whatever text\n", "nosuchlang", &theme);
        assert!(out.contains("whatever text"));
    }
}
