use console::{Style, StyledObject};
use ganaterm_core::completion::CompletionMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMessageType {
    Prompt,
    Footer,
    Error,
    /// Status lines around the confirmation flow (fallback switches,
    /// write/execute results).
    Notice,
}

pub fn style_chat_text(text: &str, style: ChatMessageType) -> StyledObject<&str> {
    let style_obj = match style {
        ChatMessageType::Prompt => Style::new().blue().bold(),
        ChatMessageType::Footer => Style::new().white().dim(),
        ChatMessageType::Error => Style::new().red().bold(),
        ChatMessageType::Notice => Style::new().green(),
    };
    style_obj.apply_to(text)
}

pub fn format_footer_metrics(
    metrics: &CompletionMetrics,
    finish_reason: Option<&str>,
    is_cancelled: bool,
) -> String {
    if is_cancelled {
        return "◼ Cancelled.".to_string();
    }

    let mut footer_complete = String::from("◼ Completed");
    if let Some(reason) = finish_reason {
        footer_complete.push_str(&format!(" ({reason})"));
    }
    footer_complete.push('.');

    let mut details = Vec::new();

    // Time metrics
    if metrics.prompt_eval_latency_ms > 0.0 {
        details.push(format!(
            "{:.2}s to first token",
            metrics.prompt_eval_latency_ms / 1000.0
        ));
    }
    if metrics.completion_latency_ms > 0.0 {
        details.push(format!(
            "{:.2}s total",
            (metrics.prompt_eval_latency_ms + metrics.completion_latency_ms) / 1000.0
        ));
    }

    // Tokens/s rate
    if metrics.completion_tokens > 0 && metrics.completion_latency_ms > 0.0 {
        let tokens_per_sec =
            metrics.completion_tokens as f32 * 1000.0 / metrics.completion_latency_ms;
        details.push(format!("{tokens_per_sec:.2} tokens/s"));
    }

    // Token counts
    if metrics.completion_tokens > 0 {
        details.push(format!("{} completion tokens", metrics.completion_tokens));
    }
    if metrics.prompt_tokens > 0 {
        details.push(format!("{} prompt tokens", metrics.prompt_tokens));
    }

    if details.is_empty() {
        footer_complete
    } else {
        format!("{} {}", footer_complete, details.join(". "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_styles() {
        let styled = style_chat_text("test", ChatMessageType::Error);
        assert_eq!(
            styled.force_styling(true).to_string(),
            "\u{1b}[31m\u{1b}[1mtest\u{1b}[0m"
        );
    }

    #[test]
    fn test_footer_cancelled() {
        let footer = format_footer_metrics(&CompletionMetrics::default(), Some("Stop"), true);
        assert_eq!(footer, "◼ Cancelled.");
    }

    #[test]
    fn test_footer_with_metrics() {
        let metrics = CompletionMetrics {
            prompt_tokens: 10,
            prompt_eval_latency_ms: 500.0,
            completion_tokens: 20,
            completion_latency_ms: 1000.0,
            raw_chunk: None,
        };
        let footer = format_footer_metrics(&metrics, Some("Stop"), false);
        assert!(footer.starts_with("◼ Completed (Stop)."));
        assert!(footer.contains("0.50s to first token"));
        assert!(footer.contains("1.50s total"));
        assert!(footer.contains("20.00 tokens/s"));
        assert!(footer.contains("20 completion tokens"));
        assert!(footer.contains("10 prompt tokens"));
    }

    #[test]
    fn test_footer_without_metrics() {
        let footer = format_footer_metrics(&CompletionMetrics::default(), None, false);
        assert_eq!(footer, "◼ Completed.");
    }
}
