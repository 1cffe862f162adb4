use tiktoken_rs::cl100k_base;

use crate::message::ChatMessage;

/// Renders a transcript slice into conversation turns for the protocol
/// layer's ledger/final-answer calls, truncating head-first (oldest
/// non-system messages dropped first) when `limit` is set — per §4.3's
/// "older messages are summarized or truncated head-first". Counts tokens
/// with `tiktoken-rs`, already part of the stack for exactly this purpose
/// in the teacher's `tools/search/bing_search.rs` and
/// `tools/utils/webpage_text_utils.rs`; falls back to a byte-length
/// estimate if the encoder can't be loaded.
pub fn render_transcript(transcript: &[ChatMessage], limit: Option<usize>) -> String {
    let Some(limit) = limit else {
        return render_all(transcript);
    };

    let encoder = cl100k_base().ok();
    let count_tokens = |text: &str| -> usize {
        match &encoder {
            Some(enc) => enc.encode_with_special_tokens(text).len(),
            None => text.len() / 4,
        }
    };

    let mut kept: Vec<&ChatMessage> = Vec::new();
    let mut used = 0usize;
    for message in transcript.iter().rev() {
        let rendered = render_one(message);
        let cost = count_tokens(&rendered);
        if used + cost > limit && !kept.is_empty() {
            break;
        }
        used += cost;
        kept.push(message);
    }
    kept.reverse();
    kept.into_iter().map(render_one).collect::<Vec<_>>().join("\n")
}

fn render_all(transcript: &[ChatMessage]) -> String {
    transcript.iter().map(render_one).collect::<Vec<_>>().join("\n")
}

fn render_one(message: &ChatMessage) -> String {
    format!("[{}] {}", message.source, message.to_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(seq: u64, source: &str, text: &str) -> ChatMessage {
        ChatMessage::text(seq, source, text)
    }

    #[test]
    fn unbounded_limit_renders_every_message() {
        let transcript = vec![msg(0, "a", "one"), msg(1, "b", "two")];
        let rendered = render_transcript(&transcript, None);
        assert!(rendered.contains("one"));
        assert!(rendered.contains("two"));
    }

    #[test]
    fn tight_limit_drops_oldest_messages_first() {
        let transcript = vec![
            msg(0, "a", "this is the oldest message and should be dropped"),
            msg(1, "b", "newest message"),
        ];
        let rendered = render_transcript(&transcript, Some(3));
        assert!(rendered.contains("newest message"));
        assert!(!rendered.contains("oldest message"));
    }

    #[test]
    fn always_keeps_at_least_the_most_recent_message() {
        let transcript = vec![msg(0, "a", "a message far longer than the tiny limit allows for")];
        let rendered = render_transcript(&transcript, Some(1));
        assert!(rendered.contains("longer than"));
    }
}
