//! Prompt assembly for generation requests.

use crate::infrastructure::entities::Message;
use std::fmt::Write;

/// How many of the most recent messages are shown to the model.
pub const CONTEXT_WINDOW: usize = 10;

const HISTORY_HEADER: &str = "Conversation history (most recent up to 10 messages):";

/// Builds the text sent to the completion service.
///
/// Layout: the character's behaviour prompt, the history header, one `sender: text`
/// line per message (oldest first, at most [`CONTEXT_WINDOW`] of them, taken from the
/// end of `recent_messages`), then the new utterance. Pure; no I/O.
pub fn build_prompt(character_prompt: &str, recent_messages: &[Message], user_message: &str) -> String {
    let window = &recent_messages[recent_messages.len().saturating_sub(CONTEXT_WINDOW)..];

    let mut prompt = String::with_capacity(
        character_prompt.len()
            + user_message.len()
            + window.iter().map(|m| m.sender.len() + m.text.len() + 3).sum::<usize>()
            + 128,
    );

    prompt.push_str(character_prompt.trim());
    prompt.push_str("\n\n");
    prompt.push_str(HISTORY_HEADER);
    prompt.push('\n');
    for message in window {
        // Writing into a String cannot fail.
        let _ = writeln!(prompt, "{}: {}", message.sender, message.text);
    }
    prompt.push_str("\nUser says: ");
    prompt.push_str(user_message);
    prompt.push('\n');

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn history(count: usize) -> Vec<Message> {
        let start = Utc::now();
        (0..count)
            .map(|i| Message {
                id: i as i64 + 1,
                character_code: "eldrin".to_owned(),
                sender: if i % 2 == 0 { "user" } else { "eldrin" }.to_owned(),
                text: format!("line {i}"),
                avatar: None,
                created_at: start + Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_build_prompt_is_deterministic() {
        let messages = history(4);
        let first = build_prompt("You are Eldrin.", &messages, "hello");
        let second = build_prompt("You are Eldrin.", &messages, "hello");
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt("You are Eldrin.", &history(2), "hello");

        assert_eq!(
            prompt,
            "You are Eldrin.\n\n\
             Conversation history (most recent up to 10 messages):\n\
             user: line 0\n\
             eldrin: line 1\n\
             \nUser says: hello\n"
        );
    }

    #[test]
    fn test_only_last_ten_messages_are_included() {
        let prompt = build_prompt("p", &history(12), "hi");

        assert!(!prompt.contains("line 0\n"));
        assert!(!prompt.contains("line 1\n"));
        for i in 2..12 {
            assert!(prompt.contains(&format!("line {i}\n")), "missing line {i}");
        }

        let positions: Vec<usize> = (2..12)
            .map(|i| prompt.find(&format!("line {i}\n")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "history out of order");
    }

    #[test]
    fn test_empty_history_still_has_header() {
        let prompt = build_prompt("p", &[], "hi");
        assert!(prompt.contains(HISTORY_HEADER));
        assert!(prompt.ends_with("User says: hi\n"));
    }
}
