//! Chat formatting for the vision model and isolation of its answer.
//!
//! Output contract: the decoded transcript contains the formatted prompt
//! followed by the generated reply. The answer is the text between the
//! first [`ASSISTANT_MARKER`] and the next marker (if any), trimmed. When no
//! such text exists the caller substitutes [`NO_ANSWER_FALLBACK`].

pub const USER_MARKER: &str = "<|user|>";
pub const ASSISTANT_MARKER: &str = "<|assistant|>";
pub const IMAGE_PLACEHOLDER: &str = "<image>";
pub const NO_ANSWER_FALLBACK: &str = "No answer could be extracted.";

/// Wrap a raw instruction in the model's chat template.
pub fn format_chat_prompt(instruction: &str) -> String {
    format!("{USER_MARKER}\n{IMAGE_PLACEHOLDER}\n{instruction}{ASSISTANT_MARKER}\n")
}

/// Return the assistant's reply from a decoded transcript, if non-empty.
pub fn extract_answer(decoded: &str) -> Option<&str> {
    let (_, after) = decoded.split_once(ASSISTANT_MARKER)?;
    let reply = match after.find(ASSISTANT_MARKER) {
        Some(end) => &after[..end],
        None => after,
    };
    let reply = reply.trim();
    (!reply.is_empty()).then_some(reply)
}
