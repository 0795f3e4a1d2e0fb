//! Context assembly for agent prompts.

use crate::llm::{ChatMessage, Role};

/// Build the conversational context block handed to the LLM.
///
/// The current input goes in the header; the history section lists every
/// prior message chronologically and is omitted entirely when there is no
/// prior message.
pub fn assemble_context(user_input: &str, messages: &[ChatMessage]) -> String {
    let mut block = format!("INPUT INICIAL DO USUÁRIO: {}", user_input);

    // The trailing user message is the current input, not history
    let history = match messages.last() {
        Some(last) if last.role == Role::User && last.content == user_input => {
            &messages[..messages.len() - 1]
        }
        _ => messages,
    };

    if !history.is_empty() {
        block.push_str("\nHISTÓRICO DA CONVERSA:");
        for message in history {
            let speaker = match message.role {
                Role::User => "[Usuário]",
                Role::Assistant => "[Assistente]",
                Role::System => continue,
            };
            block.push_str(&format!("\n{}: {}", speaker, message.content));
        }
    }

    block
}
