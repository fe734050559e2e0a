//! Conversation state for one turn

use relay_provider::{Message, ModelReply};

/// Append-only message log owned by the dispatch loop
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// System message (if any) followed by the user prompt
    pub fn seed(system_prompt: &str, prompt: &str) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.push(Message::user(prompt));
        Self { messages }
    }

    /// Record the assistant's reply
    pub fn push_reply(&mut self, reply: &ModelReply) {
        self.messages.push(reply.to_message());
    }

    /// Record the result for one tool call
    pub fn push_tool_result(&mut self, call_id: &str, name: &str, result: &str) {
        self.messages.push(Message::tool(call_id, name, result));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool calls the last assistant message asked for that have no result yet
    pub fn pending_calls(&self) -> usize {
        let Some(last_assistant) = self.messages.iter().rposition(|m| m.role == "assistant")
        else {
            return 0;
        };

        let requested = self.messages[last_assistant].tool_call_count();
        let answered = self.messages[last_assistant + 1..]
            .iter()
            .filter(|m| m.is_tool_result())
            .count();
        requested.saturating_sub(answered)
    }
}
