//! Conversation memory

use serde::{Deserialize, Serialize};

/// One question and the answer given to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub human: String,
    pub ai: String,
}

/// Keeps every completed turn of the conversation, in order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationBufferMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationBufferMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed turn
    pub fn save_context(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        self.turns.push(ConversationTurn {
            human: human.into(),
            ai: ai.into(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render the history as `Human:` / `Assistant:` lines for prompting
    pub fn buffer_as_str(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("Human: {}\nAssistant: {}", turn.human, turn.ai))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
