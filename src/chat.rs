use serde::{Deserialize, Serialize};
use tracing::debug;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl Role {
    /// Convert the role to a string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized name, used when listing history
    pub fn title(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a chat conversation.
///
/// Turns are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The role of the message sender
    pub fn role(&self) -> Role {
        self.role
    }

    /// The content of the message
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// An ordered log of turns making up one conversation.
///
/// Index 0 holds the system turn when there is one, and there is never more
/// than one. User and assistant turns are not forced to alternate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    turns: Vec<Turn>,
    /// Last system prompt that was set, used to rebuild the log on reset
    system_prompt: Option<String>,
}

impl Session {
    /// Create an empty session without a system turn
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session starting with a system turn
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.replace_system(system_prompt);
        session
    }

    /// Add a turn at the end of the log.
    ///
    /// A system turn replaces the current one instead, so it always stays at
    /// index 0.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        match role {
            Role::System => self.replace_system(content),
            role => self.turns.push(Turn::new(role, content)),
        }
    }

    /// Add a user message to the session
    pub fn add_user_message(&mut self, content: &str) {
        self.append(Role::User, content);
    }

    /// Add an assistant message to the session
    pub fn add_assistant_message(&mut self, content: &str) {
        self.append(Role::Assistant, content);
    }

    /// Drop everything except the system turn.
    ///
    /// The system turn is rebuilt from the last system prompt; without one the
    /// session becomes empty.
    pub fn reset(&mut self) {
        self.turns.clear();
        if let Some(prompt) = &self.system_prompt {
            self.turns.push(Turn::system(prompt.clone()));
        }
        debug!("Session reset, {} turn(s) kept", self.turns.len());
    }

    /// Set the system prompt, overwriting index 0 or inserting it there
    pub fn replace_system(&mut self, content: impl Into<String>) {
        let content = content.into();
        let turn = Turn::system(content.clone());
        match self.turns.first_mut() {
            Some(first) if first.role == Role::System => *first = turn,
            _ => self.turns.insert(0, turn),
        }
        self.system_prompt = Some(content);
    }

    /// An owned copy of every turn, in order
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Borrowed view of the turns
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The current system prompt, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Get the last turn in the session
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Shorten the log back to `len` turns. Never removes the system turn.
    pub(crate) fn truncate(&mut self, len: usize) {
        let floor = usize::from(self.has_system_turn());
        self.turns.truncate(len.max(floor));
    }

    fn has_system_turn(&self) -> bool {
        self.turns
            .first()
            .is_some_and(|turn| turn.role == Role::System)
    }
}
