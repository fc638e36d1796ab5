use copilot_backend::ReplyMetadata;

/// Assistant turn every session opens with.
pub const GREETING: &str = "Hello! I am your Pagila Database Assistant. Ask me anything about the movies, actors, or rental data.";

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// One chat turn. Never mutated once appended to a [`MessageLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present only on successful assistant replies that reported it.
    pub metadata: Option<ReplyMetadata>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: None,
        }
    }

    /// Assistant notice without metadata (greeting or failure text).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn assistant_reply(content: impl Into<String>, metadata: Option<ReplyMetadata>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata,
        }
    }
}

/// Append-only conversation record; the substrate the presentation renders.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Starts a log holding only the greeting.
    pub fn initialize() -> Self {
        Self {
            messages: vec![Message::assistant(GREETING)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the greeting is never removed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::initialize()
    }
}
