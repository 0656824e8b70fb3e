use crate::message::{Message, Role};

/// Ordered, append-only transcript owned by a single task run.
///
/// The first message is always the system prompt. The whole log is resent to
/// the model on every turn.
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(Message::system(system_prompt));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.messages.iter().map(|m| m.role).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
