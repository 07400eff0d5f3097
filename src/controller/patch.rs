use crate::models::chat::Message;

/// Tentative append of a message with its precomputed inverse.
///
/// `rollback` removes exactly the message `apply` inserted, wherever it ended
/// up, and leaves every other message in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticAppend {
    message: Message,
}

impl OptimisticAppend {
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    pub fn message_id(&self) -> &str {
        &self.message.id
    }

    pub fn apply(&self, messages: &mut Vec<Message>) {
        messages.push(self.message.clone());
    }

    /// Returns whether the message was still present.
    pub fn rollback(&self, messages: &mut Vec<Message>) -> bool {
        match messages.iter().position(|m| m.id == self.message.id) {
            Some(idx) => {
                messages.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_previous_sequence() {
        let mut messages = vec![Message::user("a"), Message::assistant("b", None)];
        let before = messages.clone();

        let patch = OptimisticAppend::new(Message::user("c"));
        patch.apply(&mut messages);
        assert_eq!(messages.len(), 3);

        assert!(patch.rollback(&mut messages));
        assert_eq!(messages, before);
    }

    #[test]
    fn rollback_after_external_clear_is_harmless() {
        let mut messages = Vec::new();
        let patch = OptimisticAppend::new(Message::user("c"));
        patch.apply(&mut messages);
        messages.clear();
        assert!(!patch.rollback(&mut messages));
        assert!(messages.is_empty());
    }
}
