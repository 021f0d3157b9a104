use super::{
    conversation::ConversationKey,
    message::Message,
    typing::{TypingSignal, TypingState},
};

/// Event arriving from a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(Message),
    TypingStarted(TypingSignal),
    TypingEnded(TypingSignal),
}

impl InboundEvent {
    pub fn typing(signal: TypingSignal) -> Self {
        match signal.state {
            TypingState::Started => Self::TypingStarted(signal),
            TypingState::Ended => Self::TypingEnded(signal),
        }
    }

    pub fn conversation_key(&self) -> &ConversationKey {
        match self {
            Self::Message(message) => &message.conversation_key,
            Self::TypingStarted(signal) | Self::TypingEnded(signal) => &signal.conversation_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::TypingStarted(_) => "typing_started",
            Self::TypingEnded(_) => "typing_ended",
        }
    }
}
