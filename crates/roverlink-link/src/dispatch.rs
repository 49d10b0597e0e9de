use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use roverlink_frame::{type_name, CompactFrame, CompactKind, ExtendedMessage, MessageType};

use crate::heartbeat::LinkTransition;

/// A decoded message handed to handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Compact(CompactFrame),
    Extended(ExtendedMessage),
}

impl Message {
    pub fn key(&self) -> MessageKey {
        match self {
            Message::Compact(frame) => MessageKey::Compact(frame.kind),
            Message::Extended(msg) => MessageKey::Extended(msg.type_id()),
        }
    }

    /// Readable kind name for logs and display.
    pub fn name(&self) -> String {
        match self {
            Message::Compact(frame) => frame.kind.name().to_string(),
            Message::Extended(msg) => type_name(msg.type_id()).into_owned(),
        }
    }
}

/// What a handler is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Compact(CompactKind),
    /// Extended type byte, including ones outside the known table.
    Extended(u8),
}

impl From<CompactKind> for MessageKey {
    fn from(kind: CompactKind) -> Self {
        MessageKey::Compact(kind)
    }
}

impl From<MessageType> for MessageKey {
    fn from(ty: MessageType) -> Self {
        MessageKey::Extended(ty.id())
    }
}

pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;
pub type LinkStateHandler = Arc<dyn Fn(&LinkTransition) + Send + Sync>;

/// Registered handlers. Handlers run on the thread that received the frame
/// and may register further handlers.
#[derive(Default)]
pub struct Dispatcher {
    by_key: RwLock<HashMap<MessageKey, Vec<MessageHandler>>>,
    any: RwLock<Vec<MessageHandler>>,
    link_state: RwLock<Vec<LinkStateHandler>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyed = self
            .by_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum::<usize>();
        f.debug_struct("Dispatcher")
            .field("keyed_handlers", &keyed)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn on(&self, key: MessageKey, handler: MessageHandler) {
        self.by_key
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(handler);
    }

    pub fn on_any(&self, handler: MessageHandler) {
        self.any
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn on_link_state(&self, handler: LinkStateHandler) {
        self.link_state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Run every handler for this message. Returns how many ran.
    pub fn dispatch(&self, message: &Message) -> usize {
        let mut handlers: Vec<MessageHandler> = self
            .by_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.key())
            .cloned()
            .unwrap_or_default();
        handlers.extend(
            self.any
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned(),
        );

        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub fn notify(&self, transition: &LinkTransition) {
        let listeners = self
            .link_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(transition);
        }
    }
}
