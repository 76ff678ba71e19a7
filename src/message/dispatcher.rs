use std::collections::HashMap;

use tracing::warn;

use crate::message::WireMessage;
use crate::session::{SessionEvents, SessionSender};

type Handler<M> = Box<dyn Fn(&SessionSender<M>, M) + Send + Sync>;
type LifecycleHook<M> = Box<dyn Fn(&SessionSender<M>) + Send + Sync>;
type DisconnectHook = Box<dyn Fn(u64) + Send + Sync>;

/// Startup-populated registry mapping a message type tag to its handler.
///
/// Built once before the host starts and then read-only, so dispatch needs
/// no locking. Unknown tags are reported and dropped; they never tear the
/// session down.
pub struct MessageDispatcher<M: WireMessage> {
    handlers: HashMap<i32, Handler<M>>,
    on_connected: Option<LifecycleHook<M>>,
    on_disconnected: Option<DisconnectHook>,
}

impl<M: WireMessage> MessageDispatcher<M> {
    pub fn new() -> MessageDispatcher<M> {
        MessageDispatcher {
            handlers: HashMap::new(),
            on_connected: None,
            on_disconnected: None,
        }
    }

    /// Registers the handler for one message type tag. Registering the same
    /// tag twice replaces the earlier handler.
    pub fn on(
        mut self,
        type_tag: i32,
        handler: impl Fn(&SessionSender<M>, M) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(type_tag, Box::new(handler));
        self
    }

    pub fn on_connect(
        mut self,
        hook: impl Fn(&SessionSender<M>) + Send + Sync + 'static,
    ) -> Self {
        self.on_connected = Some(Box::new(hook));
        self
    }

    pub fn on_disconnect(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_disconnected = Some(Box::new(hook));
        self
    }
}

impl<M: WireMessage> Default for MessageDispatcher<M> {
    fn default() -> Self {
        MessageDispatcher::new()
    }
}

impl<M: WireMessage> SessionEvents<M> for MessageDispatcher<M> {
    fn on_connected(&self, session: &SessionSender<M>) {
        if let Some(hook) = &self.on_connected {
            hook(session);
        }
    }

    fn on_message(&self, session: &SessionSender<M>, msg: M) {
        match self.handlers.get(&msg.type_tag()) {
            Some(handler) => handler(session, msg),
            None => {
                warn!(
                    "no handler registered for message type {} on session {}",
                    msg.type_tag(),
                    session.session_id()
                );
            }
        }
    }

    fn on_disconnected(&self, session_id: u64) {
        if let Some(hook) = &self.on_disconnected {
            hook(session_id);
        }
    }
}
