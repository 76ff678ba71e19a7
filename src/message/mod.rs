pub use dispatcher::MessageDispatcher;
pub use wire_message::RawMessage;
pub use wire_message::WireMessage;

mod dispatcher;
mod wire_message;
