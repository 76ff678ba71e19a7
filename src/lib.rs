mod message;
mod network;
mod service;
mod session;

pub use message::MessageDispatcher;
pub use message::RawMessage;
pub use message::WireMessage;
pub use network::{encode_into, Connection, Frame, FrameDecoder, FrameWriter, HEADER_SIZE};
pub use service::{setup_local_tracing, setup_tracing, AppError, AppResult, NetConfig, SocketHost};
pub use session::{Session, SessionEvents, SessionSender};
