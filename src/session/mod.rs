pub use session::Session;
pub use session::SessionEvents;
pub use session::SessionSender;

mod session;
