pub mod chat;
pub mod handler;
pub mod render;

pub use chat::{ChatMessage, DecodeError};
pub use handler::{Disposition, LogEvent, MessageHandler, Severity};
pub use render::{ConsoleRenderer, MessageRenderer};
