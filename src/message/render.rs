use anyhow::Result;
use tracing::info;

use crate::message::chat::ChatMessage;

/// Output side of message processing. The consume loop only hands a decoded
/// message over; where it lands is up to the implementation.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, message: &ChatMessage, formatted_time: &str) -> Result<()>;
}

/// Prints received messages to the console log.
pub struct ConsoleRenderer;

impl MessageRenderer for ConsoleRenderer {
    fn render(&self, message: &ChatMessage, formatted_time: &str) -> Result<()> {
        info!("{}", "=".repeat(50));
        info!("Author: {}", message.author);
        info!("Body: {}", message.body);
        info!("Sent At: {formatted_time}");
        info!("{}", "=".repeat(50));
        Ok(())
    }
}
