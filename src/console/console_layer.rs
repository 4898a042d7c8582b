// Console layer - a line-based stand-in for the chat transport and the
// moderation dashboard. Reads stdin, prints one JSON document per line.

#[path = "commands.rs"]
pub mod commands;

#[path = "message_handler.rs"]
pub mod message_handler;

pub use message_handler::ConsoleTransport;
