pub mod chat;
pub mod client;
pub mod config;
pub mod protocol;

// Re-export main types for convenience
pub use chat::{ChatWidget, InputState, Message, Role};
pub use client::{ApiClient, ChatBackend};
pub use config::Config;
pub use protocol::{ChatRequest, ChatResponse};
