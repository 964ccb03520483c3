//! Wire types for the `/api/chat` endpoint, shared by the server and the
//! clients.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`. `session_id` is optional; the server falls back
/// to a shared default session when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Success body of `POST /api/chat`. A response missing the `reply` field
/// decodes as an empty string rather than an error; the widget renders
/// whatever it gets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: String,
}
