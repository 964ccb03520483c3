use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use crate::protocol::{ChatRequest, ChatResponse};

/// The network boundary of the chat widget. One call per submit; the widget
/// treats every error uniformly.
#[async_trait]
pub trait ChatBackend {
    async fn send(&self, message: &str) -> Result<String>;
}

/// HTTP client for the kefu chat service.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    /// Relay one user message and return the reply text.
    ///
    /// No status-code branching here: a non-2xx response with a JSON body
    /// still yields its `reply` field, while a network failure or an
    /// undecodable body is an error. No timeout and no retry either; a
    /// request that never resolves keeps the widget waiting.
    async fn send(&self, message: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            message: message.to_string(),
            session_id: None,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let body: ChatResponse = response.json().await?;
        Ok(body.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
