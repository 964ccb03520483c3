//! Tool-calling agent over Groq's OpenAI-compatible chat completions API.
//!
//! One `run` handles one user turn: the conversation history plus the tool
//! definitions go to the model, tool calls are executed against the store and
//! fed back, and the loop ends when the model answers in plain text.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Store;
use crate::tools;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Rounds of tool execution allowed within a single user turn.
const MAX_TOOL_ROUNDS: usize = 8;

const SYSTEM_PROMPT: &str = "你是客戶服務助手，用繁體中文回覆。

當客戶說「下單」時，你必須從步驟一開始，不可跳過任何步驟。

=== 步驟一：收集客戶資料 ===
你的第一句回覆必須是：「您好，我們先建立您的基本資料。請提供您的 名稱、地址、電話。」
等客戶回覆後，你回覆：
「請確認您的資料：
- 名稱：XXX
- 地址：XXX
- 電話：XXX
正確請回覆「確認」」
等客戶說「確認」後，呼叫 register_customer，然後才進步驟二。

=== 步驟二：建立訂單 ===
呼叫 query_products 取得產品清單，顯示給客戶（含名稱、價格、單位）。
客戶選好後，呼叫 create_order_draft，把回傳結果完整顯示給客戶。
客戶要修改就重新呼叫 create_order_draft（合併全部品項），再次完整顯示。
客戶說「確認」後才進步驟三。此步驟不可問配送或收款。

=== 步驟三：配送與收款 ===
先問：「請問配送方式要選擇 專車 還是 郵寄？」等客戶回答。
再問：「請問收款方式是？（現金、匯款、貨到付款）」等客戶回答。
兩個都回答後，先呼叫 preview_final_order 讓客戶做最終確認，客戶回覆「確認」後\
再呼叫 confirm_order 完成訂單。不可自行假設。

其他功能：查產品用 query_products/check_stock，查訂單用 query_orders，記損耗用 record_wastage";

/// One message on the chat completions wire. The same shape is sent and
/// received; unused optional fields stay off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// Function name plus its arguments as the raw JSON string the API sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionSpec {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

/// Minimal Groq chat completions client.
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: GROQ_BASE_URL.to_string(),
            model: model.to_string(),
        }
    }

    pub async fn chat(
        &self,
        messages: &[WireMessage],
        tools: &[ToolDefinition],
    ) -> Result<WireMessage> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            tools,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Groq API error {}: {}", status, text));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| anyhow!("chat completion returned no choices"))
    }
}

pub struct Agent {
    llm: GroqClient,
    store: Store,
}

impl Agent {
    pub fn new(llm: GroqClient, store: Store) -> Self {
        Self { llm, store }
    }

    /// Run one user turn against the session history, executing tool calls
    /// until the model produces a plain reply. The history is extended in
    /// place with everything this turn adds.
    pub async fn run(&self, history: &mut Vec<WireMessage>, user_message: &str) -> Result<String> {
        if history.is_empty() {
            history.push(WireMessage::system(SYSTEM_PROMPT));
        }
        history.push(WireMessage::user(user_message));

        let tools = tools::definitions();
        for _ in 0..MAX_TOOL_ROUNDS {
            let message = self.llm.chat(history, &tools).await?;
            let calls = message.tool_calls.clone().unwrap_or_default();
            history.push(message.clone());

            if calls.is_empty() {
                return Ok(message.content.unwrap_or_default());
            }

            for call in calls {
                tracing::info!(
                    "tool call: {}({})",
                    call.function.name,
                    call.function.arguments
                );
                let output = tools::dispatch(&self.store, &call.function.name, &call.function.arguments)?;
                history.push(WireMessage::tool(&call.id, output));
            }
        }

        Err(anyhow!(
            "tool loop did not converge after {MAX_TOOL_ROUNDS} rounds"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completion_with_tool_calls_deserializes() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "query_products",
                            "arguments": "{\"product_name\":\"蘋果\"}"
                        }
                    }]
                }
            }]
        });

        let completion: ChatCompletionResponse = serde_json::from_value(body).unwrap();
        let message = &completion.choices[0].message;
        assert_eq!(message.role, "assistant");
        assert!(message.content.is_none());

        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "query_products");
        assert_eq!(calls[0].function.arguments, "{\"product_name\":\"蘋果\"}");
    }

    #[test]
    fn plain_completion_deserializes() {
        let body = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "您好！" }
            }]
        });
        let completion: ChatCompletionResponse = serde_json::from_value(body).unwrap();
        assert_eq!(
            completion.choices[0].message.content.as_deref(),
            Some("您好！")
        );
    }

    #[test]
    fn tool_result_message_carries_only_its_fields() {
        let message = WireMessage::tool("call_abc", "庫存: 100".to_string());
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            json!({
                "role": "tool",
                "content": "庫存: 100",
                "tool_call_id": "call_abc"
            })
        );
    }

    #[test]
    fn request_omits_empty_tool_list() {
        let messages = vec![WireMessage::user("hi")];
        let request = ChatCompletionRequest {
            model: DEFAULT_MODEL,
            messages: &messages,
            tools: &[],
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());

        let tools = tools::definitions();
        let request = ChatCompletionRequest {
            model: DEFAULT_MODEL,
            messages: &messages,
            tools: &tools,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"].as_array().unwrap().len(), 8);
        assert_eq!(json["tools"][0]["type"], "function");
    }
}
