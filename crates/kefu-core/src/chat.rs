//! Chat widget state and submit flow
//!
//! `ChatWidget` owns everything the chat surface displays: the message
//! transcript and the input line. Frontends (TUI, web page) render this state
//! and feed it key events; the network round trip goes through a
//! [`ChatBackend`](crate::client::ChatBackend) so tests can script replies.

use crate::client::ChatBackend;

/// Greeting shown once on startup, before any user interaction.
pub const GREETING: &str = "您好！我是客戶服務助手，可以幫您：\n\
- 查詢產品資訊\n\
- 下單訂購\n\
- 查詢訂單\n\
- 安排配送（專車/郵寄）\n\
- 記錄損耗\n\n\
請問有什麼需要幫忙的嗎？";

/// Placeholder text shown while a reply is pending.
pub const THINKING: &str = "思考中...";

/// Apology shown when the backend round trip fails for any reason.
pub const SEND_FAILED: &str = "系統錯誤，請稍後再試。";

/// The sender of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Transient placeholder while a reply is pending. Removed, never
    /// transitioned, once the round trip resolves.
    Thinking,
}

/// One entry in the chat transcript. Never mutated after it is appended.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// The input line: text, cursor, and the three affordance flags the submit
/// flow toggles. `composing` models IME multi-keystroke entry; frontends that
/// cannot observe composition leave it false.
#[derive(Debug, Clone)]
pub struct InputState {
    pub text: String,
    pub cursor: usize, // char index, not byte index
    pub enabled: bool,
    pub focused: bool,
    pub composing: bool,
}

impl InputState {
    fn new() -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            enabled: true,
            focused: false,
            composing: false,
        }
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

/// Controller for the chat surface.
///
/// Sends are serialized: while one request is outstanding the send affordance
/// is disabled *and* `in_flight` is set, so a submit triggered through any
/// path (button, commit key) is a no-op until the pending round trip
/// resolves. This keeps the invariant that at most one thinking placeholder
/// exists in the transcript.
pub struct ChatWidget {
    messages: Vec<Message>,
    pub input: InputState,
    in_flight: bool,
    thinking_at: Option<usize>,
    scroll_pending: bool,
}

impl ChatWidget {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            input: InputState::new(),
            in_flight: false,
            thinking_at: None,
            scroll_pending: false,
        }
    }

    /// Append the fixed greeting and focus the input. Called once per run.
    pub fn greet(&mut self) {
        self.push(Role::Assistant, GREETING.to_string());
        self.input.focused = true;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// True once after each append; the renderer consumes it to follow the
    /// newest entry.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_pending)
    }

    /// Commit-key (Enter) trigger path. Ignored mid-composition so an IME
    /// confirm keystroke does not submit half-entered text.
    pub fn commit_key(&mut self) -> Option<String> {
        if self.input.composing {
            return None;
        }
        self.begin_submit()
    }

    /// Synchronous half of `submit()`: validate the input and, when a request
    /// must be issued, append the user message, clear the input, disable the
    /// send affordance, and append the thinking placeholder. Returns the
    /// trimmed text the caller must relay to the backend, or `None` when the
    /// submit is a no-op (blank input, or a request already in flight).
    pub fn begin_submit(&mut self) -> Option<String> {
        if self.in_flight {
            return None;
        }
        let text = self.input.text.trim().to_string();
        if text.is_empty() {
            return None;
        }

        self.push(Role::User, text.clone());
        self.input.clear();
        self.input.enabled = false;
        self.in_flight = true;
        self.thinking_at = Some(self.messages.len());
        self.push(Role::Thinking, THINKING.to_string());

        Some(text)
    }

    /// Completion half of `submit()`: remove the placeholder, append the
    /// assistant turn (reply or fixed apology), and restore input readiness.
    /// Runs exactly once per `begin_submit` that returned text, on both the
    /// success and the failure path.
    pub fn finish_submit(&mut self, outcome: anyhow::Result<String>) {
        if let Some(at) = self.thinking_at.take() {
            self.messages.remove(at);
        }
        match outcome {
            Ok(reply) => self.push(Role::Assistant, reply),
            Err(_) => self.push(Role::Assistant, SEND_FAILED.to_string()),
        }
        self.in_flight = false;
        self.input.enabled = true;
        self.input.focused = true;
    }

    /// Full submit flow against a backend. Frontends that must not block the
    /// render loop call `begin_submit`/`finish_submit` around their own task
    /// instead.
    pub async fn submit<B: ChatBackend>(&mut self, backend: &B) {
        if let Some(text) = self.begin_submit() {
            let outcome = backend.send(&text).await;
            self.finish_submit(outcome);
        }
    }

    fn push(&mut self, role: Role, content: String) {
        self.messages.push(Message { role, content });
        self.scroll_pending = true;
    }
}

impl Default for ChatWidget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedBackend {
        reply: Option<String>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn send(&self, message: &str) -> anyhow::Result<String> {
            self.sent.lock().unwrap().push(message.to_string());
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(anyhow!("connection refused")),
            }
        }
    }

    fn widget_with_input(text: &str) -> ChatWidget {
        let mut widget = ChatWidget::new();
        widget.greet();
        widget.input.text = text.to_string();
        widget.input.cursor = text.chars().count();
        widget
    }

    #[test]
    fn greeting_appears_once_before_any_interaction() {
        let mut widget = ChatWidget::new();
        widget.greet();
        assert_eq!(widget.messages().len(), 1);
        assert_eq!(widget.messages()[0].role, Role::Assistant);
        assert_eq!(widget.messages()[0].content, GREETING);
        assert!(widget.input.focused);
    }

    #[tokio::test]
    async fn whitespace_only_input_is_a_no_op() {
        for blank in ["", "   ", "\t", " \n "] {
            let mut widget = widget_with_input(blank);
            let backend = ScriptedBackend::replying("unused");
            widget.submit(&backend).await;

            assert_eq!(widget.messages().len(), 1, "only the greeting");
            assert!(backend.sent().is_empty(), "no request for {blank:?}");
            assert!(widget.input.enabled);
        }
    }

    #[tokio::test]
    async fn user_message_is_trimmed_but_reply_is_verbatim() {
        let mut widget = widget_with_input("  查詢訂單 123  ");
        let backend = ScriptedBackend::replying("Order #123 confirmed");
        widget.submit(&backend).await;

        let messages = widget.messages();
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "查詢訂單 123");
        assert_eq!(backend.sent(), vec!["查詢訂單 123".to_string()]);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "Order #123 confirmed");
    }

    #[test]
    fn placeholder_appears_after_user_message_while_pending() {
        let mut widget = widget_with_input("有什麼產品？");
        let text = widget.begin_submit().expect("submit should start");
        assert_eq!(text, "有什麼產品？");

        let messages = widget.messages();
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Thinking);
        assert_eq!(messages[2].content, THINKING);
        assert!(widget.in_flight());
        assert!(!widget.input.enabled);
        assert!(widget.input.text.is_empty(), "input cleared on submit");
    }

    #[test]
    fn placeholder_is_removed_exactly_once_on_success() {
        let mut widget = widget_with_input("hello");
        widget.begin_submit().unwrap();
        widget.finish_submit(Ok("hi".to_string()));

        let thinking = widget
            .messages()
            .iter()
            .filter(|m| m.role == Role::Thinking)
            .count();
        assert_eq!(thinking, 0);
        assert_eq!(widget.messages().len(), 3); // greeting, user, reply
    }

    #[tokio::test]
    async fn failure_appends_fixed_apology_and_restores_input() {
        let mut widget = widget_with_input("下單");
        let backend = ScriptedBackend::failing();
        widget.submit(&backend).await;

        let last = widget.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, SEND_FAILED);
        assert!(widget.messages().iter().all(|m| m.role != Role::Thinking));
        assert!(!widget.in_flight());
        assert!(widget.input.enabled);
        assert!(widget.input.focused);
    }

    #[tokio::test]
    async fn input_is_usable_again_after_success() {
        let mut widget = widget_with_input("hi");
        let backend = ScriptedBackend::replying("hello");
        widget.submit(&backend).await;

        assert!(widget.input.enabled);
        assert!(widget.input.focused);
        assert!(!widget.in_flight());
    }

    #[test]
    fn resubmit_while_in_flight_is_a_no_op() {
        let mut widget = widget_with_input("first");
        widget.begin_submit().unwrap();

        // The keyboard path can still fire while the affordance is disabled;
        // the in-flight check has to catch it.
        widget.input.text = "second".to_string();
        assert!(widget.begin_submit().is_none());
        assert!(widget.commit_key().is_none());

        let thinking = widget
            .messages()
            .iter()
            .filter(|m| m.role == Role::Thinking)
            .count();
        assert_eq!(thinking, 1, "at most one placeholder");
    }

    #[test]
    fn next_submit_works_after_completion() {
        let mut widget = widget_with_input("first");
        widget.begin_submit().unwrap();
        widget.finish_submit(Ok("ok".to_string()));

        widget.input.text = "second".to_string();
        assert_eq!(widget.begin_submit().as_deref(), Some("second"));
    }

    #[test]
    fn commit_key_is_ignored_while_composing() {
        let mut widget = widget_with_input("注音輸入中");
        widget.input.composing = true;
        assert!(widget.commit_key().is_none());
        assert_eq!(widget.messages().len(), 1, "no view change");

        widget.input.composing = false;
        assert!(widget.commit_key().is_some());
    }

    #[test]
    fn appends_request_follow_scrolling() {
        let mut widget = ChatWidget::new();
        assert!(!widget.take_scroll_request());
        widget.greet();
        assert!(widget.take_scroll_request());
        assert!(!widget.take_scroll_request(), "request is consumed");
    }

    #[test]
    fn input_editing_is_utf8_safe() {
        let mut input = InputState::new();
        for c in "蘋果".chars() {
            input.insert(c);
        }
        input.move_left();
        input.insert('紅');
        assert_eq!(input.text, "蘋紅果");

        input.move_end();
        input.backspace();
        assert_eq!(input.text, "蘋紅");

        input.move_home();
        input.delete();
        assert_eq!(input.text, "紅");
        assert_eq!(input.cursor, 0);
    }
}
