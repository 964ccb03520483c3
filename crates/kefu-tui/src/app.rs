use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;

use kefu_core::client::ChatBackend;
use kefu_core::{ApiClient, ChatWidget};

pub struct App {
    pub widget: ChatWidget,
    pub client: ApiClient,
    pub reply_task: Option<JoinHandle<Result<String>>>,
    pub should_quit: bool,

    // Transcript viewport state, updated during render
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Animation state: 0-2 for ellipsis animation
    pub animation_frame: u8,
}

impl App {
    pub fn new(server_url: &str) -> Self {
        let mut widget = ChatWidget::new();
        widget.greet();

        Self {
            widget,
            client: ApiClient::new(server_url),
            reply_task: None,
            should_quit: false,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
        }
    }

    /// Commit-key path: start a submit and run the network call on a
    /// background task so the render loop keeps ticking.
    pub fn submit(&mut self) {
        if let Some(text) = self.widget.commit_key() {
            let client = self.client.clone();
            self.reply_task = Some(tokio::spawn(async move { client.send(&text).await }));
        }
    }

    /// Apply the reply task's outcome once it lands.
    pub async fn poll_reply(&mut self) {
        let finished = self
            .reply_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.reply_task.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(anyhow!(err)),
            };
            self.widget.finish_submit(outcome);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.widget.in_flight() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.scroll = self.scroll.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll = self.scroll.saturating_add(amount);
    }

    /// Scroll the transcript so the newest entry is visible.
    pub fn scroll_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for message in self.widget.messages() {
            total_lines += 1; // Role line
            for line in message.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after message
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.scroll = total_lines.saturating_sub(visible_height);
    }
}
