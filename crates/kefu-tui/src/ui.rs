use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use kefu_core::Role;

use crate::app::App;

pub fn render(app: &mut App, frame: &mut Frame) {
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(frame.area());

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_transcript(app: &App, frame: &mut Frame, area: ratatui::layout::Rect) {
    let mut lines: Vec<Line> = Vec::new();

    for message in app.widget.messages() {
        match message.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "你：",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in message.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            Role::Assistant => {
                lines.push(Line::from(Span::styled(
                    "客服：",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
                for line in message.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            Role::Thinking => {
                lines.push(Line::from(Span::styled(
                    "客服：",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                lines.push(Line::from(Span::styled(
                    format!("思考中{}", dots),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
                lines.push(Line::default());
            }
        }
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" 客戶服務助手 ");

    let transcript = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.scroll, 0));

    frame.render_widget(transcript, area);
}

fn render_input(app: &App, frame: &mut Frame, area: ratatui::layout::Rect) {
    let enabled = app.widget.input.enabled;
    let (title, border_color) = if enabled {
        (" 輸入訊息（Enter 送出，Esc 離開） ", Color::Yellow)
    } else {
        (" 等待回覆中... ", Color::DarkGray)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor visible in a one-line field
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.widget.input.cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .widget
        .input
        .text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    if enabled && app.widget.input.focused {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}
