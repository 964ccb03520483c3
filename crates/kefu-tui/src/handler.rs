use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::app::App;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,

        // Commit key. The widget ignores it while a request is in flight.
        KeyCode::Enter => app.submit(),

        // Input editing stays available even while a reply is pending; only
        // submission is gated.
        KeyCode::Backspace => app.widget.input.backspace(),
        KeyCode::Delete => app.widget.input.delete(),
        KeyCode::Left => app.widget.input.move_left(),
        KeyCode::Right => app.widget.input.move_right(),
        KeyCode::Home => app.widget.input.move_home(),
        KeyCode::End => app.widget.input.move_end(),
        KeyCode::Char(c) => app.widget.input.insert(c),

        // Transcript scrolling
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(10),
        KeyCode::PageDown => app.scroll_down(10),

        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}
