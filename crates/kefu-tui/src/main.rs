use anyhow::Result;

use kefu_core::Config;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|_| Config::new());
    let server_url = std::env::var("KEFU_SERVER_URL")
        .ok()
        .or(config.server_url)
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, App::new(&server_url)).await;
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, mut app: App) -> Result<()> {
    let mut events = tui::EventHandler::new();

    loop {
        app.poll_reply().await;
        if app.widget.take_scroll_request() {
            app.scroll_to_bottom();
        }

        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if app.should_quit {
            return Ok(());
        }

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => return Ok(()),
        }
    }
}
