use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tower_http::services::ServeDir;
use tracing::metadata::LevelFilter;

use kefu_core::protocol::{ChatRequest, ChatResponse};

use crate::agent::{Agent, GroqClient, WireMessage};
use crate::store::Store;

mod agent;
mod store;
mod tools;

mod env {
    pub const API_PORT: &str = "KEFU_PORT";
    pub const DB_PATH: &str = "KEFU_DB_PATH";
    pub const MODEL: &str = "KEFU_MODEL";
    pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
}

const ALLOWED_TABLES: [&str; 5] = [
    "customer",
    "product",
    "orders",
    "customer_order_detail",
    "wastage",
];

struct AppState {
    store: Store,
    agent: Agent,
    sessions: Mutex<HashMap<String, Vec<WireMessage>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging()?;

    let db_path = std::env::var(env::DB_PATH).unwrap_or_else(|_| "kefu.db".to_string());
    let store = Store::new(&db_path);
    store.init()?;
    store.seed()?;
    tracing::info!("database ready at {}", db_path);

    let api_key = std::env::var(env::GROQ_API_KEY)
        .context("GROQ_API_KEY must be set to reach the chat model")?;
    let model = std::env::var(env::MODEL).unwrap_or_else(|_| agent::DEFAULT_MODEL.to_string());
    let agent = Agent::new(GroqClient::new(&api_key, &model), store.clone());

    let state = Arc::new(AppState {
        store,
        agent,
        sessions: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat))
        .route("/api/admin/table/:table_name", get(admin_table))
        .route("/api/admin/order/:order_id", get(admin_order))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state);

    let port = std::env::var(env::API_PORT).ok();
    let port = port.and_then(|x| x.parse().ok()).unwrap_or(3000_u16);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

fn configure_logging() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .with_max_level(LevelFilter::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn index() -> (StatusCode, Html<String>) {
    match std::fs::read_to_string("static/index.html") {
        Ok(html) => (StatusCode::OK, Html(html)),
        Err(err) => (StatusCode::NOT_FOUND, Html(err.to_string())),
    }
}

/// One widget turn. Agent failures stay inside the reply contract: the
/// client always receives a 200 with a `reply` string.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| "default".to_string());

    let mut history = state
        .sessions
        .lock()
        .unwrap()
        .get(&session_id)
        .cloned()
        .unwrap_or_default();

    match state.agent.run(&mut history, &request.message).await {
        Ok(reply) => {
            state.sessions.lock().unwrap().insert(session_id, history);
            Json(ChatResponse { reply })
        }
        Err(err) => {
            tracing::error!("chat failed: session={}, {:#}", session_id, err);
            Json(ChatResponse {
                reply: format!("系統處理時發生錯誤，請再試一次。（錯誤：{}）", brief(&err)),
            })
        }
    }
}

async fn admin_table(
    State(state): State<Arc<AppState>>,
    Path(table_name): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if !ALLOWED_TABLES.contains(&table_name.as_str()) {
        return Err((StatusCode::BAD_REQUEST, "Invalid table name".to_string()));
    }

    let dump = state.store.dump_table(&table_name).map_err(internal_error)?;
    Ok(Json(json!({
        "columns": dump.columns,
        "rows": dump.rows,
    })))
}

async fn admin_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let detail = state
        .store
        .order_detail(order_id)
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "Order not found".to_string()))?;

    Ok(Json(json!({
        "order": detail.order,
        "items": detail.items,
    })))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("admin query failed: {:#}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// First line of an error chain's top message, bounded for a chat reply.
fn brief(err: &anyhow::Error) -> String {
    let text = err.to_string();
    let line = text.lines().next().unwrap_or_default();
    line.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn admin_whitelist_matches_the_schema() {
        for table in ALLOWED_TABLES {
            let dir = tempfile::tempdir().unwrap();
            let store = store::test_store(&dir);
            assert!(store.dump_table(table).is_ok(), "{table} must be dumpable");
        }
        assert!(!ALLOWED_TABLES.contains(&"sqlite_master"));
    }

    #[test]
    fn brief_keeps_only_a_bounded_first_line() {
        let err = anyhow!("Groq API error 500: {}\nsecond line", "x".repeat(200));
        let summary = brief(&err);
        assert!(summary.chars().count() <= 80);
        assert!(!summary.contains('\n'));
    }
}
