use std::any::Any;
use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{DefaultBodyLimit, Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::extract::Extractor;
use crate::handlers::{self, EMPTY_MESSAGE_REPLY, TRY_AGAIN_REPLY};
use crate::intent::{self, Intent};
use crate::models::TaskRecord;
use crate::store::TaskStore;
use crate::templates::TwimlReply;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub extractor: Arc<dyn Extractor>,
    /// Held across every load/modify/save of the task document.
    pub store_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn TaskStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store,
            extractor,
            store_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Twilio's form fields for an inbound message.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/whatsapp", post(whatsapp_webhook))
        .with_state(state)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(CatchPanicLayer::custom(panic_reply))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    form: Result<Form<InboundMessage>, FormRejection>,
) -> TwimlReply {
    let Form(msg) = match form {
        Ok(form) => form,
        Err(err) => {
            warn!(error = %err, "rejected inbound webhook body");
            return TwimlReply::message(TRY_AGAIN_REPLY);
        }
    };
    let reply = handle_message(&state, &msg.from, &msg.body).await;
    TwimlReply::message(&reply)
}

fn panic_reply(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(panic = %detail, "request handler panicked");
    TwimlReply::message(TRY_AGAIN_REPLY).into_response()
}

/// Runs one message to completion and always produces reply text.
pub async fn handle_message(state: &AppState, sender: &str, body: &str) -> String {
    match process_message(state, sender, body).await {
        Ok(reply) => reply,
        Err(err) => {
            error!(error = %err, sender = %sender, "failed to process message");
            TRY_AGAIN_REPLY.to_string()
        }
    }
}

async fn process_message(state: &AppState, sender: &str, body: &str) -> anyhow::Result<String> {
    anyhow::ensure!(!sender.trim().is_empty(), "inbound message has no sender");

    let intent = intent::classify(body);
    info!(sender = %sender, intent = intent_label(&intent), "inbound message");

    let reply = match intent {
        Intent::Empty => EMPTY_MESSAGE_REPLY.to_string(),
        Intent::Acknowledgment => handlers::ack_reply(),
        Intent::ListTasks => {
            let _guard = state.store_lock.lock().await;
            let doc = state.store.load_all().await;
            handlers::list_reply(doc.tasks_for(sender))
        }
        Intent::Delete { args } => {
            update_tasks(state, sender, |tasks| {
                let out = handlers::delete_tasks(tasks, &args);
                let changed = out.removed > 0;
                (out.tasks, out.reply, changed)
            })
            .await
        }
        Intent::FreeText { text } => match state.extractor.extract(&text).await {
            Some(task) => {
                update_tasks(state, sender, move |mut tasks| {
                    let reply = handlers::add_task(&mut tasks, task);
                    (tasks, reply, true)
                })
                .await
            }
            None => handlers::fallback_reply(),
        },
    };

    Ok(reply)
}

/// Load, apply `f` to the sender's list, and save only when `f` reports a change.
async fn update_tasks<F>(state: &AppState, sender: &str, f: F) -> String
where
    F: FnOnce(Vec<TaskRecord>) -> (Vec<TaskRecord>, String, bool),
{
    let _guard = state.store_lock.lock().await;
    let mut doc = state.store.load_all().await;
    let (tasks, reply, changed) = f(doc.tasks_for(sender).to_vec());
    if changed {
        doc.replace_tasks(sender, tasks);
        if let Err(err) = state.store.save_all(&doc).await {
            warn!(error = %err, sender = %sender, "failed to persist task document");
        }
    }
    reply
}

fn intent_label(intent: &Intent) -> &'static str {
    match intent {
        Intent::Empty => "empty",
        Intent::ListTasks => "list",
        Intent::Delete { .. } => "delete",
        Intent::Acknowledgment => "acknowledgment",
        Intent::FreeText { .. } => "free_text",
    }
}
