//! Northbeam Gateway — form capture, chat widget and submission review over HTTP.
//! One store per process, opened at startup and shared through `AppState`.

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use northbeam_core::{
    render_reply_html, AdminGate, AdminViewer, CareersForm, ChatTurn, ChatWidget, ContactForm,
    Conversation, EscalationForm, KindFilter, Locale, NewsletterForm, OpenRouterClient, Reply,
    SiteConfig, SubmissionForm, SubmissionStore,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct AppState {
    store: Arc<SubmissionStore>,
    viewer: AdminViewer,
    gate: AdminGate,
    widget: ChatWidget,
    default_locale: Locale,
}

type SharedState = Arc<AppState>;

impl AppState {
    fn new(
        store: Arc<SubmissionStore>,
        gate: AdminGate,
        widget: ChatWidget,
        default_locale: Locale,
    ) -> Self {
        Self {
            viewer: AdminViewer::new(Arc::clone(&store)),
            store,
            gate,
            widget,
            default_locale,
        }
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    messages: Vec<ChatTurn>,
    text: String,
}

#[derive(Serialize)]
struct ChatResponse {
    conversation: Conversation,
    reply: Option<Reply>,
    html: Option<String>,
}

#[derive(Deserialize)]
struct EscalateRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    messages: Vec<ChatTurn>,
}

#[derive(Deserialize)]
struct LoginRequest {
    passphrase: String,
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    q: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[northbeam-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match SiteConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration rejected: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("gateway stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: SiteConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SubmissionStore::open(
        Some(&config.storage_path),
        config.namespace.clone(),
    )?);
    tracing::info!(
        "submission store at {} (namespace {})",
        config.storage_path,
        store.namespace()
    );

    let gate = AdminGate::new(config.admin_passphrase.clone());
    if !gate.is_configured() {
        tracing::warn!("NORTHBEAM__ADMIN_PASSPHRASE is not set; admin review is disabled");
    }
    if config.llm_api_key.is_empty() {
        tracing::warn!("no LLM API key (NORTHBEAM__LLM_API_KEY or OPENROUTER_API_KEY); chat replies will degrade");
    }

    let client = Arc::new(OpenRouterClient::new(
        config.llm_api_url.clone(),
        config.llm_model.clone(),
        config.llm_api_key.clone(),
    ));
    let widget = ChatWidget::new(client, config.system_instruction.clone());
    let state = Arc::new(AppState::new(store, gate, widget, config.default_locale));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("{} gateway listening on {}", config.app_name, config.bind_addr);

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn app(state: SharedState) -> Router {
    let admin = Router::new()
        .route("/admin/logout", post(logout_handler))
        .route("/admin/submissions", get(list_handler).delete(wipe_handler))
        .route("/admin/submissions/:id", delete(delete_handler))
        .route("/admin/submissions/:id/toggle", post(toggle_handler))
        .route("/admin/submissions/:id/archive", post(archive_handler))
        .route("/admin/export", get(export_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/contact", post(submit_form::<ContactForm>))
        .route("/api/v1/careers", post(submit_form::<CareersForm>))
        .route("/api/v1/newsletter", post(submit_form::<NewsletterForm>))
        .route("/api/v1/chat", post(chat_handler))
        .route("/api/v1/chat/escalate", post(escalate_handler))
        .route("/admin/login", post(login_handler))
        .merge(admin)
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(%method, %path, %peer, status = response.status().as_u16(), "request");
    response
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

async fn require_admin(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = bearer_token(request.headers())
        .map(|t| state.gate.verify(t))
        .unwrap_or(false);
    if authorized {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "admin session required").into_response()
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Producer endpoints: 201 with the stored record, 422 with every failing field.
async fn submit_form<F>(State(state): State<SharedState>, Json(form): Json<F>) -> Response
where
    F: SubmissionForm + DeserializeOwned + Send + 'static,
{
    match form.submit(&state.store) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => (StatusCode::UNPROCESSABLE_ENTITY, Json(e)).into_response(),
    }
}

fn request_locale(state: &AppState, locale: Option<&str>) -> Locale {
    locale
        .map(Locale::parse_or_default)
        .unwrap_or(state.default_locale)
}

/// The client sends its visible conversation; an empty one starts with the greeting.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(body): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let locale = request_locale(&state, body.locale.as_deref());
    let mut conversation = if body.messages.is_empty() {
        Conversation::new(locale)
    } else {
        Conversation {
            locale,
            turns: body.messages,
        }
    };
    let reply = state.widget.send(&mut conversation, &body.text).await;
    let html = reply.as_ref().map(|r| render_reply_html(&r.text));
    Json(ChatResponse {
        conversation,
        reply,
        html,
    })
}

async fn escalate_handler(
    State(state): State<SharedState>,
    Json(body): Json<EscalateRequest>,
) -> Response {
    let locale = request_locale(&state, body.locale.as_deref());
    let conversation = Conversation {
        locale,
        turns: body.messages,
    };
    let form = EscalationForm {
        name: body.name,
        email: body.email,
        message: body.message,
        transcript: None,
    };
    match state.widget.escalate(&state.store, form, &conversation) {
        Ok(record) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "record": record,
                "confirmation": locale.escalation_confirmation(),
            })),
        )
            .into_response(),
        Err(e) => (StatusCode::UNPROCESSABLE_ENTITY, Json(e)).into_response(),
    }
}

async fn login_handler(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> Response {
    match state.gate.login(&body.passphrase) {
        Some(token) => Json(serde_json::json!({ "token": token })).into_response(),
        None => (StatusCode::UNAUTHORIZED, "invalid passphrase").into_response(),
    }
}

async fn logout_handler(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.gate.logout(token);
    }
    StatusCode::NO_CONTENT
}

/// Review table: filtered records plus counts over the whole collection.
async fn list_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let kind: KindFilter = query
        .kind
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("kind: {}", e)))?;
    let search = query.q.unwrap_or_default();
    let submissions = state.viewer.list(kind, &search);
    Ok(Json(serde_json::json!({
        "filter": { "kind": kind.to_string(), "q": search },
        "summary": state.viewer.summary(),
        "submissions": submissions,
    })))
}

async fn toggle_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let status = state
        .viewer
        .toggle_status(&id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no submission {}", id)))?;
    Ok(Json(serde_json::json!({ "id": id, "status": status })))
}

async fn archive_handler(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    if state.viewer.archive(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delete_handler(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    state.viewer.delete(&id);
    StatusCode::NO_CONTENT
}

async fn wipe_handler(State(state): State<SharedState>) -> StatusCode {
    state.viewer.wipe();
    StatusCode::NO_CONTENT
}

async fn export_handler(
    State(state): State<SharedState>,
) -> Result<Response, (StatusCode, String)> {
    let (filename, bytes) = state
        .viewer
        .export()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use northbeam_core::{ChatError, CompletionClient, SubmissionKind, SubmissionRecord};
    use tower::ServiceExt;

    const PASSPHRASE: &str = "harbour-lights";

    /// Replies with the last user turn, or fails when built with `down`.
    struct EchoClient {
        down: bool,
    }

    #[async_trait::async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(
            &self,
            _system_instruction: &str,
            turns: &[ChatTurn],
        ) -> Result<String, ChatError> {
            if self.down {
                return Err(ChatError::Upstream(503, "down".into()));
            }
            Ok(format!("<echo> {}", turns.last().map(|t| t.text.as_str()).unwrap_or("")))
        }
    }

    fn test_app(down: bool) -> (Router, Arc<SubmissionStore>) {
        let store = Arc::new(SubmissionStore::in_memory());
        let widget = ChatWidget::new(Arc::new(EchoClient { down }), "test instruction");
        let state = Arc::new(AppState::new(
            Arc::clone(&store),
            AdminGate::new(PASSPHRASE),
            widget,
            Locale::En,
        ));
        (app(state), store)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header("authorization", format!("Bearer {}", t));
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&b).unwrap()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn login(app: &Router) -> String {
        let (status, _, body) = call(
            app,
            "POST",
            "/admin/login",
            None,
            Some(serde_json::json!({ "passphrase": PASSPHRASE })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json(&body)["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(false);
        let (status, _, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_contact_form_is_captured_as_lead() {
        let (app, store) = test_app(false);
        let (status, _, body) = call(
            &app,
            "POST",
            "/api/v1/contact",
            None,
            Some(serde_json::json!({
                "name": "Ada",
                "email": "ada@example.com",
                "message": "We would like a platform review.",
                "company": "Engines Ltd"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let record: SubmissionRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.kind, SubmissionKind::Lead);
        assert_eq!(store.list_all(), vec![record]);
    }

    #[tokio::test]
    async fn test_invalid_newsletter_is_rejected_inline() {
        let (app, store) = test_app(false);
        let (status, _, body) = call(
            &app,
            "POST",
            "/api/v1/newsletter",
            None,
            Some(serde_json::json!({ "email": "not-an-email" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err = json(&body);
        assert_eq!(err["fields"][0]["field"], "email");
        assert!(store.list_all().is_empty());
    }

    #[tokio::test]
    async fn test_admin_routes_require_session() {
        let (app, _) = test_app(false);
        let (status, _, _) = call(&app, "GET", "/admin/submissions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = call(&app, "GET", "/admin/submissions", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = call(
            &app,
            "POST",
            "/admin/login",
            None,
            Some(serde_json::json!({ "passphrase": "guess" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_filter_and_search() {
        let (app, _) = test_app(false);
        call(
            &app,
            "POST",
            "/api/v1/contact",
            None,
            Some(serde_json::json!({ "name": "A", "email": "a@x.com", "message": "x" })),
        )
        .await;
        call(
            &app,
            "POST",
            "/api/v1/contact",
            None,
            Some(serde_json::json!({
                "name": "Alice",
                "email": "a@x.com",
                "message": "Looking for a cloud migration partner."
            })),
        )
        .await;
        call(
            &app,
            "POST",
            "/api/v1/newsletter",
            None,
            Some(serde_json::json!({ "email": "b@x.com" })),
        )
        .await;
        let token = login(&app).await;

        let (status, _, body) = call(&app, "GET", "/admin/submissions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let listing = json(&body);
        assert_eq!(listing["summary"]["total"], 2);
        assert_eq!(listing["submissions"][0]["type"], "subscriber");
        assert_eq!(listing["submissions"][1]["type"], "lead");

        let (_, _, body) =
            call(&app, "GET", "/admin/submissions?kind=lead", Some(&token), None).await;
        let listing = json(&body);
        assert_eq!(listing["submissions"].as_array().unwrap().len(), 1);
        assert_eq!(listing["filter"]["kind"], "lead");

        let (_, _, body) =
            call(&app, "GET", "/admin/submissions?kind=all&q=B%40X", Some(&token), None).await;
        let listing = json(&body);
        assert_eq!(listing["submissions"].as_array().unwrap().len(), 1);
        assert_eq!(listing["submissions"][0]["data"]["email"], "b@x.com");

        let (status, _, _) =
            call(&app, "GET", "/admin/submissions?kind=vip", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_curation_lifecycle() {
        let (app, store) = test_app(false);
        let rec = store.append(SubmissionKind::Applicant, Default::default());
        let other = store.append(SubmissionKind::Lead, Default::default());
        let token = login(&app).await;

        let uri = format!("/admin/submissions/{}/toggle", rec.id);
        let (status, _, body) = call(&app, "POST", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "processed");

        let uri = format!("/admin/submissions/{}/archive", rec.id);
        let (status, _, _) = call(&app, "POST", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(store.get(&rec.id).unwrap().status.as_str(), "archived");

        let (status, _, _) =
            call(&app, "POST", "/admin/submissions/missing/toggle", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/admin/submissions/{}", rec.id);
        for _ in 0..2 {
            let (status, _, _) = call(&app, "DELETE", &uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        assert_eq!(store.list_all(), vec![other]);

        let (status, _, _) = call(&app, "DELETE", "/admin/submissions", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.list_all().is_empty());
    }

    #[tokio::test]
    async fn test_export_is_a_dated_attachment() {
        let (app, store) = test_app(false);
        store.append(SubmissionKind::Subscriber, Default::default());
        let token = login(&app).await;
        let (status, headers, body) = call(&app, "GET", "/admin/export", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(disposition.starts_with("attachment; filename=\"submissions-"));
        assert!(disposition.ends_with(".json\""));
        let records: Vec<SubmissionRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records, store.list_all());
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let (app, _) = test_app(false);
        let token = login(&app).await;
        let (status, _, _) = call(&app, "POST", "/admin/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = call(&app, "GET", "/admin/submissions", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_reply_is_appended_and_rendered() {
        let (app, store) = test_app(false);
        let (status, _, body) = call(
            &app,
            "POST",
            "/api/v1/chat",
            None,
            Some(serde_json::json!({ "text": "Do you do audits?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let res = json(&body);
        let turns = res["conversation"]["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0]["role"], "model");
        assert_eq!(res["reply"]["text"], "<echo> Do you do audits?");
        assert_eq!(res["reply"]["degraded"], false);
        assert_eq!(res["html"], "&lt;echo&gt; Do you do audits?");
        assert!(store.list_all().is_empty());
    }

    #[tokio::test]
    async fn test_chat_failure_uses_localized_message() {
        let (app, _) = test_app(true);
        let (status, _, body) = call(
            &app,
            "POST",
            "/api/v1/chat",
            None,
            Some(serde_json::json!({ "text": "Hallo", "locale": "de" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let res = json(&body);
        assert_eq!(res["reply"]["degraded"], true);
        assert_eq!(res["reply"]["text"], Locale::De.failure_message());
    }

    #[tokio::test]
    async fn test_escalation_appends_one_lead() {
        let (app, store) = test_app(false);
        let (status, _, body) = call(
            &app,
            "POST",
            "/api/v1/chat/escalate",
            None,
            Some(serde_json::json!({
                "name": "Lin",
                "email": "lin@example.com",
                "messages": [
                    { "role": "model", "text": "Hi! How can we help you today?" },
                    { "role": "user", "text": "I need a human." }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let res = json(&body);
        assert_eq!(res["confirmation"], Locale::En.escalation_confirmation());
        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind, SubmissionKind::Lead);
        assert!(all[0].payload["transcript"].contains("User: I need a human."));
    }
}
