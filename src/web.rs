use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

use crate::controller::{Outcome, View, Widget};
use crate::overlay::{FADE_DURATION, FADE_IN_DELAY, Rect, Scroll, Tooltip};
use crate::render::escape_html;
use crate::sessions::{DEFAULT_SESSION_CAPACITY, SessionStore};

const SESSION_COOKIE: &str = "sid";

type SharedState = Arc<AppState>;

pub struct AppState {
    pub sessions: SessionStore,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    /// Widget sessions kept in memory before the least recent is dropped.
    pub session_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            session_capacity: DEFAULT_SESSION_CAPACITY,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(widget: Arc<Widget>, config: WebConfig) -> Result<(), WebError> {
    let entries = widget.dictionary().map(|dictionary| dictionary.len());
    let state = Arc::new(AppState {
        sessions: SessionStore::new(widget, config.session_capacity),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        sessions = config.session_capacity,
        entries = ?entries,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/lookup", get(api_lookup))
        .route("/api/tooltip", get(api_tooltip))
        .route("/api/tooltip/leave", get(api_tooltip_leave))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// `Set-Cookie` for a session minted during this request.
fn session_headers(requested: Option<&str>, used: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if requested == Some(used) {
        return headers;
    }
    let cookie = Cookie::build((SESSION_COOKIE, used.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

async fn home(State(state): State<SharedState>) -> impl IntoResponse {
    let widget = state.sessions.widget();
    let template = WidgetTemplate {
        banner: widget.banner_html(),
        disabled: widget.load_error().is_some(),
        version: env!("CARGO_PKG_VERSION"),
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(&err.to_string())),
    )
}

fn render_error_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"tr\"><head><meta charset=\"utf-8\" /><title>Hata</title></head><body><p class=\"error-message\">{}</p></body></html>",
        escape_html(message)
    )
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "sozluk-web" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LookupParams {
    q: String,
}

#[derive(Debug, Serialize)]
struct LookupPayload {
    outcome: Outcome,
    view: View,
}

async fn api_lookup(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<LookupParams>,
) -> impl IntoResponse {
    let requested = session_id(&headers);
    let (id, payload) = state
        .sessions
        .with_session(requested.as_deref(), |session| {
            let outcome = session.input(&params.q);
            LookupPayload {
                outcome,
                view: session.view().clone(),
            }
        });
    (session_headers(requested.as_deref(), &id), Json(payload))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TooltipParams {
    word: Option<String>,
    top: f32,
    left: f32,
    width: f32,
    height: f32,
    scroll_x: f32,
    scroll_y: f32,
}

#[derive(Debug, Serialize)]
struct TooltipPayload {
    tooltip: Tooltip,
    fade_in_delay_ms: u64,
    fade_duration_ms: u64,
}

async fn api_tooltip(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<TooltipParams>,
) -> Result<impl IntoResponse, ApiError> {
    let word = params
        .word
        .as_deref()
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter `word` is required"))?;
    let anchor = Rect {
        top: params.top,
        left: params.left,
        width: params.width,
        height: params.height,
    };
    let scroll = Scroll {
        x: params.scroll_x,
        y: params.scroll_y,
    };

    let requested = session_id(&headers);
    let (id, tooltip) = state
        .sessions
        .with_session(requested.as_deref(), |session| {
            let mut rng = rand::thread_rng();
            session.click(word, anchor, scroll, &mut rng).cloned()
        });
    let tooltip =
        tooltip.ok_or_else(|| ApiError::not_found(format!("\"{word}\" is not a clickable word")))?;
    let payload = TooltipPayload {
        tooltip,
        fade_in_delay_ms: FADE_IN_DELAY.as_millis() as u64,
        fade_duration_ms: FADE_DURATION.as_millis() as u64,
    };
    Ok((session_headers(requested.as_deref(), &id), Json(payload)))
}

async fn api_tooltip_leave(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let requested = session_id(&headers);
    let (id, fade) = state
        .sessions
        .with_session(requested.as_deref(), |session| {
            let fade = session.pointer_leave();
            // The page runs the fade; the session forgets the tooltip now.
            session.finish_fade_out();
            fade
        });
    let payload = json!({
        "fading_out": fade.is_some(),
        "remove_after_ms": fade.map(|duration| duration.as_millis() as u64),
    });
    (session_headers(requested.as_deref(), &id), Json(payload))
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="tr">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Köken Sözlüğü</title>
    <style>
      body { font-family: system-ui, sans-serif; background: #fdfaf5; color: #2b2118; margin: 0; }
      main { max-width: 720px; margin: 0 auto; padding: 48px 16px; }
      #wordCount { color: #6b5b4b; }
      .highlight { font-weight: 700; color: #b5446e; }
      .search-box { position: relative; border: 2px solid #d8cbb8; border-radius: 8px; background: #fff; }
      .search-box.error { border-color: #c0392b; }
      #searchBox { box-sizing: border-box; width: 100%; border: 0; outline: none; background: transparent;
                   font-size: 24px; padding: 12px 12px 12px 12px; font-family: monospace; position: relative; z-index: 1; }
      #ghostText { position: absolute; top: 12px; font-size: 24px; font-family: monospace; color: #c8b9a6;
                   pointer-events: none; white-space: pre; }
      .description { line-height: 1.6; }
      .pink { color: #d63384; }
      .clickable-word { text-decoration: underline dotted; cursor: pointer; }
      .tooltip { position: absolute; background: #2b2118; color: #fff; font-family: monospace; font-size: 14px; line-height: 1.4;
                 padding: 8px; border-radius: 6px; opacity: 0; transition: opacity 300ms; pointer-events: none; }
      .error-message { color: #c0392b; }
    </style>
  </head>
  <body>
    <main>
      <p id="wordCount">{{ banner|safe }}</p>
      <div class="search-box{% if disabled %} error{% endif %}">
        <input id="searchBox" type="text" autocomplete="off" spellcheck="false" autofocus{% if disabled %} disabled{% endif %} />
        <span id="ghostText"{% if disabled %} hidden{% endif %}></span>
      </div>
      <div id="result"{% if disabled %} hidden{% endif %}></div>
      <footer><small>sozluk-rs v{{ version }}</small></footer>
    </main>
    <script>
      const box = document.getElementById("searchBox");
      const container = document.querySelector(".search-box");
      const result = document.getElementById("result");
      const ghost = document.getElementById("ghostText");
      let sequence = 0;
      let tooltip = null;

      function dropTooltip() {
        if (tooltip) { tooltip.remove(); tooltip = null; }
      }

      function applyView(view) {
        dropTooltip();
        result.innerHTML = view.result_html;
        container.classList.toggle("error", view.error);
        result.hidden = view.result_hidden;
        if (view.ghost && !view.ghost_hidden) {
          ghost.textContent = view.ghost.text;
          ghost.style.left = view.ghost.left + "px";
        } else {
          ghost.textContent = "";
        }
      }

      box.addEventListener("input", async () => {
        const mine = ++sequence;
        const response = await fetch("/api/lookup?q=" + encodeURIComponent(box.value));
        const body = await response.json();
        // Unchanged responses still carry the current view.
        if (mine !== sequence) return;
        applyView(body.view);
      });

      result.addEventListener("click", async (event) => {
        const word = event.target.closest(".clickable-word");
        if (!word) return;
        dropTooltip();
        const rect = word.getBoundingClientRect();
        const params = new URLSearchParams();
        params.set("word", word.dataset.word);
        params.set("top", rect.top);
        params.set("left", rect.left);
        params.set("width", rect.width);
        params.set("height", rect.height);
        params.set("scroll_x", window.scrollX);
        params.set("scroll_y", window.scrollY);
        const response = await fetch("/api/tooltip?" + params.toString());
        if (!response.ok) return;
        const body = await response.json();
        dropTooltip();
        const node = document.createElement("div");
        node.className = "tooltip";
        node.innerHTML = body.tooltip.html;
        node.style.top = body.tooltip.top + "px";
        node.style.left = body.tooltip.left + "px";
        document.body.appendChild(node);
        tooltip = node;
        setTimeout(() => { node.style.opacity = "1"; }, body.fade_in_delay_ms);
        word.addEventListener("mouseleave", async () => {
          const leave = await (await fetch("/api/tooltip/leave")).json();
          node.style.opacity = "0";
          setTimeout(() => {
            node.remove();
            if (tooltip === node) tooltip = null;
          }, leave.remove_after_ms ?? body.fade_duration_ms);
        }, { once: true });
      });
    </script>
  </body>
</html>"#,
    ext = "html"
)]
struct WidgetTemplate {
    banner: String,
    disabled: bool,
    version: &'static str,
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::config::WidgetConfig;
    use crate::dictionary::Dictionary;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    const VOCABULARY: &str =
        r#"{"elma": {"a": "meyve 00 alma"}, "armut": {"a": "bkz. +dAm"}, "ışık": {"a": "nur"}}"#;

    fn test_router_with(vocabulary: &[u8]) -> Router {
        let widget = Widget::new(Dictionary::from_slice(vocabulary), WidgetConfig::default())
            .expect("default tables");
        let state = Arc::new(AppState {
            sessions: SessionStore::new(Arc::new(widget), 16),
        });
        build_router(state)
    }

    fn test_router() -> Router {
        test_router_with(VOCABULARY.as_bytes())
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie_id(response: &Response) -> Option<String> {
        let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        let cookie = Cookie::parse(value.to_string()).ok()?;
        Some(cookie.value().to_string())
    }

    #[tokio::test]
    async fn home_page_shows_banner() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("id=\"searchBox\""));
        assert!(html.contains("<span class=\"highlight\">3</span> maddelik"));
        assert!(!html.contains(" disabled"));
    }

    #[tokio::test]
    async fn page_script_repaints_unchanged_lookups_and_sizes_tooltips_in_monospace() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!html.contains("\"unchanged\""));
        assert!(html.contains("if (mine !== sequence) return;\n        applyView(body.view);"));
        let tooltip_rule = html
            .lines()
            .find(|line| line.trim_start().starts_with(".tooltip {"))
            .expect("tooltip style");
        assert!(tooltip_rule.contains("font-family: monospace"));
        assert!(tooltip_rule.contains("font-size: 14px"));
    }

    #[tokio::test]
    async fn repeated_lookup_still_returns_the_current_view() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(Request::get("/api/lookup?q=ar").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = set_cookie_id(&response).expect("session cookie");
        let response = router
            .oneshot(
                Request::get("/api/lookup?q=ar")
                    .header(header::COOKIE, format!("sid={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["outcome"]["status"], "unchanged");
        assert!(
            payload["view"]["result_html"]
                .as_str()
                .unwrap()
                .contains("clickable-word")
        );
        assert_eq!(payload["view"]["ghost"]["text"], "mut");
    }

    #[tokio::test]
    async fn home_page_reports_load_failure() {
        let router = test_router_with(b"[]");
        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Yoksa bir yerlerde bir harf mi kayıp?"));
        assert!(html.contains("search-box error"));
    }

    #[tokio::test]
    async fn lookup_sets_session_cookie_and_renders() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(Request::get("/api/lookup?q=el").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let id = set_cookie_id(&response).expect("session cookie");
        let payload = json_body(response).await;
        assert_eq!(payload["outcome"]["status"], "found");
        assert_eq!(payload["outcome"]["word"], "elma");
        assert_eq!(payload["view"]["ghost"]["text"], "ma");
        assert!(
            payload["view"]["result_html"]
                .as_str()
                .unwrap()
                .contains("<b>Türkiye Türkçesi</b>")
        );

        let response = router
            .oneshot(
                Request::get("/api/lookup?q=el")
                    .header(header::COOKIE, format!("theme=dark; sid={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(set_cookie_id(&response).is_none(), "session is reused");
        let payload = json_body(response).await;
        assert_eq!(payload["outcome"]["status"], "unchanged");
    }

    #[tokio::test]
    async fn lookup_reports_no_match_and_rejection() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(Request::get("/api/lookup?q=zz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["outcome"]["status"], "no_match");
        assert_eq!(payload["view"]["error"], true);
        assert!(payload["view"]["ghost"].is_null());

        let response = router
            .oneshot(Request::get("/api/lookup?q=%20el").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["outcome"]["status"], "rejected");
    }

    #[tokio::test]
    async fn tooltip_for_clickable_word() {
        let router = test_router();
        let response = router
            .oneshot(
                Request::get("/api/tooltip?word=%2BDAM&top=100&left=40&width=30&height=20&scroll_y=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success());
        let payload = json_body(response).await;
        assert_eq!(payload["tooltip"]["word"], "+dAm");
        assert_eq!(payload["tooltip"]["lines"].as_array().unwrap().len(), 3);
        assert_eq!(payload["fade_in_delay_ms"], 50);
        assert_eq!(payload["fade_duration_ms"], 300);
    }

    #[tokio::test]
    async fn tooltip_errors() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(Request::get("/api/tooltip").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(Request::get("/api/tooltip?word=elma").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let payload = json_body(response).await;
        assert!(payload["error"].as_str().unwrap().contains("elma"));
    }

    #[tokio::test]
    async fn tooltip_leave_without_tooltip() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/api/tooltip/leave").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["fading_out"], false);
        assert!(payload["remove_after_ms"].is_null());
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let payload = json_body(response).await;
        assert_eq!(payload["status"], "ok");
    }
}
