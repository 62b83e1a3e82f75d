//! Local preview server: static files plus the two dynamic endpoints the
//! rewritten site expects (`/api/search` and `/api/forms`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use crate::search_index::{load_index, PageEntry};

const MAX_RESULTS: usize = 20;
const SNIPPET_CHARS: usize = 240;
const SUBMISSIONS_FILE: &str = "data/form-submissions.ndjson";

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("word pattern is valid"));

/// Shared handler state: the site root and the index loaded at startup.
pub struct ServerState {
    site_root: PathBuf,
    pages: Vec<PageEntry>,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Per-page relevance: title hits dominate body hits.
fn score_page(page: &PageEntry, terms: &[String]) -> u32 {
    let title = page.title.to_lowercase();
    let body = page.text.to_lowercase();
    let mut score = 0;
    for term in terms {
        if title.contains(term.as_str()) {
            score += 8;
        }
        if body.contains(term.as_str()) {
            score += 2;
        }
    }
    score
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

async fn api_search(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> Json<Value> {
    let terms = tokenize(&params.q);
    let mut ranked: Vec<(u32, &PageEntry)> = Vec::new();
    if !terms.is_empty() {
        for page in &state.pages {
            let score = score_page(page, &terms);
            if score > 0 {
                ranked.push((score, page));
            }
        }
    }
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    let results: Vec<Value> = ranked
        .into_iter()
        .take(MAX_RESULTS)
        .map(|(_, page)| {
            json!({
                "url": page.url,
                "title": page.title,
                "snippet": snippet(&page.text),
            })
        })
        .collect();
    Json(json!({ "ok": true, "query": params.q, "results": results }))
}

fn bad_request(error: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": error })),
    )
}

async fn api_forms(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => return bad_request("body must be valid JSON"),
    };
    let Some(object) = payload.as_object() else {
        return bad_request("body must be a JSON object");
    };
    let form_id = object
        .get("formId")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if form_id.is_empty() {
        return bad_request("formId is required");
    }
    let Some(fields) = object.get("fields").and_then(Value::as_object) else {
        return bad_request("fields must be an object");
    };
    if fields.is_empty() {
        return bad_request("fields must not be empty");
    }

    let id = Utc::now().format("%Y%m%d%H%M%S%6f").to_string();
    let record = json!({
        "id": id,
        "timestamp": Utc::now().to_rfc3339(),
        "formId": form_id,
        "page": object.get("page").and_then(Value::as_str).unwrap_or(""),
        "fields": fields,
        "userAgent": headers
            .get("user-agent")
            .and_then(|value| value.to_str().ok())
            .unwrap_or(""),
    });

    let path = state.site_root.join(SUBMISSIONS_FILE);
    if let Err(error) = append_submission(&path, &record).await {
        log::error!("cannot persist form submission: {error:#}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": "could not store submission" })),
        );
    }
    (StatusCode::OK, Json(json!({ "ok": true, "id": id })))
}

async fn append_submission(path: &std::path::Path, record: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(record).context("failed to serialize submission")?;
    line.push('\n');
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .await
        .with_context(|| format!("cannot append to {}", path.display()))?;
    Ok(())
}

/// Build the router: API endpoints first, everything else served from disk.
#[must_use]
pub fn router(state: Arc<ServerState>) -> Router {
    let static_files = ServeDir::new(&state.site_root);
    Router::new()
        .route("/api/search", get(api_search))
        .route("/api/forms", post(api_forms))
        .with_state(state)
        .fallback_service(static_files)
}

/// Serve `site_root` on `host:port`, loading the search index once at startup.
pub async fn serve(site_root: PathBuf, assets_dir: &str, host: &str, port: u16) -> Result<()> {
    let pages = load_index(&site_root, assets_dir).await?;
    if pages.is_empty() {
        info!("search index is empty; run build-index to enable /api/search");
    } else {
        info!("loaded search index with {} pages", pages.len());
    }
    let state = Arc::new(ServerState { site_root, pages });
    let app = router(state);

    let address = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;
    info!("serving on http://{address}/");
    axum::serve(listener, app)
        .await
        .context("server terminated")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(site_root: PathBuf) -> Arc<ServerState> {
        Arc::new(ServerState {
            site_root,
            pages: vec![
                PageEntry {
                    url: "index.html".to_string(),
                    title: "Course Catalog".to_string(),
                    text: "Browse every course we offer".to_string(),
                },
                PageEntry {
                    url: "about.html".to_string(),
                    title: "About".to_string(),
                    text: "We teach one course at a time".to_string(),
                },
            ],
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn search_ranks_title_hits_first() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path().to_path_buf()));
        let response = app
            .oneshot(
                Request::get("/api/search?q=course")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["ok"], true);
        let results = value["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        // Title match outranks a body-only match.
        assert_eq!(results[0]["url"], "index.html");
        assert_eq!(results[1]["url"], "about.html");
        // Result objects carry exactly url, title and snippet.
        let entry = results[0].as_object().unwrap();
        assert_eq!(entry.len(), 3);
        for key in ["url", "title", "snippet"] {
            assert!(entry.contains_key(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn empty_query_returns_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path().to_path_buf()));
        let response = app
            .oneshot(Request::get("/api/search").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let value = body_json(response).await;
        assert_eq!(value["ok"], true);
        assert!(value["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forms_rejects_invalid_payloads() {
        let dir = tempfile::tempdir().unwrap();
        for body in [
            "not json",
            r#"{"fields": {"a": "b"}}"#,
            r#"{"formId": "  ", "fields": {"a": "b"}}"#,
            r#"{"formId": "contact", "fields": {}}"#,
            r#"{"formId": "contact"}"#,
        ] {
            let app = router(test_state(dir.path().to_path_buf()));
            let response = app
                .oneshot(
                    Request::post("/api/forms")
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let value = body_json(response).await;
            assert_eq!(value["ok"], false);
        }
    }

    #[tokio::test]
    async fn forms_appends_ndjson_record() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path().to_path_buf()));
        let response = app
            .oneshot(
                Request::post("/api/forms")
                    .header("content-type", "application/json")
                    .header("user-agent", "test-agent")
                    .body(Body::from(
                        r#"{"formId": "contact", "page": "/contact.html", "fields": {"email": "a@b.c"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["ok"], true);
        assert!(!value["id"].as_str().unwrap().is_empty());

        let stored = tokio::fs::read_to_string(dir.path().join(SUBMISSIONS_FILE))
            .await
            .unwrap();
        let record: Value = serde_json::from_str(stored.lines().next().unwrap()).unwrap();
        assert_eq!(record["formId"], "contact");
        assert_eq!(record["page"], "/contact.html");
        assert_eq!(record["fields"]["email"], "a@b.c");
        assert_eq!(record["userAgent"], "test-agent");
    }

    #[tokio::test]
    async fn static_files_served_from_site_root() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index.html"), "<h1>hi</h1>")
            .await
            .unwrap();
        let app = router(test_state(dir.path().to_path_buf()));
        let response = app
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
