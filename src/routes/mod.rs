//! Route modules for Quire Server

pub mod blocks;
pub mod comments;
pub mod files;
pub mod health;
pub mod pages;
pub mod public;
pub mod upload;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::sharing;
use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config().server.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/pages", pages::router())
        .nest("/api/v1/blocks", blocks::router())
        .nest("/api/v1/comments", comments::router())
        .nest(sharing::PUBLIC_PATH, public::router())
        .nest("/files", files::router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::storage::LocalBlobStore;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "quire-test-boundary";

    async fn test_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let blobs = LocalBlobStore::new(dir.path(), &config.server.public_base_url)
            .await
            .unwrap();
        let state = AppState::new(config, test_pool().await, Arc::new(blobs));
        (router(state), dir)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        read_json(response).await
    }

    async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn multipart_body(file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {c}\r\n\r\n",
            b = BOUNDARY,
            f = file_name,
            c = content_type
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn upload(
        app: &Router,
        uri: &str,
        user: &str,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-user-id", user)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(file_name, content_type, data)))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        read_json(response).await
    }

    async fn create_page(app: &Router, user: &str, title: &str) -> i64 {
        let (status, page) = send(
            app,
            Method::POST,
            "/api/v1/pages",
            Some(user),
            Some(json!({ "title": title })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        page["id"].as_i64().unwrap()
    }

    async fn create_block(app: &Router, user: &str, body: Value) -> (StatusCode, Value) {
        send(app, Method::POST, "/api/v1/blocks", Some(user), Some(body)).await
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let (app, _dir) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/pages", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_page_lists_blocks_in_order() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Notes").await;

        let (status, second) = create_block(
            &app,
            "alice",
            json!({ "page": page, "block_type": "text", "content": "second", "order": 2 }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, first) = create_block(
            &app,
            "alice",
            json!({ "page": page, "block_type": "heading1", "content": "first", "order": 1 }),
        )
        .await;

        let (status, detail) =
            send(&app, Method::GET, &format!("/api/v1/pages/{}", page), Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["title"], "Notes");
        assert_eq!(detail["owner"], "alice");

        let ids: Vec<i64> = detail["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![first["id"].as_i64().unwrap(), second["id"].as_i64().unwrap()]);
    }

    #[tokio::test]
    async fn test_untitled_default() {
        let (app, _dir) = test_app().await;
        let (status, page) =
            send(&app, Method::POST, "/api/v1/pages", Some("alice"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(page["title"], "Untitled");
    }

    #[tokio::test]
    async fn test_block_on_foreign_page_is_forbidden() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Private").await;

        let (status, _) = create_block(
            &app,
            "bob",
            json!({ "page": page, "content": "intrusion" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, detail) =
            send(&app, Method::GET, &format!("/api/v1/pages/{}", page), Some("alice"), None).await;
        assert!(detail["blocks"].as_array().unwrap().is_empty());

        let (status, _) =
            send(&app, Method::GET, &format!("/api/v1/pages/{}", page), Some("bob"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_page_is_not_found() {
        let (app, _dir) = test_app().await;
        let (status, body) =
            send(&app, Method::GET, "/api/v1/pages/4242", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_reorder_endpoint() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Board").await;
        let (_, a) = create_block(&app, "alice", json!({ "page": page, "content": "a", "order": 0 })).await;
        let (_, b) = create_block(&app, "alice", json!({ "page": page, "content": "b", "order": 1 })).await;
        let (a, b) = (a["id"].as_i64().unwrap(), b["id"].as_i64().unwrap());

        let (status, outcome) = send(
            &app,
            Method::POST,
            "/api/v1/blocks/reorder",
            Some("alice"),
            Some(json!({ "blocks": [{ "id": a, "order": 1 }, { "id": b, "order": 0 }, { "id": 999, "order": 2 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["updated"], 2);
        assert_eq!(outcome["skipped"], 1);

        let (_, blocks) = send(
            &app,
            Method::GET,
            &format!("/api/v1/blocks?page={}", page),
            Some("alice"),
            None,
        )
        .await;
        let ids: Vec<i64> = blocks
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn test_share_flow() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Launch").await;
        create_block(&app, "alice", json!({ "page": page, "content": "hello" })).await;

        let (status, sharing) = send(
            &app,
            Method::POST,
            &format!("/api/v1/pages/{}/share", page),
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sharing["is_public"], true);
        let token = sharing["share_token"].as_str().unwrap().to_string();

        // The advertised link resolves on this server
        let link = sharing["share_url"].as_str().unwrap().to_string();
        let path = link
            .strip_prefix("http://localhost:3000")
            .unwrap()
            .to_string();
        assert!(path.ends_with(&token));

        let (status, public) = send(&app, Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public["title"], "Launch");
        assert!(public.get("owner").is_none());

        let (status, blocks) = send(
            &app,
            Method::GET,
            &format!("/api/v1/public/{}/blocks", token),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(blocks.as_array().unwrap().len(), 1);

        let (status, sharing) = send(
            &app,
            Method::DELETE,
            &format!("/api/v1/pages/{}/share", page),
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sharing["is_public"], false);

        let (status, _) = send(&app, Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_page_cascades() {
        let (app, _dir) = test_app().await;
        let parent = create_page(&app, "alice", "Parent").await;
        let (status, child) = send(
            &app,
            Method::POST,
            "/api/v1/pages",
            Some("alice"),
            Some(json!({ "title": "Child", "parent": parent })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let child = child["id"].as_i64().unwrap();

        let (_, block) = create_block(&app, "alice", json!({ "page": child, "content": "x" })).await;
        let block = block["id"].as_i64().unwrap();
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/comments",
            Some("alice"),
            Some(json!({ "block": block, "content": "note" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/v1/pages/{}", parent),
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) =
            send(&app, Method::GET, &format!("/api/v1/pages/{}", child), Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            send(&app, Method::GET, &format!("/api/v1/blocks/{}", block), Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, comments) = send(&app, Method::GET, "/api/v1/comments", Some("alice"), None).await;
        assert!(comments.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_file_upload_and_serve() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Media").await;
        let (_, image) =
            create_block(&app, "alice", json!({ "page": page, "block_type": "image" })).await;
        let (_, text) = create_block(&app, "alice", json!({ "page": page, "content": "t" })).await;

        let (status, block) = upload(
            &app,
            &format!("/api/v1/blocks/{}/file", image["id"]),
            "alice",
            "photo.png",
            "image/png",
            b"not really a png",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(block["file_type"], "image/png");
        assert_eq!(block["file_size"], 16);
        let key = block["file"].as_str().unwrap().to_string();
        assert!(key.starts_with("blocks/"));
        assert!(key.ends_with("photo.png"));

        let request = Request::builder()
            .uri(format!("/files/{}", key))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"not really a png");

        let (status, _) = upload(
            &app,
            &format!("/api/v1/blocks/{}/file", text["id"]),
            "alice",
            "notes.txt",
            "text/plain",
            b"hi",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cover_must_be_image() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Cover").await;

        let (status, _) = upload(
            &app,
            &format!("/api/v1/pages/{}/cover", page),
            "alice",
            "cover.txt",
            "text/plain",
            b"text",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, updated) = upload(
            &app,
            &format!("/api/v1/pages/{}/cover", page),
            "alice",
            "cover.jpg",
            "image/jpeg",
            b"jpeg",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(updated["cover_image"].as_str().unwrap().starts_with("covers/"));
        assert!(updated["cover_image_url"]
            .as_str()
            .unwrap()
            .starts_with("http://localhost:3000/files/covers/"));
    }

    #[tokio::test]
    async fn test_duplicate_endpoint() {
        let (app, _dir) = test_app().await;
        let page = create_page(&app, "alice", "Plan").await;
        create_block(&app, "alice", json!({ "page": page, "content": "step" })).await;

        let (status, copy) = send(
            &app,
            Method::POST,
            &format!("/api/v1/pages/{}/duplicate", page),
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(copy["title"], "Plan (copy)");
        assert_eq!(copy["blocks"].as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/pages/{}/duplicate", page),
            Some("bob"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
