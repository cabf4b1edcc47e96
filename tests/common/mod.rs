// Shared helpers for the integration tests. Each test binary uses a subset.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use campus_board::api::ApiClient;
use campus_board::board::Board;
use campus_board::query::QueryClient;
use serde_json::{Value, json};
use wiremock::MockServer;

pub fn board(server: &MockServer) -> Board {
    let api = ApiClient::new(server.uri()).expect("mock server uri is a valid base url");
    Board::new(Arc::new(api), Arc::new(QueryClient::new()))
}

pub fn post_json(id: &str) -> Value {
    json!({
        "id": id,
        "authorId": "u1",
        "title": format!("post {id}"),
        "content": "내용",
        "status": "OPEN",
        "recommendCount": 0,
        "reportCount": 0,
        "commentCount": 0,
        "createdAt": "2024-03-01T09:00:00",
        "updatedAt": "2024-03-01T09:00:00",
        "reported": false,
        "recommended": false
    })
}

pub fn page_json(ids: &[&str], next_cursor: Option<&str>) -> Value {
    json!({
        "items": ids.iter().map(|id| post_json(id)).collect::<Vec<_>>(),
        "nextCursor": next_cursor,
        "hasNext": next_cursor.is_some()
    })
}

pub fn comment_json(id: &str, parent_id: Option<&str>, recommend_count: u32) -> Value {
    json!({
        "id": id,
        "postId": "P1",
        "authorId": "u1",
        "authorName": "학생",
        "content": format!("comment {id}"),
        "parentId": parent_id,
        "recommendCount": recommend_count,
        "reportCount": 0,
        "createdAt": "2024-03-01T09:00:00",
        "status": "ACTIVE",
        "isRecommended": false,
        "isReported": false
    })
}

/// Number of requests the server received for `method` + `path`.
pub async fn request_count(server: &MockServer, method: &str, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == method && request.url.path() == path)
        .count()
}

/// Waits until at least `count` matching requests arrived.
pub async fn wait_for_requests(server: &MockServer, method: &str, path: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while request_count(server, method, path).await < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {count} {method} {path} requests"));
}
