//! Mock transport for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ApiRequest, ApiResponse, HttpTransport, Method};
use crate::error::{Result, SyncError};

/// Scripted reply
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply(ApiResponse),
    NetworkError(String),
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        MockResponse::Reply(ApiResponse::new(status, Vec::new()))
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        MockResponse::Reply(ApiResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string().into_bytes(),
        })
    }

    pub fn bytes(status: u16, body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        MockResponse::Reply(ApiResponse {
            status,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        })
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        MockResponse::NetworkError(message.into())
    }
}

type RouteKey = (Method, String);

/// Mock transport with per-route scripted replies
///
/// Replies for a route are served in order; the last one repeats. Unknown
/// routes answer 404. A route can be held so its next request blocks until
/// the returned [`Notify`] is signalled.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<RouteKey, VecDeque<MockResponse>>>,
    holds: Mutex<HashMap<RouteKey, Arc<Notify>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method path`.
    pub fn on(&self, method: Method, path: &str, response: MockResponse) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Block the next request to `method path` until the returned notify fires.
    pub fn hold(&self, method: Method, path: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((method, path.to_string()), notify.clone());
        notify
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Total number of requests sent.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of requests sent to `method path`.
    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.method == method && r.path() == path)
            .count()
    }

    fn next_response(&self, key: &RouteKey) -> MockResponse {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockResponse::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockResponse::status(404)),
            None => MockResponse::status(404),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let key = (request.method, request.path());
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let hold = self
            .holds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        if let Some(notify) = hold {
            notify.notified().await;
        }

        match self.next_response(&key) {
            MockResponse::Reply(response) => Ok(response),
            MockResponse::NetworkError(message) => Err(SyncError::Network(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_repeat() {
        let mock = MockTransport::new();
        mock.on(Method::Get, "/species/staff", MockResponse::status(500))
            .on(Method::Get, "/species/staff", MockResponse::status(200));

        let url = "http://localhost:8000/species/staff";
        assert_eq!(mock.send(ApiRequest::get(url)).await.unwrap().status, 500);
        assert_eq!(mock.send(ApiRequest::get(url)).await.unwrap().status, 200);
        assert_eq!(mock.send(ApiRequest::get(url)).await.unwrap().status, 200);
        assert_eq!(mock.call_count(Method::Get, "/species/staff"), 3);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let mock = MockTransport::new();
        let response = mock.send(ApiRequest::get("http://h/nothing")).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_network_error() {
        let mock = MockTransport::new();
        mock.on(Method::Get, "/x", MockResponse::network_error("connection refused"));
        let err = mock.send(ApiRequest::get("http://h/x")).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
