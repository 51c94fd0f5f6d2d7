use std::future::Future;

use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::error::{OcsError, Result};

/// The upstream operations this dashboard uses. Each request body is a single
/// object keyed by the operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListSubscriber,
    GetSingleSubscriber,
    ListSubscriberPrepaidPackages,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListSubscriber => "listSubscriber",
            Self::GetSingleSubscriber => "getSingleSubscriber",
            Self::ListSubscriberPrepaidPackages => "listSubscriberPrepaidPackages",
        }
    }

    pub fn envelope(self, params: Value) -> Value {
        let mut envelope = Map::new();
        envelope.insert(self.as_str().to_string(), params);
        Value::Object(envelope)
    }
}

/// Parses a response body, keeping non-JSON text as `{ "raw": text }`.
pub fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

/// `listSubscriber.subscriberList` when it is a list, otherwise empty.
pub fn subscriber_list(payload: &Value) -> Vec<Value> {
    payload
        .get(Operation::ListSubscriber.as_str())
        .and_then(|list| list.get("subscriberList"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Looks for an `error`/`detail` field the way the dashboard surfaces failures.
pub fn embedded_error(payload: &Value) -> Option<String> {
    ["error", "detail"].into_iter().find_map(|key| match payload.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) if message.is_empty() => None,
        Some(Value::String(message)) => Some(message.clone()),
        Some(other) => Some(other.to_string()),
    })
}

/// Per-operation payload of a response, i.e. the value under the operation key.
/// Falls back to the whole body when the upstream did not nest it.
pub fn operation_payload(operation: Operation, body: &Value) -> Value {
    body.get(operation.as_str()).cloned().unwrap_or_else(|| body.clone())
}

/// Everything the dashboard needs from an OCS backend, whether reached
/// directly or through the local proxy.
pub trait OcsApi: Send + Sync {
    /// Raw subscriber list entries for an account.
    fn list_subscribers(&self, account_id: i64) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Full `getSingleSubscriber` response body.
    fn single_subscriber(&self, subscriber_id: i64) -> impl Future<Output = Result<Value>> + Send;

    /// Full `listSubscriberPrepaidPackages` response body.
    fn prepaid_packages(&self, subscriber_id: i64) -> impl Future<Output = Result<Value>> + Send;
}

/// Direct client for the OCS endpoint.
#[derive(Debug, Clone)]
pub struct OcsClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl OcsClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    /// Sends one operation and returns the parsed body. Only transport
    /// failures are errors; the HTTP status is left to the caller's reading
    /// of the payload.
    #[instrument(skip(self, operation, params), fields(operation = operation.as_str()))]
    pub async fn call(&self, operation: Operation, params: Value) -> Result<Value> {
        let body = operation.envelope(params);
        let transport = |source: reqwest::Error| OcsError::Transport {
            target: self.api_url.clone(),
            source,
        };

        let response = self
            .http
            .post(&self.api_url)
            .query(&[("token", self.token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        debug!(%status, bytes = text.len(), "upstream responded");

        Ok(parse_body(&text))
    }

    async fn call_checked(&self, operation: Operation, params: Value) -> Result<Value> {
        let body = self.call(operation, params).await?;
        match embedded_error(&body) {
            Some(message) => Err(OcsError::Upstream {
                operation: operation.as_str().to_string(),
                message,
            }),
            None => Ok(body),
        }
    }
}

impl OcsApi for OcsClient {
    async fn list_subscribers(&self, account_id: i64) -> Result<Vec<Value>> {
        let body = self
            .call_checked(Operation::ListSubscriber, json!({ "accountId": account_id }))
            .await?;
        Ok(subscriber_list(&body))
    }

    async fn single_subscriber(&self, subscriber_id: i64) -> Result<Value> {
        self.call_checked(
            Operation::GetSingleSubscriber,
            json!({ "subscriberId": subscriber_id }),
        )
        .await
    }

    async fn prepaid_packages(&self, subscriber_id: i64) -> Result<Value> {
        self.call_checked(
            Operation::ListSubscriberPrepaidPackages,
            json!({ "subscriberId": subscriber_id }),
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    /// What the stand-in upstream saw on its last request.
    #[derive(Debug, Default)]
    pub(crate) struct Captured {
        pub body: Option<Value>,
        pub token: Option<String>,
    }

    /// Starts a throwaway upstream that records each request and replies with
    /// `reply`. Returns its URL.
    pub(crate) async fn spawn_upstream(reply: &'static str) -> (String, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let app = Router::new()
            .route(
                "/v1",
                post(
                    move |State(captured): State<Arc<Mutex<Captured>>>,
                     Query(query): Query<HashMap<String, String>>,
                     Json(body): Json<Value>| async move {
                        let mut guard = captured.lock().unwrap();
                        guard.body = Some(body);
                        guard.token = query.get("token").cloned();
                        reply
                    },
                ),
            )
            .with_state(Arc::clone(&captured));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1"), captured)
    }

    #[test]
    fn envelope_is_keyed_by_operation() {
        let body = Operation::ListSubscriber.envelope(json!({"accountId": 3771}));
        assert_eq!(body, json!({"listSubscriber": {"accountId": 3771}}));
    }

    #[test]
    fn non_json_body_is_kept_raw() {
        assert_eq!(parse_body("<html>oops</html>"), json!({"raw": "<html>oops</html>"}));
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
    }

    #[test]
    fn subscriber_list_requires_an_array() {
        assert!(subscriber_list(&json!({"listSubscriber": {"subscriberList": {}}})).is_empty());
        assert!(subscriber_list(&json!({"raw": "x"})).is_empty());
        let list = subscriber_list(&json!({"listSubscriber": {"subscriberList": [{"subscriberId": 1}]}}));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn embedded_errors_check_error_then_detail() {
        assert_eq!(embedded_error(&json!({"error": "boom"})).as_deref(), Some("boom"));
        assert_eq!(embedded_error(&json!({"detail": {"code": 4}})).as_deref(), Some("{\"code\":4}"));
        assert_eq!(embedded_error(&json!({"error": "", "detail": null})), None);
        assert_eq!(embedded_error(&json!({"listSubscriber": {}})), None);
    }

    #[tokio::test]
    async fn client_posts_envelope_with_token() {
        let (url, captured) =
            spawn_upstream(r#"{"listSubscriber":{"subscriberList":[{"subscriberId":9}]}}"#).await;
        let client = OcsClient::new(url, "tok-123");

        let list = client.list_subscribers(42).await.unwrap();
        assert_eq!(list, vec![json!({"subscriberId": 9})]);

        let guard = captured.lock().unwrap();
        assert_eq!(guard.body, Some(json!({"listSubscriber": {"accountId": 42}})));
        assert_eq!(guard.token.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn upstream_error_payload_is_reported() {
        let (url, _) = spawn_upstream(r#"{"error":"invalid token"}"#).await;
        let client = OcsClient::new(url, "bad");

        let err = client.single_subscriber(1).await.unwrap_err();
        assert!(matches!(err, OcsError::Upstream { .. }));
        assert_eq!(err.to_string(), "getSingleSubscriber rejected by upstream: invalid token");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OcsClient::new(format!("http://{addr}/v1"), "tok");
        let err = client.call(Operation::ListSubscriber, json!({})).await.unwrap_err();
        assert!(matches!(err, OcsError::Transport { .. }));
    }
}
