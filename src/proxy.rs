//! Local forwarding endpoint in front of the OCS API, plus the client the
//! dashboard uses to reach it.
//!
//! The endpoint answers 200 even when something goes wrong locally; failures
//! travel as `{ "error": "..." }` and callers must read the payload.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{OcsError, Result};
use crate::format::{coerce_number, whole_id};
use crate::ocs::{embedded_error, parse_body, subscriber_list, OcsApi, OcsClient, Operation};

pub const LIST_SUBSCRIBERS_PATH: &str = "/api/ocs/list-subscribers";
pub const SINGLE_SUBSCRIBER_PATH: &str = "/api/ocs/get-single-subscriber";
pub const PREPAID_PACKAGES_PATH: &str = "/api/ocs/list-subscriber-prepaid-packages";

#[derive(Clone)]
pub struct ProxyState {
    pub client: Arc<OcsClient>,
    pub default_account_id: i64,
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(
            LIST_SUBSCRIBERS_PATH,
            post(list_subscribers_post).get(list_subscribers_get),
        )
        .route(SINGLE_SUBSCRIBER_PATH, post(single_subscriber))
        .route(PREPAID_PACKAGES_PATH, post(prepaid_packages))
        .with_state(state)
}

/// Positive whole numbers (or strings holding one) are accepted as ids;
/// anything else is treated as missing.
pub fn coerce_id(value: Option<&Value>) -> Option<i64> {
    whole_id(coerce_number(value?))
}

fn error_payload(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "error": message.to_string() }))
}

async fn list_subscribers_post(State(state): State<ProxyState>, body: Bytes) -> Json<Value> {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "rejecting unparseable request body");
            return error_payload(format!("invalid request body: {err}"));
        }
    };
    let account_id = coerce_id(request.get("accountId")).unwrap_or(state.default_account_id);
    forward_list(&state, account_id).await
}

async fn list_subscribers_get(
    State(state): State<ProxyState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let account_id = query
        .get("accountId")
        .and_then(|raw| coerce_id(Some(&Value::String(raw.clone()))))
        .unwrap_or(state.default_account_id);
    forward_list(&state, account_id).await
}

async fn forward_list(state: &ProxyState, account_id: i64) -> Json<Value> {
    let request_id = Uuid::new_v4();
    let span = info_span!("list_subscribers", %request_id, account_id);

    async {
        match state
            .client
            .call(Operation::ListSubscriber, json!({ "accountId": account_id }))
            .await
        {
            Ok(payload) => {
                let subscribers = subscriber_list(&payload);
                info!(count = subscribers.len(), "relaying subscriber list");
                Json(json!({
                    "listSubscriber": { "subscriberList": subscribers },
                    "_raw": payload,
                }))
            }
            Err(err) => {
                warn!(error = %err, "upstream call failed");
                error_payload(err)
            }
        }
    }
    .instrument(span)
    .await
}

async fn single_subscriber(State(state): State<ProxyState>, body: Bytes) -> Json<Value> {
    forward_by_subscriber(&state, Operation::GetSingleSubscriber, &body).await
}

async fn prepaid_packages(State(state): State<ProxyState>, body: Bytes) -> Json<Value> {
    forward_by_subscriber(&state, Operation::ListSubscriberPrepaidPackages, &body).await
}

/// Relays a per-subscriber operation untouched.
async fn forward_by_subscriber(state: &ProxyState, operation: Operation, body: &[u8]) -> Json<Value> {
    let request: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => return error_payload(format!("invalid request body: {err}")),
    };
    let Some(subscriber_id) = coerce_id(request.get("subscriberId")) else {
        return error_payload("subscriberId is required");
    };

    let request_id = Uuid::new_v4();
    let span = info_span!("forward", %request_id, operation = operation.as_str(), subscriber_id);
    async {
        match state
            .client
            .call(operation, json!({ "subscriberId": subscriber_id }))
            .await
        {
            Ok(payload) => Json(payload),
            Err(err) => {
                warn!(error = %err, "upstream call failed");
                error_payload(err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Client for the proxy endpoint above.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Posts `params`; a 405 answer is retried once as a GET carrying the
    /// parameters in the query string. Non-OK statuses and `error`/`detail`
    /// payloads become [`OcsError::Proxy`].
    pub async fn post_json(&self, path: &str, params: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let transport = |source: reqwest::Error| OcsError::Transport {
            target: url.clone(),
            source,
        };

        let mut response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            warn!(%url, "POST not allowed, retrying as GET");
            response = self
                .http
                .get(&url)
                .query(&query_pairs(params))
                .send()
                .await
                .map_err(transport)?;
        }

        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        let payload = parse_body(&text);

        if !status.is_success() {
            let message = embedded_error(&payload)
                .or_else(|| (!text.is_empty()).then(|| text.clone()))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(OcsError::Proxy(message));
        }
        if let Some(message) = embedded_error(&payload) {
            return Err(OcsError::Proxy(message));
        }
        Ok(payload)
    }
}

fn query_pairs(params: &Value) -> Vec<(String, String)> {
    params
        .as_object()
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

impl OcsApi for ProxyClient {
    async fn list_subscribers(&self, account_id: i64) -> Result<Vec<Value>> {
        let payload = self
            .post_json(LIST_SUBSCRIBERS_PATH, &json!({ "accountId": account_id }))
            .await?;
        Ok(subscriber_list(&payload))
    }

    async fn single_subscriber(&self, subscriber_id: i64) -> Result<Value> {
        self.post_json(SINGLE_SUBSCRIBER_PATH, &json!({ "subscriberId": subscriber_id }))
            .await
    }

    async fn prepaid_packages(&self, subscriber_id: i64) -> Result<Value> {
        self.post_json(PREPAID_PACKAGES_PATH, &json!({ "subscriberId": subscriber_id }))
            .await
    }
}
