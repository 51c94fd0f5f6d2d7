//! Per-subscriber fan-out to the detail and prepaid-package operations.

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{PackageAssignment, Subscriber, UsageTotals};
use crate::ocs::{operation_payload, OcsApi, Operation};

#[derive(Debug, Clone, Default)]
pub struct Enriched {
    pub subscriber: Subscriber,
    pub usage: UsageTotals,
}

/// Enriches every subscriber concurrently. Each branch swallows its own
/// failures, so the batch always yields one entry per input in input order.
pub async fn enrich_all<A: OcsApi>(api: &A, subscribers: Vec<Subscriber>) -> Vec<Enriched> {
    join_all(subscribers.into_iter().map(|subscriber| enrich_one(api, subscriber))).await
}

pub async fn enrich_one<A: OcsApi>(api: &A, mut subscriber: Subscriber) -> Enriched {
    let Some(subscriber_id) = subscriber.numeric_id() else {
        debug!(id = %subscriber.subscriber_id, "no numeric id, skipping enrichment");
        return Enriched {
            subscriber,
            usage: UsageTotals::default(),
        };
    };

    let (detail, packages) = tokio::join!(
        api.single_subscriber(subscriber_id),
        api.prepaid_packages(subscriber_id)
    );

    match detail {
        Ok(body) => {
            let payload = detail_record(&operation_payload(Operation::GetSingleSubscriber, &body));
            match Subscriber::decode(0, &payload) {
                Ok(detail) => subscriber.merge_missing(detail),
                Err(err) => warn!(subscriber_id, error = %err, "ignoring subscriber detail"),
            }
        }
        Err(err) => warn!(subscriber_id, error = %err, "subscriber detail unavailable"),
    }

    let usage = match packages {
        Ok(body) => {
            let list = prepaid_package_list(&operation_payload(
                Operation::ListSubscriberPrepaidPackages,
                &body,
            ));
            if subscriber.package_source().is_empty() {
                subscriber.subscriber_prepaid_packages = list.clone();
            }
            UsageTotals::from_packages(&list)
        }
        Err(err) => {
            warn!(subscriber_id, error = %err, "prepaid packages unavailable, usage defaults to zero");
            UsageTotals::default()
        }
    };

    Enriched { subscriber, usage }
}

/// Some deployments nest the detail one level deeper under `subscriber`.
fn detail_record(payload: &Value) -> Value {
    match payload.get("subscriber") {
        Some(inner @ Value::Object(_)) => inner.clone(),
        _ => payload.clone(),
    }
}

fn prepaid_package_list(payload: &Value) -> Vec<PackageAssignment> {
    let list = match payload {
        Value::Array(_) => Some(payload),
        _ => [
            "subscriberPrepaidPackages",
            "prepaidPackageList",
            "packageList",
            "packages",
        ]
        .into_iter()
        .find_map(|key| payload.get(key).filter(|value| value.is_array())),
    };

    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
