use crate::config::ResellerCostField;
use crate::format::clean_date;
use crate::models::{StatusInterval, Subscriber, UsageTotals};

#[derive(Debug, Clone)]
pub struct DeriveOptions {
    pub reseller_cost_field: ResellerCostField,
    pub package_separator: String,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            reseller_cost_field: ResellerCostField::Weekly,
            package_separator: ", ".to_string(),
        }
    }
}

/// One display row. Money and byte figures stay numeric; the column schema
/// formats them at render time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedRow {
    pub subscriber_id: String,
    pub iccid: String,
    pub status: String,
    pub current_status: String,
    pub packages: String,
    pub activated: String,
    pub expires: String,
    pub last_usage: String,
    pub subscriber_cost: f64,
    pub reseller_cost: f64,
    pub profit: f64,
    pub margin: f64,
    pub used_data_bytes: f64,
    pub package_data_bytes: f64,
}

impl DerivedRow {
    /// Derives a row from a decoded subscriber. `usage` replaces the record's
    /// own usage counters when enrichment supplied them.
    pub fn derive(subscriber: &Subscriber, usage: Option<&UsageTotals>, options: &DeriveOptions) -> Self {
        let reseller_cost = match options.reseller_cost_field {
            ResellerCostField::Weekly => subscriber.reseller_cost_weekly_total,
            ResellerCostField::Total => subscriber.reseller_cost,
        };
        let (profit, margin) = profit_and_margin(subscriber.subscriber_cost, reseller_cost);

        let (used, allotted, last_usage) = match usage {
            Some(totals) => (
                totals.used_data_bytes,
                totals.package_data_bytes,
                totals.last_usage_date.as_str(),
            ),
            None => (
                subscriber.used_data_byte,
                subscriber.pck_data_byte,
                subscriber.last_usage_date.as_str(),
            ),
        };

        Self {
            subscriber_id: subscriber.subscriber_id.clone(),
            iccid: iccid(subscriber),
            status: resolve_status(&subscriber.status),
            current_status: current_interval(&subscriber.status)
                .map(|interval| interval.status.clone())
                .unwrap_or_default(),
            packages: package_names(subscriber, &options.package_separator),
            activated: clean_date(subscriber.activation()),
            expires: clean_date(subscriber.expiry()),
            last_usage: clean_date(last_usage),
            subscriber_cost: subscriber.subscriber_cost,
            reseller_cost,
            profit,
            margin,
            used_data_bytes: used,
            package_data_bytes: allotted,
        }
    }
}

pub fn iccid(subscriber: &Subscriber) -> String {
    subscriber
        .imsi_list
        .first()
        .map(|record| record.iccid.clone())
        .unwrap_or_default()
}

/// The open interval if there is one, otherwise the interval with the greatest
/// `start_date` string (first one wins on ties).
pub fn current_interval(history: &[StatusInterval]) -> Option<&StatusInterval> {
    history
        .iter()
        .find(|interval| interval.end_date.trim().is_empty())
        .or_else(|| {
            history.iter().reduce(|best, candidate| {
                if candidate.start_date > best.start_date {
                    candidate
                } else {
                    best
                }
            })
        })
}

/// Current label, decorated with every distinct label seen when the history
/// holds more than one.
pub fn resolve_status(history: &[StatusInterval]) -> String {
    let Some(current) = current_interval(history) else {
        return String::new();
    };

    let mut distinct: Vec<&str> = Vec::new();
    for interval in history {
        let label = interval.status.as_str();
        if !label.is_empty() && !distinct.contains(&label) {
            distinct.push(label);
        }
    }

    if distinct.len() > 1 {
        format!("{} ({})", current.status, distinct.join(" / "))
    } else {
        current.status.clone()
    }
}

pub fn package_names(subscriber: &Subscriber, separator: &str) -> String {
    subscriber
        .package_source()
        .iter()
        .map(|package| package.display_name())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn profit_and_margin(subscriber_cost: f64, reseller_cost: f64) -> (f64, f64) {
    let profit = subscriber_cost - reseller_cost;
    let margin = if subscriber_cost > 0.0 {
        profit / subscriber_cost * 100.0
    } else {
        0.0
    };
    (profit, margin)
}
