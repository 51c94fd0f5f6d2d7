//! Typed view of the upstream subscriber payload.
//!
//! The OCS service is loose about field types: ids arrive as numbers or
//! strings, lists are sometimes a single object, costs are sometimes strings.
//! The lenient deserializers below absorb that at the decoding boundary, so
//! everything downstream works with plain `String`, `f64` and `Vec` values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{OcsError, Result};
use crate::format::{coerce_number, coerce_text, whole_id};

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(coerce_text).unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(coerce_number).unwrap_or(0.0))
}

fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        Some(item @ Value::Object(_)) => serde_json::from_value(item).into_iter().collect(),
        _ => Vec::new(),
    })
}

fn lenient_object<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(item @ Value::Object(_)) => serde_json::from_value(item).ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImsiRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub iccid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub imsi: String,
}

/// One interval of a subscriber's status history. An empty `end_date` marks
/// the interval that is still open.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInterval {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageTemplate {
    #[serde(
        default,
        rename = "prepaidpackagetemplatename",
        deserialize_with = "lenient_string"
    )]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAssignment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub template_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prepaid_package_template_name: String,
    #[serde(default, deserialize_with = "lenient_object")]
    pub package_template: Option<PackageTemplate>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub used_data_byte: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pck_data_byte: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_usage_date: String,
}

impl PackageAssignment {
    /// First non-empty of the known template-name fields.
    pub fn display_name(&self) -> &str {
        let nested = self
            .package_template
            .as_ref()
            .map(|template| template.name.as_str())
            .unwrap_or("");
        [
            self.template_name.as_str(),
            self.prepaid_package_template_name.as_str(),
            nested,
            self.name.as_str(),
        ]
        .into_iter()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(default, deserialize_with = "lenient_string")]
    pub subscriber_id: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub imsi_list: Vec<ImsiRecord>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub status: Vec<StatusInterval>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub package_list: Vec<PackageAssignment>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub packages: Vec<PackageAssignment>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub package: Vec<PackageAssignment>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub subscriber_prepaid_packages: Vec<PackageAssignment>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub activation_date: String,
    #[serde(default, rename = "tsactivationutc", deserialize_with = "lenient_string")]
    pub ts_activation_utc: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expiry_date: String,
    #[serde(default, rename = "tsexpirationutc", deserialize_with = "lenient_string")]
    pub ts_expiration_utc: String,

    #[serde(default, deserialize_with = "lenient_number")]
    pub subscriber_cost: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub reseller_cost_weekly_total: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub reseller_cost: f64,

    #[serde(default, deserialize_with = "lenient_number")]
    pub used_data_byte: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pck_data_byte: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_usage_date: String,
}

impl Subscriber {
    /// Decodes one entry of an upstream subscriber list.
    ///
    /// Individual fields never fail; only an entry that is not a JSON object
    /// is rejected.
    pub fn decode(index: usize, value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(OcsError::Decode {
                index,
                reason: format!("expected an object, found {}", json_kind(value)),
            });
        }
        Subscriber::deserialize(value).map_err(|err| OcsError::Decode {
            index,
            reason: err.to_string(),
        })
    }

    /// The id as an integer when it holds a whole number, including
    /// float-typed ids such as `1001.0`.
    pub fn numeric_id(&self) -> Option<i64> {
        self.subscriber_id.trim().parse::<f64>().ok().and_then(whole_id)
    }

    /// Packages from the first populated source field.
    pub fn package_source(&self) -> &[PackageAssignment] {
        [
            &self.package_list,
            &self.packages,
            &self.package,
            &self.subscriber_prepaid_packages,
        ]
        .into_iter()
        .find(|list| !list.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
    }

    pub fn activation(&self) -> &str {
        first_non_empty(&self.activation_date, &self.ts_activation_utc)
    }

    pub fn expiry(&self) -> &str {
        first_non_empty(&self.expiry_date, &self.ts_expiration_utc)
    }

    /// Fills the fields this record left empty from a more detailed copy.
    pub fn merge_missing(&mut self, detail: Subscriber) {
        if self.package_source().is_empty() {
            self.package_list = detail.package_source().to_vec();
        }
        fill_text(&mut self.subscriber_id, detail.subscriber_id);
        fill_list(&mut self.imsi_list, detail.imsi_list);
        fill_list(&mut self.status, detail.status);
        fill_text(&mut self.activation_date, detail.activation_date);
        fill_text(&mut self.ts_activation_utc, detail.ts_activation_utc);
        fill_text(&mut self.expiry_date, detail.expiry_date);
        fill_text(&mut self.ts_expiration_utc, detail.ts_expiration_utc);
        fill_number(&mut self.subscriber_cost, detail.subscriber_cost);
        fill_number(&mut self.reseller_cost_weekly_total, detail.reseller_cost_weekly_total);
        fill_number(&mut self.reseller_cost, detail.reseller_cost);
        fill_number(&mut self.used_data_byte, detail.used_data_byte);
        fill_number(&mut self.pck_data_byte, detail.pck_data_byte);
        fill_text(&mut self.last_usage_date, detail.last_usage_date);
    }
}

fn first_non_empty<'a>(primary: &'a str, fallback: &'a str) -> &'a str {
    if primary.trim().is_empty() {
        fallback
    } else {
        primary
    }
}

fn fill_text(target: &mut String, source: String) {
    if target.trim().is_empty() {
        *target = source;
    }
}

fn fill_list<T>(target: &mut Vec<T>, source: Vec<T>) {
    if target.is_empty() {
        *target = source;
    }
}

fn fill_number(target: &mut f64, source: f64) {
    if *target == 0.0 {
        *target = source;
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Usage figures summed over a subscriber's prepaid packages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageTotals {
    pub used_data_bytes: f64,
    pub package_data_bytes: f64,
    pub last_usage_date: String,
}

impl UsageTotals {
    pub fn from_packages(packages: &[PackageAssignment]) -> Self {
        packages.iter().fold(Self::default(), |mut totals, package| {
            totals.used_data_bytes += package.used_data_byte;
            totals.package_data_bytes += package.pck_data_byte;
            if package.last_usage_date > totals.last_usage_date {
                totals.last_usage_date = package.last_usage_date.clone();
            }
            totals
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_loosely_typed_fields() {
        let value = json!({
            "subscriberId": 1001,
            "imsiList": {"iccid": "8944000000000000001", "imsi": 2040},
            "status": [{"status": "ACTIVE", "startDate": "2024-01-01", "endDate": null}],
            "subscriberCost": "12.5",
            "resellerCostWeeklyTotal": null,
            "usedDataByte": "oops",
            "tsactivationutc": "2024-01-01T00:00:00Z",
            "packages": "not a list"
        });

        let subscriber = Subscriber::decode(0, &value).unwrap();
        assert_eq!(subscriber.subscriber_id, "1001");
        assert_eq!(subscriber.numeric_id(), Some(1001));
        assert_eq!(subscriber.imsi_list.len(), 1);
        assert_eq!(subscriber.imsi_list[0].imsi, "2040");
        assert_eq!(subscriber.status[0].end_date, "");
        assert_eq!(subscriber.subscriber_cost, 12.5);
        assert_eq!(subscriber.reseller_cost_weekly_total, 0.0);
        assert_eq!(subscriber.used_data_byte, 0.0);
        assert_eq!(subscriber.activation(), "2024-01-01T00:00:00Z");
        assert!(subscriber.packages.is_empty());
    }

    #[test]
    fn float_typed_ids_are_numeric() {
        let float_id = Subscriber::decode(0, &json!({"subscriberId": 1001.0})).unwrap();
        assert_eq!(float_id.subscriber_id, "1001.0");
        assert_eq!(float_id.numeric_id(), Some(1001));

        let text_id = Subscriber::decode(1, &json!({"subscriberId": " 42 "})).unwrap();
        assert_eq!(text_id.numeric_id(), Some(42));

        for id in [json!(12.5), json!("abc"), json!(0), json!(null)] {
            let record = Subscriber::decode(2, &json!({"subscriberId": id})).unwrap();
            assert_eq!(record.numeric_id(), None);
        }
    }

    #[test]
    fn non_object_entries_are_decode_errors() {
        let err = Subscriber::decode(3, &json!("1001")).unwrap_err();
        assert!(matches!(err, OcsError::Decode { index: 3, .. }));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn malformed_list_entries_are_dropped() {
        let value = json!({"status": [{"status": "ACTIVE"}, 7, null, {"status": "SUSPENDED"}]});
        let subscriber = Subscriber::decode(0, &value).unwrap();
        let labels: Vec<_> = subscriber.status.iter().map(|s| s.status.as_str()).collect();
        assert_eq!(labels, ["ACTIVE", "SUSPENDED"]);
    }

    #[test]
    fn package_display_name_follows_field_priority() {
        let package: PackageAssignment = serde_json::from_value(json!({
            "templateName": "",
            "packageTemplate": {"prepaidpackagetemplatename": "Europe 5GB"},
            "name": "fallback"
        }))
        .unwrap();
        assert_eq!(package.display_name(), "Europe 5GB");

        let package: PackageAssignment =
            serde_json::from_value(json!({"packageTemplate": "junk", "name": "plain"})).unwrap();
        assert_eq!(package.display_name(), "plain");
    }

    #[test]
    fn package_source_skips_empty_lists() {
        let value = json!({"packageList": [], "package": {"name": "Single"}});
        let subscriber = Subscriber::decode(0, &value).unwrap();
        assert_eq!(subscriber.package_source().len(), 1);
        assert_eq!(subscriber.package_source()[0].display_name(), "Single");
    }

    #[test]
    fn merge_only_fills_gaps() {
        let mut base = Subscriber::decode(0, &json!({"subscriberId": 5, "subscriberCost": 10})).unwrap();
        let detail = Subscriber::decode(
            0,
            &json!({
                "subscriberId": 6,
                "subscriberCost": 99,
                "resellerCost": 4,
                "imsiList": [{"iccid": "8901"}],
                "packageList": [{"templateName": "Global"}]
            }),
        )
        .unwrap();

        base.merge_missing(detail);
        assert_eq!(base.subscriber_id, "5");
        assert_eq!(base.subscriber_cost, 10.0);
        assert_eq!(base.reseller_cost, 4.0);
        assert_eq!(base.imsi_list[0].iccid, "8901");
        assert_eq!(base.package_source()[0].display_name(), "Global");
    }

    #[test]
    fn usage_totals_sum_packages() {
        let packages: Vec<PackageAssignment> = serde_json::from_value(json!([
            {"usedDataByte": 1024, "pckDataByte": 2048, "lastUsageDate": "2024-03-01"},
            {"usedDataByte": "512", "pckDataByte": 0, "lastUsageDate": "2024-04-01"}
        ]))
        .unwrap();

        let totals = UsageTotals::from_packages(&packages);
        assert_eq!(totals.used_data_bytes, 1536.0);
        assert_eq!(totals.package_data_bytes, 2048.0);
        assert_eq!(totals.last_usage_date, "2024-04-01");
    }
}
