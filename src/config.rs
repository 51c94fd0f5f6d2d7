use anyhow::Context;
use clap::ValueEnum;

pub const DEFAULT_API_URL: &str = "https://ocs-api.esimvault.cloud/v1";
pub const DEFAULT_ACCOUNT_ID: i64 = 3771;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Which upstream field is subtracted from `subscriberCost` when computing profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResellerCostField {
    /// `resellerCostWeeklyTotal`
    Weekly,
    /// `resellerCost`
    Total,
}

impl ResellerCostField {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "weekly" | "resellercostweeklytotal" => Ok(Self::Weekly),
            "total" | "resellercost" => Ok(Self::Total),
            other => anyhow::bail!("unsupported reseller cost field `{other}`, expected `weekly` or `total`"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcsConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub default_account_id: i64,
    pub reseller_cost_field: ResellerCostField,
    pub currency_symbol: String,
    pub package_separator: String,
    pub bind_addr: String,
}

impl Default for OcsConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            default_account_id: DEFAULT_ACCOUNT_ID,
            reseller_cost_field: ResellerCostField::Weekly,
            currency_symbol: "€".to_string(),
            package_separator: ", ".to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl OcsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("OCS_API_URL") {
            config.api_url = url.trim().trim_end_matches('?').to_string();
        }
        config.api_token = get("OCS_API_TOKEN").map(|token| token.trim().to_string());

        if let Some(raw) = get("OCS_ACCOUNT_ID") {
            config.default_account_id = raw
                .trim()
                .parse()
                .with_context(|| format!("OCS_ACCOUNT_ID must be an integer, got `{raw}`"))?;
        }
        if let Some(raw) = get("OCS_RESELLER_COST_FIELD") {
            config.reseller_cost_field =
                ResellerCostField::parse(&raw).context("invalid OCS_RESELLER_COST_FIELD")?;
        }
        if let Some(symbol) = get("OCS_CURRENCY_SYMBOL") {
            config.currency_symbol = symbol;
        }
        // Separators are whitespace-sensitive, so only an absent key falls back.
        if let Some(separator) = lookup("OCS_PACKAGE_SEPARATOR").filter(|s| !s.is_empty()) {
            config.package_separator = separator;
        }
        if let Some(addr) = get("OCS_BIND_ADDR") {
            config.bind_addr = addr;
        }

        Ok(config)
    }

    pub fn require_token(&self) -> anyhow::Result<&str> {
        self.api_token
            .as_deref()
            .context("OCS_API_TOKEN must be set to reach the OCS upstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = OcsConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.default_account_id, 3771);
        assert_eq!(config.reseller_cost_field, ResellerCostField::Weekly);
        assert_eq!(config.currency_symbol, "€");
        assert_eq!(config.package_separator, ", ");
        assert!(config.api_token.is_none());
        assert!(config.require_token().is_err());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = OcsConfig::from_lookup(lookup_from(&[
            ("OCS_API_URL", "http://localhost:9999/v1"),
            ("OCS_API_TOKEN", " secret "),
            ("OCS_ACCOUNT_ID", "42"),
            ("OCS_RESELLER_COST_FIELD", "total"),
            ("OCS_PACKAGE_SEPARATOR", " / "),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "http://localhost:9999/v1");
        assert_eq!(config.require_token().unwrap(), "secret");
        assert_eq!(config.default_account_id, 42);
        assert_eq!(config.reseller_cost_field, ResellerCostField::Total);
        assert_eq!(config.package_separator, " / ");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(OcsConfig::from_lookup(lookup_from(&[("OCS_ACCOUNT_ID", "abc")])).is_err());
        assert!(
            OcsConfig::from_lookup(lookup_from(&[("OCS_RESELLER_COST_FIELD", "monthly")])).is_err()
        );
    }
}
