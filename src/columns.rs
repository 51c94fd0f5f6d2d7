use clap::ValueEnum;

use crate::format::{format_currency, format_gigabytes, format_margin};
use crate::metrics::DerivedRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Column {
    Id,
    Iccid,
    Status,
    Packages,
    Activated,
    Expires,
    LastUsage,
    SubscriberCost,
    ResellerCost,
    Profit,
    Margin,
    UsedData,
    PackageData,
}

impl Column {
    pub fn header(self, currency: &str) -> String {
        match self {
            Self::Id => "ID".to_string(),
            Self::Iccid => "ICCID".to_string(),
            Self::Status => "Status".to_string(),
            Self::Packages => "Package".to_string(),
            Self::Activated => "Activated".to_string(),
            Self::Expires => "Expires".to_string(),
            Self::LastUsage => "Last usage".to_string(),
            Self::SubscriberCost => format!("Subscr. {currency}"),
            Self::ResellerCost => format!("Reseller {currency}"),
            Self::Profit => format!("Profit {currency}"),
            Self::Margin => "Margin".to_string(),
            Self::UsedData => "Used".to_string(),
            Self::PackageData => "Package data".to_string(),
        }
    }

    pub fn render(self, row: &DerivedRow, currency: &str) -> String {
        match self {
            Self::Id => row.subscriber_id.clone(),
            Self::Iccid => row.iccid.clone(),
            Self::Status => row.status.clone(),
            Self::Packages => row.packages.clone(),
            Self::Activated => row.activated.clone(),
            Self::Expires => row.expires.clone(),
            Self::LastUsage => row.last_usage.clone(),
            Self::SubscriberCost => format_currency(row.subscriber_cost, currency),
            Self::ResellerCost => format_currency(row.reseller_cost, currency),
            Self::Profit => format_currency(row.profit, currency),
            Self::Margin => format_margin(row.margin),
            Self::UsedData => format_gigabytes(row.used_data_bytes),
            Self::PackageData => format_gigabytes(row.package_data_bytes),
        }
    }

    /// Columns fed by the per-subscriber usage calls.
    pub fn needs_enrichment(self) -> bool {
        matches!(self, Self::LastUsage | Self::UsedData | Self::PackageData)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::SubscriberCost
                | Self::ResellerCost
                | Self::Profit
                | Self::Margin
                | Self::UsedData
                | Self::PackageData
        )
    }
}

/// Named column layouts for the dashboard variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColumnPreset {
    /// Identity, lifecycle and cost columns.
    Billing,
    /// Identity, lifecycle and data usage columns.
    Usage,
    Full,
}

impl ColumnPreset {
    pub fn columns(self) -> Vec<Column> {
        use Column::*;
        match self {
            Self::Billing => vec![
                Id,
                Iccid,
                Status,
                Packages,
                Activated,
                Expires,
                SubscriberCost,
                ResellerCost,
                Profit,
                Margin,
            ],
            Self::Usage => vec![
                Id,
                Iccid,
                Status,
                Packages,
                Activated,
                Expires,
                LastUsage,
                UsedData,
                PackageData,
            ],
            Self::Full => Column::value_variants().to_vec(),
        }
    }

    pub fn wants_enrichment(self) -> bool {
        self.columns().into_iter().any(Column::needs_enrichment)
    }
}
