//! Dashboard state machine: idle, loading, error, loaded-empty, loaded.
//!
//! Every refresh hands out a ticket; only the newest ticket may write results,
//! so a slow earlier fetch never overwrites a later one.

use std::fmt::Write;

use tracing::{info, instrument, warn};

use crate::columns::Column;
use crate::enrich::enrich_all;
use crate::error::Result;
use crate::metrics::{DeriveOptions, DerivedRow};
use crate::models::Subscriber;
use crate::ocs::OcsApi;
use crate::report::{render_summary, render_table, summarize};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    Loading,
    Error(String),
    LoadedEmpty,
    Loaded,
}

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub columns: Vec<Column>,
    pub enrich: bool,
    pub derive: DeriveOptions,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedRows {
    pub rows: Vec<DerivedRow>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
    pub account_id: i64,
}

/// Fetches, decodes and derives one refresh worth of rows.
#[instrument(skip(api, settings), fields(enrich = settings.enrich))]
pub async fn load_rows<A: OcsApi>(api: &A, account_id: i64, settings: &ViewSettings) -> Result<LoadedRows> {
    let raw = api.list_subscribers(account_id).await?;

    let mut subscribers = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for (index, value) in raw.iter().enumerate() {
        match Subscriber::decode(index, value) {
            Ok(subscriber) => subscribers.push(subscriber),
            Err(err) => {
                warn!(error = %err, "skipping subscriber record");
                skipped += 1;
            }
        }
    }

    let rows: Vec<DerivedRow> = if settings.enrich {
        enrich_all(api, subscribers)
            .await
            .iter()
            .map(|entry| DerivedRow::derive(&entry.subscriber, Some(&entry.usage), &settings.derive))
            .collect()
    } else {
        subscribers
            .iter()
            .map(|subscriber| DerivedRow::derive(subscriber, None, &settings.derive))
            .collect()
    };

    info!(rows = rows.len(), skipped, "subscriber rows ready");
    Ok(LoadedRows { rows, skipped })
}

#[derive(Debug)]
pub struct DashboardView {
    account_id: i64,
    state: ViewState,
    loaded: LoadedRows,
    generation: u64,
    settings: ViewSettings,
}

impl DashboardView {
    pub fn new(account_id: i64, settings: ViewSettings) -> Self {
        Self {
            account_id,
            state: ViewState::Idle,
            loaded: LoadedRows::default(),
            generation: 0,
            settings,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn rows(&self) -> &[DerivedRow] {
        &self.loaded.rows
    }

    pub fn skipped(&self) -> usize {
        self.loaded.skipped
    }

    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    /// Edits the pending account id. Nothing reloads until the next refresh.
    pub fn set_account_id(&mut self, account_id: i64) {
        self.account_id = account_id;
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.generation += 1;
        self.state = ViewState::Loading;
        RefreshTicket {
            generation: self.generation,
            account_id: self.account_id,
        }
    }

    /// Applies a finished load. Returns `false` when a newer refresh has
    /// started since `ticket` was issued and the result was dropped.
    pub fn complete(&mut self, ticket: RefreshTicket, result: Result<LoadedRows>) -> bool {
        if ticket.generation != self.generation {
            info!(stale = ticket.generation, current = self.generation, "dropping stale refresh");
            return false;
        }

        match result {
            Ok(loaded) => {
                self.state = if loaded.rows.is_empty() {
                    ViewState::LoadedEmpty
                } else {
                    ViewState::Loaded
                };
                self.loaded = loaded;
            }
            Err(err) => {
                self.state = ViewState::Error(err.to_string());
                self.loaded = LoadedRows::default();
            }
        }
        true
    }

    pub async fn refresh<A: OcsApi>(&mut self, api: &A) {
        let ticket = self.begin_refresh();
        let result = load_rows(api, ticket.account_id, &self.settings).await;
        self.complete(ticket, result);
    }

    pub fn render(&self) -> String {
        let currency = &self.settings.currency;
        let mut output = String::new();
        let _ = writeln!(output, "Subscriber dashboard, account {}", self.account_id);
        let _ = writeln!(output);

        match &self.state {
            ViewState::Idle => {
                let _ = writeln!(output, "Press r to load.");
            }
            ViewState::Loading => {
                let _ = writeln!(output, "Loading…");
            }
            ViewState::Error(message) => {
                let _ = writeln!(output, "API error: {message}");
            }
            ViewState::LoadedEmpty => {
                let _ = writeln!(output, "No data.");
                if self.loaded.skipped > 0 {
                    let _ = writeln!(output, "Skipped records: {}", self.loaded.skipped);
                }
            }
            ViewState::Loaded => {
                output.push_str(&render_table(&self.loaded.rows, &self.settings.columns, currency));
                let _ = writeln!(output);
                let summary = summarize(&self.loaded.rows, self.loaded.skipped);
                output.push_str(&render_summary(&summary, currency));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnPreset;
    use crate::enrich::tests::FakeApi;
    use crate::error::OcsError;
    use serde_json::json;

    fn settings(enrich: bool) -> ViewSettings {
        ViewSettings {
            columns: ColumnPreset::Full.columns(),
            enrich,
            derive: DeriveOptions::default(),
            currency: "€".to_string(),
        }
    }

    #[tokio::test]
    async fn mount_loads_rows() {
        let api = FakeApi {
            subscribers: vec![
                json!({"subscriberId": 1, "status": [{"status": "ACTIVE", "startDate": "2024-01-01"}], "subscriberCost": 10, "resellerCostWeeklyTotal": 4}),
                json!("garbage"),
            ],
            ..FakeApi::default()
        };
        let mut view = DashboardView::new(3771, settings(false));
        assert_eq!(view.state(), &ViewState::Idle);

        view.refresh(&api).await;
        assert_eq!(view.state(), &ViewState::Loaded);
        assert_eq!(view.rows().len(), 1);
        assert_eq!(view.skipped(), 1);
        assert_eq!(view.rows()[0].profit, 6.0);

        let rendered = view.render();
        assert!(rendered.contains("ACTIVE"));
        assert!(rendered.contains("Skipped records: 1"));
    }

    #[tokio::test]
    async fn empty_list_is_loaded_empty() {
        let api = FakeApi::default();
        let mut view = DashboardView::new(3771, settings(false));
        view.refresh(&api).await;
        assert_eq!(view.state(), &ViewState::LoadedEmpty);
        assert!(view.render().contains("No data."));
    }

    #[tokio::test]
    async fn failure_clears_rows() {
        let mut api = FakeApi {
            subscribers: vec![json!({"subscriberId": 1})],
            ..FakeApi::default()
        };
        let mut view = DashboardView::new(3771, settings(false));
        view.refresh(&api).await;
        assert_eq!(view.rows().len(), 1);

        api.list_error = Some("invalid token".to_string());
        view.refresh(&api).await;
        assert_eq!(view.state(), &ViewState::Error("invalid token".to_string()));
        assert!(view.rows().is_empty());
        assert!(view.render().contains("API error: invalid token"));
    }

    #[test]
    fn editing_account_id_does_not_change_state() {
        let mut view = DashboardView::new(3771, settings(false));
        view.set_account_id(42);
        assert_eq!(view.state(), &ViewState::Idle);
        assert_eq!(view.account_id(), 42);

        let ticket = view.begin_refresh();
        assert_eq!(ticket.account_id, 42);
        assert_eq!(view.state(), &ViewState::Loading);
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut view = DashboardView::new(3771, settings(false));
        let first = view.begin_refresh();
        let second = view.begin_refresh();

        let fresh = LoadedRows {
            rows: vec![DerivedRow {
                subscriber_id: "2".into(),
                ..DerivedRow::default()
            }],
            skipped: 0,
        };
        assert!(view.complete(second, Ok(fresh)));
        assert!(!view.complete(first, Err(OcsError::Proxy("slow failure".into()))));
        assert_eq!(view.state(), &ViewState::Loaded);
        assert_eq!(view.rows()[0].subscriber_id, "2");
    }

    #[tokio::test]
    async fn enrichment_failure_defaults_usage_for_that_row() {
        let mut api = FakeApi {
            subscribers: vec![
                json!({"subscriberId": 1}),
                json!({"subscriberId": 2}),
                json!({"subscriberId": 3}),
            ],
            ..FakeApi::default()
        };
        for id in [1, 2, 3] {
            api.details.insert(id, json!({"getSingleSubscriber": {"subscriberId": id}}));
            if id != 2 {
                api.packages.insert(
                    id,
                    json!({"listSubscriberPrepaidPackages": {"packages": [{"usedDataByte": 1_073_741_824u64}]}}),
                );
            }
        }

        let mut view = DashboardView::new(3771, settings(true));
        view.refresh(&api).await;

        assert_eq!(view.state(), &ViewState::Loaded);
        let used: Vec<f64> = view.rows().iter().map(|row| row.used_data_bytes).collect();
        assert_eq!(used, [1_073_741_824.0, 0.0, 1_073_741_824.0]);
    }
}
