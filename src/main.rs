use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::info;

use ocs_subscriber_dashboard::columns::{Column, ColumnPreset};
use ocs_subscriber_dashboard::config::{OcsConfig, ResellerCostField};
use ocs_subscriber_dashboard::metrics::DeriveOptions;
use ocs_subscriber_dashboard::ocs::{OcsApi, OcsClient};
use ocs_subscriber_dashboard::proxy::{self, ProxyClient, ProxyState};
use ocs_subscriber_dashboard::view::{self, DashboardView, ViewSettings};
use ocs_subscriber_dashboard::{error, observability, report};

#[derive(Parser)]
#[command(name = "ocs-dashboard")]
#[command(about = "Subscriber, usage and margin dashboards over an OCS billing API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the forwarding endpoint in front of the OCS API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show the subscriber table and refresh it on demand
    Dashboard {
        #[command(flatten)]
        args: ViewArgs,
        /// Render once and exit instead of waiting for input
        #[arg(long)]
        once: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        args: ViewArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the rendered rows as CSV
    Export {
        #[command(flatten)]
        args: ViewArgs,
        #[arg(long, default_value = "subscribers.csv")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct ViewArgs {
    #[arg(long)]
    account_id: Option<i64>,
    /// Base URL of a running `serve` instance; the OCS API is called directly when omitted
    #[arg(long)]
    proxy_url: Option<String>,
    #[arg(long, value_enum, default_value_t = ColumnPreset::Billing)]
    preset: ColumnPreset,
    /// Explicit column list, overrides --preset
    #[arg(long, value_enum, value_delimiter = ',')]
    columns: Vec<Column>,
    /// Fetch detail and prepaid packages per subscriber
    #[arg(long)]
    enrich: bool,
    #[arg(long, value_enum)]
    reseller_cost_field: Option<ResellerCostField>,
}

impl ViewArgs {
    fn settings(&self, config: &OcsConfig) -> ViewSettings {
        let (columns, implied) = if self.columns.is_empty() {
            (self.preset.columns(), self.preset.wants_enrichment())
        } else {
            let implied = self.columns.iter().any(|column| column.needs_enrichment());
            (self.columns.clone(), implied)
        };
        let enrich = self.enrich || implied;

        ViewSettings {
            columns,
            enrich,
            derive: DeriveOptions {
                reseller_cost_field: self.reseller_cost_field.unwrap_or(config.reseller_cost_field),
                package_separator: config.package_separator.clone(),
            },
            currency: config.currency_symbol.clone(),
        }
    }

    fn backend(&self, config: &OcsConfig) -> anyhow::Result<Backend> {
        match &self.proxy_url {
            Some(url) => Ok(Backend::Proxy(ProxyClient::new(url.as_str()))),
            None => {
                let token = config.require_token()?;
                Ok(Backend::Direct(OcsClient::new(config.api_url.as_str(), token)))
            }
        }
    }
}

/// Either the OCS API itself or the local proxy in front of it.
enum Backend {
    Direct(OcsClient),
    Proxy(ProxyClient),
}

impl OcsApi for Backend {
    async fn list_subscribers(&self, account_id: i64) -> error::Result<Vec<Value>> {
        match self {
            Self::Direct(client) => client.list_subscribers(account_id).await,
            Self::Proxy(client) => client.list_subscribers(account_id).await,
        }
    }

    async fn single_subscriber(&self, subscriber_id: i64) -> error::Result<Value> {
        match self {
            Self::Direct(client) => client.single_subscriber(subscriber_id).await,
            Self::Proxy(client) => client.single_subscriber(subscriber_id).await,
        }
    }

    async fn prepaid_packages(&self, subscriber_id: i64) -> error::Result<Value> {
        match self {
            Self::Direct(client) => client.prepaid_packages(subscriber_id).await,
            Self::Proxy(client) => client.prepaid_packages(subscriber_id).await,
        }
    }
}

enum Input {
    Refresh,
    Quit,
    Account(i64),
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" | "r" | "refresh" => Input::Refresh,
        "q" | "quit" | "exit" => Input::Quit,
        other => match other.parse::<i64>() {
            Ok(id) if id > 0 => Input::Account(id),
            _ => Input::Unknown(other.to_string()),
        },
    }
}

fn write_report(out: &Path, report: &str) -> anyhow::Result<()> {
    std::fs::write(out, report).with_context(|| format!("failed to write {}", out.display()))
}

async fn serve(config: &OcsConfig, bind: Option<String>) -> anyhow::Result<()> {
    let token = config.require_token()?;
    let state = ProxyState {
        client: Arc::new(OcsClient::new(config.api_url.as_str(), token)),
        default_account_id: config.default_account_id,
    };
    let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, upstream = %config.api_url, "proxy listening");
    println!("Proxy listening on http://{bind_addr}{}", proxy::LIST_SUBSCRIBERS_PATH);

    axum::serve(listener, proxy::router(state))
        .await
        .context("proxy server failed")?;
    Ok(())
}

async fn run_dashboard(backend: Backend, mut view: DashboardView, once: bool) -> anyhow::Result<()> {
    view.refresh(&backend).await;
    print!("{}", view.render());
    if once {
        return Ok(());
    }

    println!();
    println!("Type an account id to change it, r to refresh, q to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Quit => break,
            Input::Refresh => {
                view.refresh(&backend).await;
                print!("{}", view.render());
            }
            Input::Account(id) => {
                view.set_account_id(id);
                println!("Account set to {id}. Press r to refresh.");
            }
            Input::Unknown(text) => println!("Unrecognized input `{text}`."),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_logging(observability::LogFormat::from_env());
    let cli = Cli::parse();
    let config = OcsConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { bind } => serve(&config, bind).await?,
        Commands::Dashboard { args, once } => {
            let backend = args.backend(&config)?;
            let account_id = args.account_id.unwrap_or(config.default_account_id);
            let dashboard = DashboardView::new(account_id, args.settings(&config));
            run_dashboard(backend, dashboard, once).await?;
        }
        Commands::Report { args, out } => {
            let backend = args.backend(&config)?;
            let settings = args.settings(&config);
            let account_id = args.account_id.unwrap_or(config.default_account_id);

            let loaded = view::load_rows(&backend, account_id, &settings)
                .await
                .with_context(|| format!("failed to load subscribers for account {account_id}"))?;
            let summary = report::summarize(&loaded.rows, loaded.skipped);
            let report = report::build_report(
                account_id,
                chrono::Utc::now(),
                &loaded.rows,
                &summary,
                &settings.columns,
                &settings.currency,
            );
            write_report(&out, &report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { args, out } => {
            let backend = args.backend(&config)?;
            let settings = args.settings(&config);
            let account_id = args.account_id.unwrap_or(config.default_account_id);

            let loaded = view::load_rows(&backend, account_id, &settings)
                .await
                .with_context(|| format!("failed to load subscribers for account {account_id}"))?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_csv(file, &loaded.rows, &settings.columns, &settings.currency)?;
            println!("Exported {} rows to {}.", loaded.rows.len(), out.display());
        }
    }

    Ok(())
}
