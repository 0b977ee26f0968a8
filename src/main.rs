//! CLI entry point for the fleet KPI tool.
//!
//! Provides subcommands for computing dashboard totals, fetching work-order
//! material costs and managing saved dashboard settings.

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use fleet_kpi::{
    config::FleetConfig,
    costs::load_for_vehicle,
    dashboard::{Dashboard, resolve_window},
    fetch::{BasicClient, HttpClient, auth::ApiKey},
    logging,
    output::{TotalsRow, append_totals, print_json, write_records_csv},
    selection::{self, Selection},
    settings::{Settings, open_repository},
    sources::{open_cost_source, open_row_source},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fleet_kpi")]
#[command(about = "Fleet fuel and material cost KPIs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Filters shared by the commands that scope data.
#[derive(Args, Default)]
struct FilterArgs {
    /// Window start (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    from: Option<String>,

    /// Window end (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    to: Option<String>,

    /// Only include this vehicle (repeatable)
    #[arg(long = "vehicle")]
    vehicles: Vec<String>,

    /// Only include this category (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
}

impl FilterArgs {
    /// Builds a selection, letting explicit flags override `saved` values.
    fn selection(&self, saved: Option<&Settings>) -> Selection {
        let saved_date = |d: Option<chrono::NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string());
        let pick = |flags: &Vec<String>, saved: Option<&Vec<String>>| {
            if flags.is_empty() {
                saved.cloned().unwrap_or_default()
            } else {
                flags.clone()
            }
        };

        selection::normalize(&json!({
            "vehicleKeys": pick(&self.vehicles, saved.map(|s| &s.vehicle_keys)),
            "categoryKeys": pick(&self.categories, saved.map(|s| &s.category_keys)),
            "dateFrom": self.from.clone().or_else(|| saved_date(saved.and_then(|s| s.date_from))),
            "dateTo": self.to.clone().or_else(|| saved_date(saved.and_then(|s| s.date_to))),
        }))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute dashboard totals for a selection
    Totals {
        /// Vehicle rows: JSON file path or URL (defaults to FLEET_ROWS_URL)
        #[arg(long, value_name = "FILE_OR_URL")]
        rows: Option<String>,

        /// Material cost lines: JSON file path or URL; enables reconciliation
        #[arg(long, value_name = "FILE_OR_URL")]
        costs: Option<String>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Start from the saved settings; explicit flags still win
        #[arg(long, default_value_t = false)]
        saved: bool,

        /// Maximum order ids per cost request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Export the matching vehicle rows to this CSV file
        #[arg(long)]
        csv: Option<String>,

        /// Append the totals to this CSV history file
        #[arg(long)]
        history: Option<String>,

        /// Print the full snapshot as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch and merge material costs for a vehicle's work orders
    OrderCosts {
        /// Material cost lines: JSON file path or URL (defaults to FLEET_COSTS_URL)
        #[arg(long, value_name = "FILE_OR_URL")]
        costs: Option<String>,

        /// Vehicle the orders belong to
        #[arg(long)]
        vehicle: String,

        /// Window start (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        from: Option<String>,

        /// Window end (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        to: Option<String>,

        /// Maximum order ids per cost request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Work order ids
        #[arg(value_name = "ORDER_ID", required = true)]
        order_ids: Vec<String>,
    },
    /// Show or update saved dashboard settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the saved settings
    Show,
    /// Save filters, window and batch size
    Save {
        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = logging::init();
    let config = FleetConfig::from_env();
    let cli = Cli::parse();

    match cli.command {
        Commands::Totals {
            rows,
            costs,
            filters,
            saved,
            batch_size,
            csv,
            history,
            json,
        } => {
            let settings = if saved {
                Some(open_repository(&config.settings_backend).load().await?)
            } else {
                None
            };
            let selection = filters.selection(settings.as_ref());

            let config = FleetConfig {
                batch_size: batch_size
                    .or(settings.as_ref().map(|s| s.batch_size))
                    .filter(|n| *n > 0)
                    .unwrap_or(config.batch_size),
                reconcile_materials: config.reconcile_materials || costs.is_some(),
                ..config
            };

            let rows_location = rows
                .or_else(|| config.rows_location.clone())
                .ok_or_else(|| anyhow!("no row source: pass --rows or set FLEET_ROWS_URL"))?;
            let costs_location = costs.or_else(|| config.costs_location.clone());

            let client = http_client(&config)?;
            let row_source = open_row_source(&rows_location, client.clone());
            let cost_source = costs_location.map(|loc| open_cost_source(&loc, client.clone()));

            let dashboard = Dashboard::new(config, row_source.into(), cost_source.map(Into::into));
            let snapshot = dashboard.refresh(&selection).await?;

            if let Some(path) = csv {
                let written = write_records_csv(&path, &snapshot.records, &selection)
                    .with_context(|| format!("failed to export {path}"))?;
                info!(path = %path, written, "CSV export written");
            }
            if let Some(path) = history {
                append_totals(&path, &TotalsRow::from_snapshot(&snapshot))?;
            }

            if json {
                print_json(&snapshot)?;
            } else {
                print_json(&snapshot.totals)?;
            }
        }
        Commands::OrderCosts {
            costs,
            vehicle,
            from,
            to,
            batch_size,
            order_ids,
        } => {
            let location = costs
                .or_else(|| config.costs_location.clone())
                .ok_or_else(|| anyhow!("no cost source: pass --costs or set FLEET_COSTS_URL"))?;
            let window = selection::normalize(&json!({"dateFrom": from, "dateTo": to}));
            let today = Local::now().date_naive();
            let range = resolve_window(&window, today, config.default_window_days);

            let source = open_cost_source(&location, http_client(&config)?);
            let aggregate = load_for_vehicle(
                source.as_ref(),
                &vehicle,
                &range,
                order_ids.as_slice(),
                batch_size.unwrap_or(config.batch_size),
            )
            .await;

            print_json(&aggregate)?;
        }
        Commands::Settings { action } => {
            let repo = open_repository(&config.settings_backend);

            match action {
                SettingsAction::Show => print_json(&repo.load().await?)?,
                SettingsAction::Save {
                    filters,
                    batch_size,
                } => {
                    let current = repo.load().await?;
                    let selection = filters.selection(Some(&current));
                    let updated = Settings {
                        batch_size: batch_size.filter(|n| *n > 0).unwrap_or(current.batch_size),
                        date_from: selection.date_from.map(|d| d.date()),
                        date_to: selection.date_to.map(|d| d.date()),
                        vehicle_keys: selection.vehicle_keys.into_iter().collect(),
                        category_keys: selection.category_keys.into_iter().collect(),
                    };
                    repo.save(&updated).await?;
                    info!("Settings saved");
                    print_json(&updated)?;
                }
            }
        }
    }

    Ok(())
}

/// Remote sources share one client, authenticated when an API key is set.
fn http_client(config: &FleetConfig) -> Result<Arc<dyn HttpClient>> {
    let basic = BasicClient::with_timeout(config.http_timeout)?;
    Ok(match &config.api_key {
        Some(key) => Arc::new(ApiKey::bearer(basic, key)?),
        None => Arc::new(basic),
    })
}
