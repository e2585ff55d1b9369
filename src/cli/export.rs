use super::duration::parse_duration;
use super::ui;
use crate::core::activity::{DateRange, ItemBundle, Stream};
use crate::core::aggregate::request_item_activity;
use crate::core::config::{AppConfig, EnvironmentConfig, ItemConfig};
use crate::core::export::{
    ExportOptions, INVESTMENT_HEADERS, TRANSACTION_HEADERS, write_header, write_investments,
    write_transactions,
};
use crate::core::filter::{clamp_semimonthly, omit_pending, sort_by_date};
use crate::core::format::NumberFormat;
use crate::core::provider::ActivityProvider;
use crate::core::staleness::{RefreshThreshold, check_refresh};
use crate::providers::PlaidClient;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use comfy_table::Cell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Start date, inclusive. Format: YYYY-MM-DD
    #[arg(long)]
    pub start: NaiveDate,

    /// End date. Format: YYYY-MM-DD
    #[arg(long)]
    pub end: NaiveDate,

    /// Environment to run in (sandbox|development|production)
    #[arg(long, default_value = "sandbox")]
    pub environment: String,

    /// Path for the transactions output file
    #[arg(long, default_value = "transactions.csv")]
    pub output: PathBuf,

    /// Path for the investments output file
    #[arg(long, default_value = "investments.csv")]
    pub investments_output: PathBuf,

    /// Remove records outside the semimonthly period
    #[arg(long)]
    pub clamp_semimonthly: bool,

    /// Include records on the end date
    #[arg(long)]
    pub inclusive_end_date: bool,

    /// Sort records by date for each item
    #[arg(long)]
    pub sort: bool,

    /// Omit csv headers
    #[arg(long)]
    pub omit_header: bool,

    /// Omit pending transactions
    #[arg(long)]
    pub omit_pending: bool,

    /// Assume yes to prompts; run non-interactively
    #[arg(long)]
    pub yes: bool,

    /// Request a (billed) refresh when data is older than this, e.g. 24h or 1h30m
    #[arg(long, default_value = "168h", value_parser = parse_duration)]
    pub refresh_threshold: Duration,

    /// Delimiter for joining the category hierarchy
    #[arg(long, default_value = ".")]
    pub category_delimiter: String,

    /// strftime format for the post date
    #[arg(long, default_value = "%Y-%m-%d")]
    pub format_post_date: String,

    /// strftime format for the authorized date
    #[arg(long, default_value = "%Y-%m-%d")]
    pub format_auth_date: String,

    /// printf format for amounts and fees
    #[arg(long, default_value = "%.2f")]
    pub format_amount: NumberFormat,

    /// printf format for security prices
    #[arg(long, default_value = "%g")]
    pub format_price: NumberFormat,
}

/// Everything a run needs, fixed before the first request.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub environment: String,
    pub range: DateRange,
    pub clamp_semimonthly: bool,
    pub sort: bool,
    pub omit_pending: bool,
    pub omit_header: bool,
    pub assume_yes: bool,
    pub refresh_threshold: RefreshThreshold,
    pub transactions_output: PathBuf,
    pub investments_output: PathBuf,
    pub export: ExportOptions,
}

impl TryFrom<ExportArgs> for ExportSettings {
    type Error = anyhow::Error;

    fn try_from(args: ExportArgs) -> Result<Self> {
        let mut range = DateRange::new(args.start, args.end)?;
        if args.inclusive_end_date {
            range = range.with_inclusive_end();
        }

        let export = ExportOptions {
            post_date_format: args.format_post_date,
            auth_date_format: args.format_auth_date,
            amount_format: args.format_amount,
            price_format: args.format_price,
            category_delimiter: args.category_delimiter,
        };
        export.validate()?;

        Ok(ExportSettings {
            environment: args.environment,
            range,
            clamp_semimonthly: args.clamp_semimonthly,
            sort: args.sort,
            omit_pending: args.omit_pending,
            omit_header: args.omit_header,
            assume_yes: args.yes,
            refresh_threshold: RefreshThreshold::new(args.refresh_threshold),
            transactions_output: args.output,
            investments_output: args.investments_output,
            export,
        })
    }
}

/// The two CSV sinks of a run.
pub struct Outputs<W: Write> {
    pub transactions: csv::Writer<W>,
    pub investments: csv::Writer<W>,
}

impl<W: Write> Outputs<W> {
    /// Headers are written by hand so appending runs can omit them.
    pub fn new(transactions: W, investments: W) -> Self {
        let writer = |inner| csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        Outputs {
            transactions: writer(transactions),
            investments: writer(investments),
        }
    }

    pub fn write_headers(&mut self) -> Result<()> {
        write_header(&mut self.transactions, &TRANSACTION_HEADERS)
            .context("Failed to write transactions header")?;
        write_header(&mut self.investments, &INVESTMENT_HEADERS)
            .context("Failed to write investments header")?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output file: {}", path.display()))
}

impl Outputs<File> {
    pub fn open(settings: &ExportSettings) -> Result<Self> {
        Ok(Outputs::new(
            open_append(&settings.transactions_output)?,
            open_append(&settings.investments_output)?,
        ))
    }
}

/// A bundle as fetched, with the streams refreshed beforehand.
#[derive(Debug)]
pub struct FetchedItem {
    pub bundle: ItemBundle,
    pub refreshed: Vec<Stream>,
}

/// Outcome of one item's export, as shown in the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub item_id: String,
    pub name: String,
    pub refreshed: Vec<Stream>,
    pub transactions: usize,
    pub investments: usize,
    pub error: Option<String>,
}

/// Fetches every configured item in order. Any provider failure ends the run
/// before anything is written.
pub async fn request_activity(
    provider: &dyn ActivityProvider,
    environment: &EnvironmentConfig,
    settings: &ExportSettings,
    now: DateTime<Utc>,
    mut on_item: impl FnMut(&str),
) -> Result<Vec<FetchedItem>> {
    let check = !settings.refresh_threshold.is_disabled();
    if !check {
        debug!("Refresh threshold at or above one week, skipping refresh checks");
    }

    let mut fetched = Vec::with_capacity(environment.items.len());
    for (item_id, item) in &environment.items {
        on_item(&item.name);
        let refreshed = if check {
            check_refresh(provider, item_id, item, &settings.refresh_threshold, now)
                .await
                .context("check refresh")?
        } else {
            Vec::new()
        };
        let bundle = request_item_activity(provider, item_id, item, &settings.range).await?;
        fetched.push(FetchedItem { bundle, refreshed });
    }
    Ok(fetched)
}

/// Normalizes and writes each fetched item. A failed item is reported and
/// the remaining items are still written.
pub fn write_activity<W: Write>(
    environment: &EnvironmentConfig,
    fetched: Vec<FetchedItem>,
    settings: &ExportSettings,
    outputs: &mut Outputs<W>,
) -> Vec<ItemReport> {
    let mut reports = Vec::with_capacity(fetched.len());
    for FetchedItem {
        mut bundle,
        refreshed,
    } in fetched
    {
        let Some(item) = environment.items.get(&bundle.item_id) else {
            warn!(item = %bundle.item_id, "Skipping response for unknown item ID");
            continue;
        };

        if settings.omit_pending {
            omit_pending(&mut bundle);
        }
        if settings.clamp_semimonthly {
            clamp_semimonthly(&mut bundle, settings.range.start, settings.range.end);
        }
        if settings.sort {
            sort_by_date(&mut bundle);
        }

        let mut report = ItemReport {
            item_id: bundle.item_id.clone(),
            name: item.name.clone(),
            refreshed,
            transactions: 0,
            investments: 0,
            error: None,
        };

        let written = write_item(outputs, item, &bundle, &settings.export, &mut report);
        match written {
            Ok(()) => info!(
                item = %item.name,
                transactions = report.transactions,
                investments = report.investments,
                "Wrote item"
            ),
            Err(e) => {
                let message = format!("{e:#}");
                error!(item = %item.name, error = %message, "Failed to export item");
                report.error = Some(message);
            }
        }
        reports.push(report);
    }
    reports
}

fn write_item<W: Write>(
    outputs: &mut Outputs<W>,
    item: &ItemConfig,
    bundle: &ItemBundle,
    opts: &ExportOptions,
    report: &mut ItemReport,
) -> Result<()> {
    match write_transactions(&mut outputs.transactions, item, bundle, opts) {
        Ok(rows) => report.transactions = rows,
        Err(e) => {
            report.transactions = e.rows_written;
            return Err(e).context("write transactions");
        }
    }
    match write_investments(&mut outputs.investments, item, bundle, opts) {
        Ok(rows) => report.investments = rows,
        Err(e) => {
            report.investments = e.rows_written;
            return Err(e).context("write investments");
        }
    }
    Ok(())
}

/// Fails the run when any item failed to export.
pub fn check_reports(reports: &[ItemReport]) -> Result<()> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| r.name.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("Export failed for items: {}", failed.join(", "));
    }
    Ok(())
}

pub fn display_reports(reports: &[ItemReport]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Item"),
        ui::header_cell("Item ID"),
        ui::header_cell("Refreshed"),
        ui::header_cell("Transactions"),
        ui::header_cell("Investments"),
        ui::header_cell("Status"),
    ]);

    for report in reports {
        let refreshed = if report.refreshed.is_empty() {
            ui::style_text("-", ui::StyleType::Subtle)
        } else {
            report
                .refreshed
                .iter()
                .map(Stream::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![
            Cell::new(&report.name),
            ui::subtle_cell(&report.item_id),
            Cell::new(refreshed),
            ui::count_cell(report.transactions),
            ui::count_cell(report.investments),
            ui::status_cell(report.error.as_deref()),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Export summary", ui::StyleType::Title),
        table
    )
}

pub async fn run(args: ExportArgs, config_path: Option<&str>) -> Result<()> {
    let settings = ExportSettings::try_from(args)?;
    debug!(?settings, "Export settings");

    if settings.environment == "production" && !settings.assume_yes {
        let confirmed = ui::confirm_environment(&settings.environment, &mut std::io::stdin().lock())
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("{}", ui::style_text("Aborted", ui::StyleType::Error));
            return Ok(());
        }
    }

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    let environment = config.environment(&settings.environment)?;
    let provider = PlaidClient::new(&settings.environment, environment)?;
    info!(environment = %settings.environment, base_url = provider.base_url(), "Using Plaid");

    let mut outputs = Outputs::open(&settings)?;

    let spinner = ui::new_spinner("Requesting activity...");
    let fetched = request_activity(&provider, environment, &settings, Utc::now(), |name| {
        spinner.set_message(format!("Requesting {name}..."));
    })
    .await;
    spinner.finish_and_clear();
    let fetched = fetched.context("request activity from plaid")?;

    if !settings.omit_header {
        outputs.write_headers()?;
    }

    let reports = write_activity(environment, fetched, &settings, &mut outputs);
    println!("{}", display_reports(&reports));
    check_reports(&reports)
}
