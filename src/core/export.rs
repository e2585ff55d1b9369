//! Projection of an item bundle onto the two CSV row schemas.
//!
//! Bank transactions and cash-like investment entries share the transaction
//! schema. Security trades use the investment schema. Either writer stops at
//! the first record whose account or security cannot be resolved; rows
//! written before that point stay in the output.

use crate::core::activity::{InvestmentTransaction, ItemBundle, Security, Transaction};
use crate::core::config::ItemConfig;
use crate::core::format::{NumberFormat, format_date, join_category, validate_date_format};
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, warn};

pub const TRANSACTION_HEADERS: [&str; 10] = [
    "Post Date",
    "Authorized Date",
    "Account",
    "Account Name",
    "Check Number",
    "Payee",
    "Amount",
    "Currency",
    "Category",
    "Transaction ID",
];

pub const INVESTMENT_HEADERS: [&str; 12] = [
    "Post Date",
    "Account",
    "Account Name",
    "Name",
    "Quantity",
    "Amount",
    "Price",
    "Transaction ID",
    "Fee",
    "Fee Currency",
    "Ticker Symbol",
    "Category",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub post_date_format: String,
    pub auth_date_format: String,
    pub amount_format: NumberFormat,
    pub price_format: NumberFormat,
    pub category_delimiter: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            post_date_format: "%Y-%m-%d".to_string(),
            auth_date_format: "%Y-%m-%d".to_string(),
            amount_format: NumberFormat::default(),
            price_format: NumberFormat::Shortest,
            category_delimiter: ".".to_string(),
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<()> {
        validate_date_format(&self.post_date_format)?;
        validate_date_format(&self.auth_date_format)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ExportErrorKind {
    #[error("unknown account: {0:?}")]
    UnknownAccount(String),
    #[error("unknown security: {0:?}")]
    UnknownSecurity(String),
    #[error("render date with format {0:?}")]
    DateFormat(String),
    #[error("write record: {0}")]
    Write(csv::Error),
    #[error("flush output: {0}")]
    Flush(std::io::Error),
}

/// An aborted item export. `rows_written` rows reached the output before the
/// failure.
#[derive(Debug, Error)]
#[error("{kind} ({rows_written} rows written)")]
pub struct ExportError {
    pub rows_written: usize,
    pub kind: ExportErrorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRow {
    pub post_date: String,
    pub authorized_date: String,
    pub account: String,
    pub account_name: String,
    pub check_number: String,
    pub payee: String,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentRow {
    pub post_date: String,
    pub account: String,
    pub account_name: String,
    pub name: String,
    pub quantity: String,
    pub amount: String,
    pub price: String,
    pub transaction_id: String,
    pub fee: String,
    pub fee_currency: String,
    pub ticker_symbol: String,
    pub category: String,
}

fn render_date(date: NaiveDate, format: &str) -> Result<String, ExportErrorKind> {
    format_date(date, format).map_err(|_| ExportErrorKind::DateFormat(format.to_string()))
}

fn account_name<'a>(
    accounts: &'a std::collections::BTreeMap<String, String>,
    account_id: &str,
) -> Result<&'a str, ExportErrorKind> {
    accounts
        .get(account_id)
        .map(String::as_str)
        .ok_or_else(|| ExportErrorKind::UnknownAccount(account_id.to_string()))
}

fn security<'a>(
    bundle: &'a ItemBundle,
    inv: &InvestmentTransaction,
) -> Result<&'a Security, ExportErrorKind> {
    bundle
        .securities
        .get(&inv.security_id)
        .ok_or_else(|| ExportErrorKind::UnknownSecurity(inv.security_id.clone()))
}

pub fn project_transaction(
    item: &ItemConfig,
    tx: &Transaction,
    opts: &ExportOptions,
) -> Result<TransactionRow, ExportErrorKind> {
    Ok(TransactionRow {
        post_date: render_date(tx.date, &opts.post_date_format)?,
        authorized_date: tx
            .authorized_date
            .map(|d| render_date(d, &opts.auth_date_format))
            .transpose()?
            .unwrap_or_default(),
        account: account_name(&item.transactions, &tx.account_id)?.to_string(),
        account_name: item.name.clone(),
        check_number: tx.check_number.clone(),
        payee: tx.payee().to_string(),
        amount: opts.amount_format.format(tx.amount),
        currency: tx.currency().to_string(),
        category: join_category(&tx.category, &opts.category_delimiter),
        transaction_id: tx.id.clone(),
    })
}

/// Cash or fee entry of a brokerage account, rendered as a transaction with
/// the security name as payee.
pub fn project_cash_investment(
    item: &ItemConfig,
    bundle: &ItemBundle,
    inv: &InvestmentTransaction,
    opts: &ExportOptions,
) -> Result<TransactionRow, ExportErrorKind> {
    let security = security(bundle, inv)?;
    Ok(TransactionRow {
        post_date: render_date(inv.date, &opts.post_date_format)?,
        authorized_date: String::new(),
        account: account_name(&item.investments, &inv.account_id)?.to_string(),
        account_name: item.name.clone(),
        check_number: String::new(),
        payee: security.name.clone(),
        amount: opts.amount_format.format(inv.amount),
        currency: inv.currency().to_string(),
        category: format!("{}.{}", inv.kind, inv.subtype),
        transaction_id: inv.id.clone(),
    })
}

pub fn project_investment(
    item: &ItemConfig,
    bundle: &ItemBundle,
    inv: &InvestmentTransaction,
    opts: &ExportOptions,
) -> Result<InvestmentRow, ExportErrorKind> {
    let security = security(bundle, inv)?;
    Ok(InvestmentRow {
        post_date: render_date(inv.date, &opts.post_date_format)?,
        account: account_name(&item.investments, &inv.account_id)?.to_string(),
        account_name: item.name.clone(),
        name: security.name.clone(),
        quantity: format!("{}", inv.quantity),
        amount: opts.amount_format.format(inv.amount),
        price: opts.price_format.format(inv.price),
        transaction_id: inv.id.clone(),
        fee: opts.amount_format.format(inv.fees),
        fee_currency: inv.currency().to_string(),
        ticker_symbol: security.ticker_symbol.clone(),
        category: security.category(),
    })
}

pub fn write_header<W: Write>(output: &mut csv::Writer<W>, header: &[&str]) -> Result<()> {
    output.write_record(header)?;
    output.flush()?;
    Ok(())
}

/// Tracks rows written for one item and turns failures into [`ExportError`].
struct ItemWriter<'a, W: Write> {
    output: &'a mut csv::Writer<W>,
    rows_written: usize,
}

impl<'a, W: Write> ItemWriter<'a, W> {
    fn new(output: &'a mut csv::Writer<W>) -> Self {
        Self {
            output,
            rows_written: 0,
        }
    }

    fn write<R: Serialize>(&mut self, row: Result<R, ExportErrorKind>) -> Result<(), ExportError> {
        let written = row.and_then(|row| {
            self.output
                .serialize(row)
                .map_err(ExportErrorKind::Write)
        });
        match written {
            Ok(()) => {
                self.rows_written += 1;
                Ok(())
            }
            Err(kind) => {
                // Rows before the failure still reach the output.
                if let Err(e) = self.output.flush() {
                    warn!(
                        rows = self.rows_written,
                        error = %e,
                        "Failed to flush rows written before export failure"
                    );
                }
                Err(self.fail(kind))
            }
        }
    }

    fn finish(self) -> Result<usize, ExportError> {
        self.output
            .flush()
            .map_err(|e| ExportError {
                rows_written: self.rows_written,
                kind: ExportErrorKind::Flush(e),
            })?;
        Ok(self.rows_written)
    }

    fn fail(&self, kind: ExportErrorKind) -> ExportError {
        ExportError {
            rows_written: self.rows_written,
            kind,
        }
    }
}

/// Writes bank transactions followed by cash-like investment entries, except
/// stock distributions which move no money.
pub fn write_transactions<W: Write>(
    output: &mut csv::Writer<W>,
    item: &ItemConfig,
    bundle: &ItemBundle,
    opts: &ExportOptions,
) -> Result<usize, ExportError> {
    let mut writer = ItemWriter::new(output);
    for tx in &bundle.transactions {
        writer.write(project_transaction(item, tx, opts))?;
    }
    for inv in bundle
        .investments
        .iter()
        .filter(|inv| inv.is_cash_like() && !inv.is_stock_distribution())
    {
        writer.write(project_cash_investment(item, bundle, inv, opts))?;
    }
    let rows = writer.finish()?;
    debug!(item = %item.name, rows, "Wrote transaction rows");
    Ok(rows)
}

/// Writes security trades, every investment entry that is not cash-like.
pub fn write_investments<W: Write>(
    output: &mut csv::Writer<W>,
    item: &ItemConfig,
    bundle: &ItemBundle,
    opts: &ExportOptions,
) -> Result<usize, ExportError> {
    let mut writer = ItemWriter::new(output);
    for inv in bundle.investments.iter().filter(|inv| !inv.is_cash_like()) {
        writer.write(project_investment(item, bundle, inv, opts))?;
    }
    let rows = writer.finish()?;
    debug!(item = %item.name, rows, "Wrote investment rows");
    Ok(rows)
}
