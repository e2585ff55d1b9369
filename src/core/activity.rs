//! Activity records decoded from the provider and the per-item working set.

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt::Display;

/// Wire format of every date the provider reports.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One of the two data feeds of an item. Staleness, refresh and pagination
/// are all tracked per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Transactions,
    Investments,
}

impl Stream {
    pub fn refresh_endpoint(&self) -> &'static str {
        match self {
            Stream::Transactions => "transactions/refresh",
            Stream::Investments => "investments/refresh",
        }
    }
}

impl Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Stream::Transactions => "transactions",
                Stream::Investments => "investments",
            }
        )
    }
}

/// A single cash-account event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transaction {
    #[serde(rename = "transaction_id")]
    pub id: String,
    pub account_id: String,
    pub amount: f64,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub check_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: Vec<String>,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "optional_date")]
    pub authorized_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub pending: bool,
    pub pending_transaction_id: Option<String>,
    pub transaction_type: Option<String>,
    pub payment_channel: Option<String>,
    pub original_description: Option<String>,
}

impl Transaction {
    /// Authorized date when the provider reports one, else the post date.
    pub fn effective_date(&self) -> NaiveDate {
        self.authorized_date.unwrap_or(self.date)
    }

    pub fn payee(&self) -> &str {
        match self.merchant_name.as_deref() {
            Some(merchant) if !merchant.is_empty() => merchant,
            _ => &self.name,
        }
    }

    pub fn currency(&self) -> &str {
        preferred_currency(&self.iso_currency_code, &self.unofficial_currency_code)
    }
}

/// A brokerage event. `kind`/`subtype` carry the provider's type pair, e.g.
/// `cash`/`dividend` or `buy`/`buy`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InvestmentTransaction {
    #[serde(rename = "investment_transaction_id")]
    pub id: String,
    pub account_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub security_id: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: f64,
    pub amount: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fees: f64,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtype: String,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
}

impl InvestmentTransaction {
    /// Entries that move money rather than securities.
    pub fn is_cash_like(&self) -> bool {
        self.kind == "cash" || self.kind == "fee"
    }

    /// The only cash subtype that carries no monetary value.
    pub fn is_stock_distribution(&self) -> bool {
        self.subtype == "stock distribution"
    }

    pub fn currency(&self) -> &str {
        preferred_currency(&self.iso_currency_code, &self.unofficial_currency_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Security {
    #[serde(rename = "security_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ticker_symbol: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sector: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub industry: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub isin: Option<String>,
    pub cusip: Option<String>,
    pub close_price: Option<f64>,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
}

impl Security {
    /// `sector.industry`, or `unknown` when the provider reports neither.
    pub fn category(&self) -> String {
        if self.sector.is_empty() && self.industry.is_empty() {
            return "unknown".to_string();
        }
        format!("{}.{}", self.sector, self.industry)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamStatus {
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub last_successful_update: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub last_failed_update: Option<DateTime<Utc>>,
}

/// Per-stream update timestamps of an item. `None` means the stream never
/// synced successfully.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub transactions: StreamStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub investments: StreamStatus,
}

impl ItemStatus {
    pub fn stream(&self, stream: Stream) -> &StreamStatus {
        match stream {
            Stream::Transactions => &self.transactions,
            Stream::Investments => &self.investments,
        }
    }
}

/// Error object the provider embeds in otherwise successful responses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderApiError {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_message: String,
}

impl ProviderApiError {
    pub fn is_populated(&self) -> bool {
        !self.error_type.is_empty()
    }
}

impl Display for ProviderApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.error_type, self.error_code, self.error_message
        )?;
        if !self.display_message.is_empty() {
            write!(f, " ({})", self.display_message)?;
        }
        Ok(())
    }
}

/// Requested date range. `end` is exclusive of the end-of-day instant unless
/// extended with [`DateRange::with_inclusive_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            bail!("Start date {start} is after end date {end}");
        }
        Ok(Self { start, end })
    }

    pub fn with_inclusive_end(self) -> Self {
        Self {
            start: self.start,
            end: self.end + Days::new(1),
        }
    }
}

/// Everything fetched for one item during a run.
#[derive(Debug, Clone, Default)]
pub struct ItemBundle {
    pub item_id: String,
    pub transactions: Vec<Transaction>,
    pub investments: Vec<InvestmentTransaction>,
    pub securities: HashMap<String, Security>,
}

impl ItemBundle {
    pub fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            ..Default::default()
        }
    }
}

fn preferred_currency<'a>(iso: &'a Option<String>, unofficial: &'a Option<String>) -> &'a str {
    match (iso.as_deref(), unofficial.as_deref()) {
        (Some(code), _) if !code.is_empty() => code,
        (_, Some(code)) => code,
        _ => "",
    }
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

// Zero-value timestamps (year 1) are reported for streams that never synced.
fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => {
            let ts = DateTime::parse_from_rfc3339(&s)
                .map_err(serde::de::Error::custom)?
                .with_timezone(&Utc);
            Ok((ts.year() > 1).then_some(ts))
        }
        _ => Ok(None),
    }
}
