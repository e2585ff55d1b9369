//! Provider abstraction for the four remote activity operations.

use crate::core::activity::{
    InvestmentTransaction, ItemStatus, ProviderApiError, Security, Stream, Transaction,
};
use crate::core::config::ItemConfig;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("bad response from {endpoint}: {status}")]
    Status { endpoint: String, status: String },
    #[error("response error from {endpoint}: {error}")]
    Api {
        endpoint: String,
        error: ProviderApiError,
    },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
}

/// One page request of a paginated stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub offset: usize,
    pub count: usize,
    pub account_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionsPage {
    /// Item identifier as reported by the provider.
    pub item_id: String,
    pub transactions: Vec<Transaction>,
    /// Total records available for the query, not for this page.
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InvestmentsPage {
    pub item_id: String,
    pub investment_transactions: Vec<InvestmentTransaction>,
    pub securities: Vec<Security>,
    pub total: usize,
}

#[async_trait]
pub trait ActivityProvider: Send + Sync {
    async fn item_status(&self, item: &ItemConfig) -> Result<ItemStatus, ProviderError>;

    async fn refresh(&self, item: &ItemConfig, stream: Stream) -> Result<(), ProviderError>;

    async fn transactions_page(
        &self,
        item: &ItemConfig,
        query: &PageQuery,
    ) -> Result<TransactionsPage, ProviderError>;

    async fn investments_page(
        &self,
        item: &ItemConfig,
        query: &PageQuery,
    ) -> Result<InvestmentsPage, ProviderError>;
}
