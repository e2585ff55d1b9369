//! Paginated retrieval of one stream of one item.

use crate::core::activity::DateRange;
use crate::core::config::ItemConfig;
use crate::core::provider::{
    ActivityProvider, InvestmentsPage, PageQuery, ProviderError, TransactionsPage,
};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::debug;

/// Largest page the provider serves.
pub const PAGE_SIZE: usize = 500;

pub trait Page {
    /// Records actually received in this page.
    fn record_count(&self) -> usize;
    /// Total the provider reports as available for the query.
    fn total(&self) -> usize;
}

impl Page for TransactionsPage {
    fn record_count(&self) -> usize {
        self.transactions.len()
    }

    fn total(&self) -> usize {
        self.total
    }
}

impl Page for InvestmentsPage {
    fn record_count(&self) -> usize {
        self.investment_transactions.len()
    }

    fn total(&self) -> usize {
        self.total
    }
}

/// Drives `fetch` from offset 0 until the provider signals no more pages.
///
/// Fetching continues while the last reported total is at least
/// [`PAGE_SIZE`]. The offset advances by the records actually received, and
/// an empty page ends the stream since the offset could not move.
pub async fn paginate<P, F, Fut>(mut fetch: F) -> Result<Vec<P>, ProviderError>
where
    P: Page,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<P, ProviderError>>,
{
    let mut pages = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch(offset).await?;
        let received = page.record_count();
        let total = page.total();
        debug!(offset, received, total, "Received page");

        offset += received;
        pages.push(page);

        if total < PAGE_SIZE || received == 0 {
            break;
        }
    }
    Ok(pages)
}

fn page_query(range: &DateRange, offset: usize, accounts: &BTreeMap<String, String>) -> PageQuery {
    PageQuery {
        start: range.start,
        end: range.end,
        offset,
        count: PAGE_SIZE,
        account_ids: accounts.keys().cloned().collect(),
    }
}

/// All transaction pages of an item. No request is made when the item has no
/// transaction accounts.
pub async fn fetch_transactions(
    provider: &dyn ActivityProvider,
    item: &ItemConfig,
    range: &DateRange,
) -> Result<Vec<TransactionsPage>, ProviderError> {
    if item.transactions.is_empty() {
        return Ok(Vec::new());
    }
    paginate(|offset| {
        let query = page_query(range, offset, &item.transactions);
        async move { provider.transactions_page(item, &query).await }
    })
    .await
}

/// All investment pages of an item. No request is made when the item has no
/// investment accounts.
pub async fn fetch_investments(
    provider: &dyn ActivityProvider,
    item: &ItemConfig,
    range: &DateRange,
) -> Result<Vec<InvestmentsPage>, ProviderError> {
    if item.investments.is_empty() {
        return Ok(Vec::new());
    }
    paginate(|offset| {
        let query = page_query(range, offset, &item.investments);
        async move { provider.investments_page(item, &query).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activity::{
        InvestmentTransaction, ItemStatus, ProviderApiError, Stream, Transaction,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves scripted `(records, total)` pages and records every query.
    struct MockPagedProvider {
        pages: Mutex<VecDeque<(usize, usize)>>,
        queries: Mutex<Vec<PageQuery>>,
        fail_at_call: Option<usize>,
    }

    impl MockPagedProvider {
        fn new(pages: &[(usize, usize)]) -> Self {
            MockPagedProvider {
                pages: Mutex::new(pages.iter().copied().collect()),
                queries: Mutex::new(Vec::new()),
                fail_at_call: None,
            }
        }

        fn offsets(&self) -> Vec<usize> {
            self.queries.lock().unwrap().iter().map(|q| q.offset).collect()
        }

        fn next(&self, query: &PageQuery) -> Result<(usize, usize), ProviderError> {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            if self.fail_at_call == Some(queries.len()) {
                return Err(ProviderError::Api {
                    endpoint: "transactions/get".to_string(),
                    error: ProviderApiError {
                        error_type: "RATE_LIMIT_EXCEEDED".to_string(),
                        error_code: "TRANSACTIONS_LIMIT".to_string(),
                        error_message: "rate limit exceeded".to_string(),
                        display_message: String::new(),
                    },
                });
            }
            Ok(self.pages.lock().unwrap().pop_front().unwrap_or((0, 0)))
        }
    }

    #[async_trait]
    impl ActivityProvider for MockPagedProvider {
        async fn item_status(&self, _item: &ItemConfig) -> Result<ItemStatus, ProviderError> {
            Ok(ItemStatus::default())
        }

        async fn refresh(&self, _item: &ItemConfig, _stream: Stream) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn transactions_page(
            &self,
            _item: &ItemConfig,
            query: &PageQuery,
        ) -> Result<TransactionsPage, ProviderError> {
            let (records, total) = self.next(query)?;
            Ok(TransactionsPage {
                item_id: "item-1".to_string(),
                transactions: (0..records)
                    .map(|i| Transaction {
                        id: format!("tx-{}", query.offset + i),
                        ..Default::default()
                    })
                    .collect(),
                total,
            })
        }

        async fn investments_page(
            &self,
            _item: &ItemConfig,
            query: &PageQuery,
        ) -> Result<InvestmentsPage, ProviderError> {
            let (records, total) = self.next(query)?;
            Ok(InvestmentsPage {
                item_id: "item-1".to_string(),
                investment_transactions: vec![InvestmentTransaction::default(); records],
                securities: Vec::new(),
                total,
            })
        }
    }

    fn item(transactions: &[&str], investments: &[&str]) -> ItemConfig {
        let accounts = |ids: &[&str]| -> BTreeMap<String, String> {
            ids.iter()
                .map(|id| (id.to_string(), format!("Account {id}")))
                .collect()
        };
        ItemConfig {
            name: "Bank".to_string(),
            token: "access-token".to_string(),
            transactions: accounts(transactions),
            investments: accounts(investments),
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_small_total_issues_single_request() {
        let provider = MockPagedProvider::new(&[(120, 120)]);
        let pages = fetch_transactions(&provider, &item(&["acc-1"], &[]), &range())
            .await
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(provider.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_full_page_total_requests_next_page() {
        let provider = MockPagedProvider::new(&[(500, 500), (0, 500)]);
        let pages = fetch_transactions(&provider, &item(&["acc-1"], &[]), &range())
            .await
            .unwrap();

        assert_eq!(provider.offsets(), vec![0, 500]);
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn test_offset_tracks_records_received_not_totals() {
        // Totals stay at 1200 on every page; offsets must follow records.
        let provider = MockPagedProvider::new(&[(500, 1200), (450, 1200), (250, 1200), (0, 1200)]);
        let pages = fetch_transactions(&provider, &item(&["acc-1"], &[]), &range())
            .await
            .unwrap();

        assert_eq!(provider.offsets(), vec![0, 500, 950, 1200]);
        let received: usize = pages.iter().map(|p| p.transactions.len()).sum();
        assert_eq!(received, 1200);
        assert_eq!(pages[1].transactions[0].id, "tx-500");
    }

    #[tokio::test]
    async fn test_total_just_below_page_size_stops() {
        let provider = MockPagedProvider::new(&[(499, 499)]);
        fetch_investments(&provider, &item(&[], &["inv-1"]), &range())
            .await
            .unwrap();
        assert_eq!(provider.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_empty_account_set_skips_stream() {
        let provider = MockPagedProvider::new(&[(10, 10)]);
        let config = item(&[], &[]);

        assert!(fetch_transactions(&provider, &config, &range()).await.unwrap().is_empty());
        assert!(fetch_investments(&provider, &config, &range()).await.unwrap().is_empty());
        assert!(provider.offsets().is_empty());
    }

    #[tokio::test]
    async fn test_query_carries_sorted_accounts_and_page_size() {
        let provider = MockPagedProvider::new(&[(1, 1)]);
        fetch_transactions(&provider, &item(&["acc-b", "acc-a"], &[]), &range())
            .await
            .unwrap();

        let queries = provider.queries.lock().unwrap();
        assert_eq!(queries[0].account_ids, vec!["acc-a", "acc-b"]);
        assert_eq!(queries[0].count, PAGE_SIZE);
        assert_eq!(queries[0].start, range().start);
        assert_eq!(queries[0].end, range().end);
    }

    #[tokio::test]
    async fn test_provider_error_on_later_page_propagates() {
        let mut provider = MockPagedProvider::new(&[(500, 900)]);
        provider.fail_at_call = Some(2);

        let err = fetch_transactions(&provider, &item(&["acc-1"], &[]), &range())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
        assert!(err.to_string().contains("RATE_LIMIT_EXCEEDED TRANSACTIONS_LIMIT"));
    }
}
