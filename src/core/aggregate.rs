//! Assembles the per-item bundle from every page of both streams.

use crate::core::activity::{DateRange, ItemBundle};
use crate::core::config::ItemConfig;
use crate::core::pagination::{fetch_investments, fetch_transactions};
use crate::core::provider::{ActivityProvider, InvestmentsPage, TransactionsPage};
use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

impl ItemBundle {
    pub fn absorb_transactions(&mut self, page: TransactionsPage) {
        self.adopt_item_id(page.item_id);
        self.transactions.extend(page.transactions);
    }

    /// Later pages overwrite securities already known under the same ID.
    pub fn absorb_investments(&mut self, page: InvestmentsPage) {
        self.adopt_item_id(page.item_id);
        self.investments.extend(page.investment_transactions);
        for security in page.securities {
            self.securities.insert(security.id.clone(), security);
        }
    }

    fn adopt_item_id(&mut self, reported: String) {
        if reported.is_empty() || reported == self.item_id {
            return;
        }
        warn!(
            configured = %self.item_id,
            reported = %reported,
            "Provider reported a different item ID"
        );
        self.item_id = reported;
    }
}

/// Fetches both streams of one item. The bundle carries the item ID reported
/// by the provider, falling back to `item_id` when nothing was requested.
#[instrument(name = "RequestItemActivity", skip_all, fields(item = %item_id))]
pub async fn request_item_activity(
    provider: &dyn ActivityProvider,
    item_id: &str,
    item: &ItemConfig,
    range: &DateRange,
) -> Result<ItemBundle> {
    let mut bundle = ItemBundle::new(item_id);

    let pages = fetch_transactions(provider, item, range)
        .await
        .with_context(|| format!("request item {item_id:?} transactions"))?;
    for page in pages {
        bundle.absorb_transactions(page);
    }

    let pages = fetch_investments(provider, item, range)
        .await
        .with_context(|| format!("request item {item_id:?} investments"))?;
    for page in pages {
        bundle.absorb_investments(page);
    }

    debug!(
        transactions = bundle.transactions.len(),
        investments = bundle.investments.len(),
        securities = bundle.securities.len(),
        "Aggregated item activity"
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activity::{InvestmentTransaction, Security, Transaction};

    fn security(id: &str, name: &str) -> Security {
        Security {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn tx(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pages_concatenate_in_order() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.absorb_transactions(TransactionsPage {
            item_id: "item-1".to_string(),
            transactions: vec![tx("a"), tx("b")],
            total: 3,
        });
        bundle.absorb_transactions(TransactionsPage {
            item_id: "item-1".to_string(),
            transactions: vec![tx("c"), tx("a")],
            total: 3,
        });

        let ids: Vec<_> = bundle.transactions.iter().map(|t| t.id.as_str()).collect();
        // Duplicates across pages are kept as-is.
        assert_eq!(ids, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_securities_union_later_wins() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.absorb_investments(InvestmentsPage {
            item_id: "item-1".to_string(),
            investment_transactions: vec![InvestmentTransaction::default()],
            securities: vec![security("sec-1", "Old Name"), security("sec-2", "Bond")],
            total: 2,
        });
        bundle.absorb_investments(InvestmentsPage {
            item_id: "item-1".to_string(),
            investment_transactions: vec![InvestmentTransaction::default()],
            securities: vec![security("sec-1", "New Name"), security("sec-3", "ETF")],
            total: 2,
        });

        assert_eq!(bundle.investments.len(), 2);
        assert_eq!(bundle.securities.len(), 3);
        assert_eq!(bundle.securities["sec-1"].name, "New Name");
        assert_eq!(bundle.securities["sec-2"].name, "Bond");
    }

    #[test]
    fn test_reported_item_id_replaces_configured() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.absorb_transactions(TransactionsPage {
            item_id: "item-renamed".to_string(),
            ..Default::default()
        });
        assert_eq!(bundle.item_id, "item-renamed");

        bundle.absorb_transactions(TransactionsPage::default());
        assert_eq!(bundle.item_id, "item-renamed");
    }
}
