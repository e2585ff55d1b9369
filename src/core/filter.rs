//! Per-item filtering, semimonthly clamping and ordering of a bundle.

use crate::core::activity::ItemBundle;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use tracing::debug;

pub fn omit_pending(bundle: &mut ItemBundle) {
    let before = bundle.transactions.len();
    bundle.transactions.retain(|tx| !tx.pending);
    debug!(
        omitted = before - bundle.transactions.len(),
        "Omitted pending transactions"
    );
}

/// Last instant of the semimonthly period that `end` closes.
///
/// An end before the 15th clamps to the end of the previous month, otherwise
/// to the end of the 15th.
pub fn clamp_boundary(end: NaiveDate) -> NaiveDateTime {
    let first_of_month = end - Days::new(u64::from(end.day0()));
    let cutoff = if end.day() < 15 {
        first_of_month
    } else {
        first_of_month + Days::new(15)
    };
    cutoff.and_time(NaiveTime::MIN) - TimeDelta::nanoseconds(1)
}

/// Keeps records dated within `[start, clamp_boundary(end)]`. Transactions
/// are dated by their authorized date when present.
pub fn clamp_semimonthly(bundle: &mut ItemBundle, start: NaiveDate, end: NaiveDate) {
    let boundary = clamp_boundary(end);
    let start = start.and_time(NaiveTime::MIN);
    let within = |date: NaiveDate| {
        let at = date.and_time(NaiveTime::MIN);
        start <= at && at <= boundary
    };

    let (transactions, investments) = (bundle.transactions.len(), bundle.investments.len());
    bundle.transactions.retain(|tx| within(tx.effective_date()));
    bundle.investments.retain(|inv| within(inv.date));
    debug!(
        %boundary,
        transactions_dropped = transactions - bundle.transactions.len(),
        investments_dropped = investments - bundle.investments.len(),
        "Clamped to semimonthly period"
    );
}

/// Stable ascending sort of both lists by date.
pub fn sort_by_date(bundle: &mut ItemBundle) {
    bundle.transactions.sort_by_key(|tx| tx.date);
    bundle.investments.sort_by_key(|inv| inv.date);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activity::{InvestmentTransaction, Transaction};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(
        id: &str,
        posted: NaiveDate,
        authorized: Option<NaiveDate>,
        pending: bool,
    ) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: posted,
            authorized_date: authorized,
            pending,
            ..Default::default()
        }
    }

    fn inv(id: &str, on: NaiveDate) -> InvestmentTransaction {
        InvestmentTransaction {
            id: id.to_string(),
            date: on,
            ..Default::default()
        }
    }

    fn ids(bundle: &ItemBundle) -> Vec<&str> {
        bundle.transactions.iter().map(|t| t.id.as_str()).collect()
    }

    fn sample_bundle() -> ItemBundle {
        let mut bundle = ItemBundle::new("item-1");
        bundle.transactions = vec![
            tx("d", date(2024, 3, 9), None, false),
            tx("a", date(2024, 3, 2), None, true),
            tx("c", date(2024, 3, 9), None, true),
            tx("b", date(2024, 3, 5), None, false),
            tx("e", date(2024, 3, 2), None, false),
        ];
        bundle
    }

    #[test]
    fn test_clamp_boundary_before_the_15th() {
        let boundary = clamp_boundary(date(2024, 3, 10));
        assert_eq!(boundary.to_string(), "2024-02-29 23:59:59.999999999");
    }

    #[test]
    fn test_clamp_boundary_from_the_15th() {
        assert_eq!(
            clamp_boundary(date(2024, 3, 20)).to_string(),
            "2024-03-15 23:59:59.999999999"
        );
        assert_eq!(
            clamp_boundary(date(2024, 3, 15)).to_string(),
            "2024-03-15 23:59:59.999999999"
        );
        assert_eq!(
            clamp_boundary(date(2024, 1, 14)).to_string(),
            "2023-12-31 23:59:59.999999999"
        );
    }

    #[test]
    fn test_clamp_uses_post_date_without_authorized_date() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.transactions = vec![
            tx("early", date(2024, 3, 5), None, false),
            tx("late", date(2024, 3, 12), None, false),
        ];

        clamp_semimonthly(&mut bundle, date(2024, 3, 1), date(2024, 3, 20));
        assert_eq!(ids(&bundle), vec!["early", "late"]);

        clamp_semimonthly(&mut bundle, date(2024, 3, 1), date(2024, 3, 10));
        assert!(bundle.transactions.is_empty());
    }

    #[test]
    fn test_clamp_end_of_month_keeps_first_half() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.transactions = vec![
            tx("kept", date(2024, 3, 5), None, false),
            tx("excluded", date(2024, 3, 16), None, false),
        ];
        clamp_semimonthly(&mut bundle, date(2024, 3, 1), date(2024, 3, 31));
        assert_eq!(ids(&bundle), vec!["kept"]);
    }

    #[test]
    fn test_clamp_prefers_authorized_date() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.transactions = vec![
            // Posted after the boundary but authorized before it.
            tx("authorized-early", date(2024, 3, 17), Some(date(2024, 3, 14)), false),
            // Posted inside the window but authorized before start.
            tx("authorized-before-start", date(2024, 3, 2), Some(date(2024, 2, 28)), false),
        ];

        clamp_semimonthly(&mut bundle, date(2024, 3, 1), date(2024, 3, 20));
        assert_eq!(ids(&bundle), vec!["authorized-early"]);
    }

    #[test]
    fn test_clamp_investments_by_date() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.investments = vec![
            inv("before-start", date(2024, 2, 29)),
            inv("start", date(2024, 3, 1)),
            inv("fifteenth", date(2024, 3, 15)),
            inv("sixteenth", date(2024, 3, 16)),
        ];

        clamp_semimonthly(&mut bundle, date(2024, 3, 1), date(2024, 3, 20));
        let kept: Vec<_> = bundle.investments.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(kept, vec!["start", "fifteenth"]);
    }

    #[test]
    fn test_omit_pending_leaves_investments() {
        let mut bundle = sample_bundle();
        bundle.investments = vec![inv("inv", date(2024, 3, 2))];

        omit_pending(&mut bundle);
        assert_eq!(ids(&bundle), vec!["d", "b", "e"]);
        assert_eq!(bundle.investments.len(), 1);
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut bundle = sample_bundle();
        sort_by_date(&mut bundle);
        assert_eq!(ids(&bundle), vec!["a", "e", "b", "d", "c"]);

        let once: Vec<String> = ids(&bundle).into_iter().map(String::from).collect();
        sort_by_date(&mut bundle);
        assert_eq!(ids(&bundle), once);
    }

    #[test]
    fn test_omit_pending_is_idempotent_and_commutes_with_sort() {
        let mut filter_then_sort = sample_bundle();
        omit_pending(&mut filter_then_sort);
        let filtered_once = ids(&filter_then_sort).len();
        omit_pending(&mut filter_then_sort);
        assert_eq!(ids(&filter_then_sort).len(), filtered_once);
        sort_by_date(&mut filter_then_sort);

        let mut sort_then_filter = sample_bundle();
        sort_by_date(&mut sort_then_filter);
        omit_pending(&mut sort_then_filter);

        assert_eq!(ids(&filter_then_sort), ids(&sort_then_filter));
        assert_eq!(ids(&sort_then_filter), vec!["e", "b", "d"]);
    }

    #[test]
    fn test_sort_investments_independently() {
        let mut bundle = ItemBundle::new("item-1");
        bundle.investments = vec![
            inv("second", date(2024, 3, 4)),
            inv("first", date(2024, 3, 1)),
            inv("second-tie", date(2024, 3, 4)),
        ];
        sort_by_date(&mut bundle);
        let sorted: Vec<_> = bundle.investments.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(sorted, vec!["first", "second", "second-tie"]);
    }
}
