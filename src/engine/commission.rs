//! Referral commission fan-out: walk at most three levels up the referrer
//! chain and cap every payout at the receiving upline's own plan price.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::RewardEngine;
use crate::repositories::{RewardStore, StoreError};

pub const MAX_LEVELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Task claim: override commission, `rabat_l1..3` rates.
    Task,
    /// Plan purchase: referral-upgrade commission, `affiliate_l1..3` rates.
    Purchase,
}

/// Percentage rates per upline level, snapshotted per event so a concurrent
/// settings change cannot split one fan-out across two rate sets.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RateTable {
    pub affiliate: [u32; MAX_LEVELS],
    pub rabat: [u32; MAX_LEVELS],
}

impl Default for RateTable {
    fn default() -> Self {
        RateTable {
            affiliate: [10, 5, 2],
            rabat: [10, 5, 2],
        }
    }
}

impl RateTable {
    /// Rate for 1-based level `level`.
    pub fn rate(&self, kind: EventKind, level: usize) -> u32 {
        let rates = match kind {
            EventKind::Task => &self.rabat,
            EventKind::Purchase => &self.affiliate,
        };
        rates.get(level - 1).copied().unwrap_or(0)
    }

    /// Overlays the settings collaborator's rows (`affiliate_l1..3`,
    /// `rabat_l1..3`) onto this table. Unparsable values are skipped.
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> RateTable {
        let mut table = self.clone();

        for level in 1..=MAX_LEVELS {
            if let Some(rate) = parse_override(overrides, "affiliate", level) {
                table.affiliate[level - 1] = rate;
            }
            if let Some(rate) = parse_override(overrides, "rabat", level) {
                table.rabat[level - 1] = rate;
            }
        }

        table
    }
}

fn parse_override(overrides: &HashMap<String, String>, prefix: &str, level: usize) -> Option<u32> {
    overrides
        .get(&format!("{prefix}_l{level}"))
        .and_then(|value| value.trim().parse().ok())
}

/// One resolved ancestor in the referrer chain. `plan_price` is the upline's
/// own active non-trial plan price; None means the level caps to zero.
#[derive(Clone, Debug)]
pub struct UplineLevel {
    pub user_id: String,
    pub plan_price: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommissionAward {
    pub user_id: String,
    /// 1-based upline level.
    pub level: usize,
    pub amount: i64,
}

/// Computes the capped awards for one triggering event. Zero-amount levels
/// are dropped but never stop the walk; output is ordered level 1 → 3.
pub fn plan_fanout(
    chain: &[UplineLevel],
    rates: &RateTable,
    base_amount: i64,
    kind: EventKind,
) -> Vec<CommissionAward> {
    chain
        .iter()
        .take(MAX_LEVELS)
        .enumerate()
        .filter_map(|(index, upline)| {
            let level = index + 1;
            // Widened so a large price times a large override rate cannot
            // wrap before the division.
            let raw = i128::from(base_amount) * i128::from(rates.rate(kind, level)) / 100;
            let cap = i128::from(upline.plan_price.unwrap_or(0));
            let amount = raw.min(cap) as i64;

            (amount > 0).then(|| CommissionAward {
                user_id: upline.user_id.clone(),
                level,
                amount,
            })
        })
        .collect()
}

impl<S: RewardStore> RewardEngine<S> {
    /// Resolves up to three upline levels by iteratively following
    /// `referrer_id`. The visited set is a belt-and-braces guard: the data
    /// model already rules out cycles.
    pub(crate) async fn upline_chain(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<UplineLevel>, StoreError> {
        let mut chain = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([user_id.to_owned()]);
        let mut cursor = self.store().referrer_of(user_id).await?;

        while let Some(id) = cursor {
            if chain.len() == MAX_LEVELS || !seen.insert(id.clone()) {
                break;
            }

            let plan_price = match self.resolve_plan(&id, now).await? {
                Some(plan) if !plan.trial => Some(plan.price),
                _ => None,
            };

            cursor = self.store().referrer_of(&id).await?;
            chain.push(UplineLevel {
                user_id: id,
                plan_price,
            });
        }

        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upline(user_id: &str, plan_price: Option<i64>) -> UplineLevel {
        UplineLevel {
            user_id: user_id.to_owned(),
            plan_price,
        }
    }

    #[test]
    fn default_rates_pay_three_levels() {
        let chain = vec![
            upline("l1", Some(100_000)),
            upline("l2", Some(100_000)),
            upline("l3", Some(100_000)),
        ];
        let awards = plan_fanout(&chain, &RateTable::default(), 10_000, EventKind::Task);

        assert_eq!(awards.len(), 3);
        assert_eq!(awards[0].amount, 1_000);
        assert_eq!(awards[1].amount, 500);
        assert_eq!(awards[2].amount, 200);
        assert_eq!(awards[2].level, 3);
    }

    #[test]
    fn award_is_capped_at_the_upline_plan_price() {
        let chain = vec![upline("l1", Some(300))];
        let awards = plan_fanout(&chain, &RateTable::default(), 5_000, EventKind::Task);

        assert_eq!(awards, vec![CommissionAward { user_id: "l1".into(), level: 1, amount: 300 }]);
    }

    #[test]
    fn plan_less_upline_is_skipped_but_the_walk_continues() {
        let chain = vec![upline("l1", None), upline("l2", Some(50_000))];
        let awards = plan_fanout(&chain, &RateTable::default(), 10_000, EventKind::Task);

        assert_eq!(awards.len(), 1);
        assert_eq!(awards[0].user_id, "l2");
        assert_eq!(awards[0].level, 2);
        assert_eq!(awards[0].amount, 500);
    }

    #[test]
    fn chain_longer_than_three_levels_is_truncated() {
        let chain: Vec<UplineLevel> = (1..=5)
            .map(|i| upline(&format!("l{i}"), Some(100_000)))
            .collect();
        let awards = plan_fanout(&chain, &RateTable::default(), 10_000, EventKind::Task);

        assert_eq!(awards.len(), 3);
        assert!(awards.iter().all(|a| a.level <= MAX_LEVELS));
    }

    #[test]
    fn event_kind_selects_the_rate_set() {
        let rates = RateTable {
            affiliate: [20, 0, 0],
            rabat: [10, 0, 0],
        };
        let chain = vec![upline("l1", Some(100_000))];

        let task = plan_fanout(&chain, &rates, 10_000, EventKind::Task);
        let purchase = plan_fanout(&chain, &rates, 10_000, EventKind::Purchase);

        assert_eq!(task[0].amount, 1_000);
        assert_eq!(purchase[0].amount, 2_000);
    }

    #[test]
    fn integer_rate_math_truncates() {
        let chain = vec![upline("l1", Some(100_000))];
        let awards = plan_fanout(&chain, &RateTable::default(), 55, EventKind::Task);

        // 55 * 10 / 100 = 5 (truncated from 5.5)
        assert_eq!(awards[0].amount, 5);
    }

    #[test]
    fn huge_price_and_rate_do_not_wrap() {
        let rates = RateTable {
            affiliate: [u32::MAX, 0, 0],
            rabat: [10, 5, 2],
        };
        let chain = vec![upline("l1", Some(i64::MAX))];
        let awards = plan_fanout(&chain, &rates, i64::MAX, EventKind::Purchase);

        // The raw product is far beyond i64; the award lands on the cap.
        assert_eq!(awards.len(), 1);
        assert_eq!(awards[0].amount, i64::MAX);
    }

    #[test]
    fn zero_base_produces_no_awards() {
        let chain = vec![upline("l1", Some(100_000))];
        assert!(plan_fanout(&chain, &RateTable::default(), 0, EventKind::Task).is_empty());
    }

    #[test]
    fn overrides_replace_configured_defaults() {
        let overrides: HashMap<String, String> = [
            ("rabat_l1".to_owned(), "15".to_owned()),
            ("affiliate_l3".to_owned(), "7".to_owned()),
            ("rabat_l2".to_owned(), "garbage".to_owned()),
        ]
        .into();

        let table = RateTable::default().with_overrides(&overrides);

        assert_eq!(table.rabat, [15, 5, 2]);
        assert_eq!(table.affiliate, [10, 5, 7]);
    }
}
