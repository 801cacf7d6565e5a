//! Plan purchases: deduct the price, swap the active subscription and fan
//! out the affiliate commission, all in one batch.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::commission::{plan_fanout, EventKind};
use super::{new_subscription, EngineError, RewardEngine};
use crate::models::transactions::{LedgerEntry, TxKind, TxStatus};
use crate::repositories::{BalanceGuard, RewardStore, StoreError, WriteBatch, WriteOp};

#[derive(Clone, Debug, Serialize)]
pub struct PurchaseReceipt {
    pub plan_id: String,
    pub end_date: DateTime<Utc>,
}

impl<S: RewardStore> RewardEngine<S> {
    pub async fn purchase_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<PurchaseReceipt, EngineError> {
        let now = Utc::now();

        self.require_user(user_id).await?;

        let plan = self
            .store()
            .plan(plan_id)
            .await?
            .filter(|plan| plan.is_active)
            .ok_or(EngineError::InvalidPlan)?;

        if plan.id == self.trial_plan_id() {
            return Err(EngineError::Validation(
                "the trial plan cannot be purchased".into(),
            ));
        }

        // Advisory; the batch's funds guard repeats this under the per-user
        // lock so a racing debit cannot slip between check and commit.
        let balance = self.store().balance(user_id).await?;
        if balance < plan.price {
            return Err(EngineError::InsufficientBalance);
        }

        if plan.min_direct_referrals > 0 {
            let active = self
                .store()
                .active_direct_referrals(user_id, self.trial_plan_id(), now)
                .await?;
            if active < i64::from(plan.min_direct_referrals) {
                return Err(EngineError::ReferralRequirementNotMet);
            }
        }

        let end_date = now + Duration::days(i64::from(plan.duration_days));

        let mut batch = WriteBatch::new(user_id).funded(BalanceGuard {
            user_id: user_id.to_owned(),
            required: plan.price,
        });
        batch.push(WriteOp::InsertLedgerEntry(LedgerEntry::new(
            user_id,
            TxKind::Expense,
            plan.price,
            TxStatus::Success,
            format!("Plan purchase: {}", plan.name),
            now,
        )));
        batch.push(WriteOp::ExpireActiveSubscriptions {
            user_id: user_id.to_owned(),
        });
        batch.push(WriteOp::InsertSubscription(new_subscription(
            user_id, &plan, now, end_date,
        )));

        let rates = self.rate_table().await?;
        let chain = self.upline_chain(user_id, now).await?;
        for award in plan_fanout(&chain, &rates, plan.price, EventKind::Purchase) {
            batch.push(WriteOp::InsertLedgerEntry(LedgerEntry::new(
                &award.user_id,
                TxKind::Commission,
                award.amount,
                TxStatus::Success,
                format!("Level {} affiliate commission from {}", award.level, user_id),
                now,
            )));
        }

        match self.store().commit(batch).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(EngineError::InsufficientBalance),
            Err(err) => return Err(err.into()),
        }

        log::info!(
            "User {user_id} purchased plan {} for {}",
            plan.name,
            plan.price
        );

        Ok(PurchaseReceipt {
            plan_id: plan.id,
            end_date,
        })
    }
}
