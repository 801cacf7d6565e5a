//! Task claims: Requested → Validated → Committed | Rejected. Steps 1–4 are
//! pure validation with no side effects; the commit is one atomic batch.

use chrono::Utc;
use serde::Serialize;

use super::commission::{plan_fanout, EventKind};
use super::{EngineError, RewardEngine};
use crate::models::jobs::TaskCompletion;
use crate::models::transactions::{LedgerEntry, TxKind, TxStatus};
use crate::repositories::{QuotaGuard, RewardStore, StoreError, WriteBatch, WriteOp};

#[derive(Clone, Debug, Serialize)]
pub struct ClaimReceipt {
    pub reward: i64,
}

impl<S: RewardStore> RewardEngine<S> {
    pub async fn claim_task(&self, user_id: &str, job_id: &str) -> Result<ClaimReceipt, EngineError> {
        let now = Utc::now();

        self.require_user(user_id).await?;

        let plan = self
            .resolve_plan(user_id, now)
            .await?
            .ok_or(EngineError::NoActivePlan)?;

        let period_start = self.clock().period_start(now);
        let quota = i64::from(plan.daily_quota);
        let done = self.store().completions_since(user_id, period_start).await?;
        if done >= quota {
            return Err(EngineError::QuotaExceeded);
        }

        let job = self
            .store()
            .job(job_id)
            .await?
            .ok_or(EngineError::InvalidJob)?;
        if job.min_plan_level > plan.level {
            return Err(EngineError::InvalidJob);
        }

        if !self.allow_repeat_claims()
            && self
                .store()
                .job_completed_since(user_id, job_id, period_start)
                .await?
        {
            return Err(EngineError::AlreadyClaimed);
        }

        let reward = plan.commission_per_task;

        let mut batch = WriteBatch::new(user_id).guarded(QuotaGuard {
            user_id: user_id.to_owned(),
            since: period_start,
            limit: quota,
        });
        batch.push(WriteOp::InsertCompletion(TaskCompletion::new(
            user_id, job_id, reward, now,
        )));
        batch.push(WriteOp::InsertLedgerEntry(LedgerEntry::new(
            user_id,
            TxKind::Income,
            reward,
            TxStatus::Success,
            format!("Task reward: {}", job.title),
            now,
        )));

        // Trial activity never pays the upline.
        if !plan.trial {
            let rates = self.rate_table().await?;
            let chain = self.upline_chain(user_id, now).await?;

            for award in plan_fanout(&chain, &rates, reward, EventKind::Task) {
                batch.push(WriteOp::InsertLedgerEntry(LedgerEntry::new(
                    &award.user_id,
                    TxKind::Commission,
                    award.amount,
                    TxStatus::Success,
                    format!("Level {} task commission from {}", award.level, user_id),
                    now,
                )));
            }
        }

        match self.store().commit(batch).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(EngineError::QuotaExceeded),
            Err(err) => return Err(err.into()),
        }

        log::info!("User {user_id} claimed job {job_id} for {reward}");

        Ok(ClaimReceipt { reward })
    }

    pub async fn list_jobs(&self, user_id: &str) -> Result<crate::models::jobs::JobBoard, EngineError> {
        self.require_user(user_id).await?;

        let now = Utc::now();
        let level = self
            .resolve_plan(user_id, now)
            .await?
            .map(|plan| plan.level)
            .unwrap_or(0);

        let jobs = self.store().jobs_for_level(level).await?;
        let completed_job_ids = self
            .store()
            .completed_job_ids_since(user_id, self.clock().period_start(now))
            .await?;

        Ok(crate::models::jobs::JobBoard {
            jobs,
            completed_job_ids,
        })
    }
}
