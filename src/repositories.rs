use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    jobs::{Job, TaskCompletion},
    plans::Plan,
    subscriptions::Subscription,
    transactions::LedgerEntry,
    users::User,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    /// An in-batch re-check failed after the per-user lock was taken. The
    /// triggering operation lost a race and nothing was written.
    #[error("write conflict: {0}")]
    Conflict(String),
}

/// Everything the batch may write. The whole batch commits atomically or not
/// at all; there is no partial application.
#[derive(Clone, Debug)]
pub enum WriteOp {
    InsertUser(User),
    InsertSubscription(Subscription),
    ExpireActiveSubscriptions { user_id: String },
    InsertLedgerEntry(LedgerEntry),
    InsertCompletion(TaskCompletion),
}

/// Re-checked inside the batch transaction, after the per-user lock is held.
/// Closes the read-then-write race between two concurrent claims.
#[derive(Clone, Debug)]
pub struct QuotaGuard {
    pub user_id: String,
    pub since: DateTime<Utc>,
    pub limit: i64,
}

/// Re-derives the balance inside the batch transaction, after the per-user
/// lock is held. Closes the read-then-write race between two concurrent
/// debits (withdrawal against withdrawal, purchase against withdrawal).
#[derive(Clone, Debug)]
pub struct BalanceGuard {
    pub user_id: String,
    /// Minimum available balance the batch requires at commit time.
    pub required: i64,
}

/// All writes belonging to one logical event (claim, purchase, registration,
/// deposit/withdrawal request).
#[derive(Clone, Debug)]
pub struct WriteBatch {
    user_id: String,
    guard: Option<QuotaGuard>,
    funds_guard: Option<BalanceGuard>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new(user_id: &str) -> Self {
        WriteBatch {
            user_id: user_id.to_owned(),
            guard: None,
            funds_guard: None,
            ops: Vec::new(),
        }
    }

    pub fn guarded(mut self, guard: QuotaGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn funded(mut self, guard: BalanceGuard) -> Self {
        self.funds_guard = Some(guard);
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn guard(&self) -> Option<&QuotaGuard> {
        self.guard.as_ref()
    }

    pub fn funds_guard(&self) -> Option<&BalanceGuard> {
        self.funds_guard.as_ref()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// Storage port of the engine. The Postgres adapter is the production
/// backend; the in-memory adapter backs the test-suite.
#[async_trait]
pub trait RewardStore: Send + Sync + 'static {
    async fn user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError>;

    async fn referrer_of(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    async fn plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError>;

    /// The user's subscription with `status = 'active' AND end_date > now`,
    /// joined with its plan.
    async fn active_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Subscription, Plan)>, StoreError>;

    /// Direct referrals currently holding an active subscription to any plan
    /// other than the trial plan.
    async fn active_direct_referrals(
        &self,
        user_id: &str,
        trial_plan_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Derived balance: the ledger projection of `engine::balance`.
    async fn balance(&self, user_id: &str) -> Result<i64, StoreError>;

    /// Sum of successful `income` entries since `since`.
    async fn income_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64, StoreError>;

    async fn job(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    async fn jobs_for_level(&self, level: i32) -> Result<Vec<Job>, StoreError>;

    async fn completions_since(&self, user_id: &str, since: DateTime<Utc>)
        -> Result<i64, StoreError>;

    async fn job_completed_since(
        &self,
        user_id: &str,
        job_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn completed_job_ids_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError>;

    /// Key-value rows maintained by the settings collaborator.
    async fn settings(&self) -> Result<HashMap<String, String>, StoreError>;

    /// Commit one logical event. All-or-nothing; a `Conflict` result means
    /// the guard re-check failed and nothing was persisted.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
