//! In-memory store backing the test-suite. Single mutex, so every commit is
//! serialized the way the Postgres adapter serializes per user.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BalanceGuard, QuotaGuard, RewardStore, StoreError, WriteBatch, WriteOp};
use crate::engine::balance;
use crate::models::{
    jobs::{Job, TaskCompletion},
    plans::Plan,
    subscriptions::{self, Subscription},
    transactions::LedgerEntry,
    users::User,
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    plans: Vec<Plan>,
    subscriptions: Vec<Subscription>,
    ledger: Vec<LedgerEntry>,
    jobs: Vec<Job>,
    completions: Vec<TaskCompletion>,
    settings: HashMap<String, String>,
    /// When set, commits carrying at least this many ops fail before
    /// anything is applied. Simulates a mid-batch storage fault.
    fail_ops_at_least: Option<usize>,
    /// Added to every `balance` read. Simulates a stale read racing a
    /// concurrent debit; commit-time guards always see the real ledger.
    balance_skew: i64,
    /// Added to every `completions_since` count, same idea.
    completion_skew: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn seed_user(&self, user: User) {
        self.inner.lock().await.users.push(user);
    }

    pub async fn seed_plan(&self, plan: Plan) {
        self.inner.lock().await.plans.push(plan);
    }

    pub async fn seed_subscription(&self, subscription: Subscription) {
        self.inner.lock().await.subscriptions.push(subscription);
    }

    pub async fn seed_job(&self, job: Job) {
        self.inner.lock().await.jobs.push(job);
    }

    pub async fn seed_setting(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .await
            .settings
            .insert(key.to_owned(), value.to_owned());
    }

    pub async fn inject_commit_fault(&self, ops_at_least: usize) {
        self.inner.lock().await.fail_ops_at_least = Some(ops_at_least);
    }

    pub async fn clear_commit_fault(&self) {
        self.inner.lock().await.fail_ops_at_least = None;
    }

    pub async fn skew_balance_reads(&self, delta: i64) {
        self.inner.lock().await.balance_skew = delta;
    }

    pub async fn skew_completion_reads(&self, delta: i64) {
        self.inner.lock().await.completion_skew = delta;
    }

    /// Stands in for the external approval collaborator flipping a pending
    /// deposit/withdrawal to success/failed.
    pub async fn set_entry_status(&self, entry_id: &str, status: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.ledger.iter_mut().find(|e| e.id == entry_id) {
            entry.status = status.to_owned();
        }
    }

    pub async fn ledger_of(&self, user_id: &str) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn completions_of(&self, user_id: &str) -> Vec<TaskCompletion> {
        self.inner
            .lock()
            .await
            .completions
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn subscriptions_of(&self, user_id: &str) -> Vec<Subscription> {
        self.inner
            .lock()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn check_guard(inner: &Inner, guard: &QuotaGuard) -> Result<(), StoreError> {
    let count = inner
        .completions
        .iter()
        .filter(|c| c.user_id == guard.user_id && c.completed_at >= guard.since)
        .count() as i64;

    if count >= guard.limit {
        return Err(StoreError::Conflict("daily quota exhausted".into()));
    }

    Ok(())
}

fn check_funds_guard(inner: &Inner, guard: &BalanceGuard) -> Result<(), StoreError> {
    let balance: i64 = inner
        .ledger
        .iter()
        .filter(|e| e.user_id == guard.user_id)
        .map(balance::signed_amount)
        .sum();

    if balance < guard.required {
        return Err(StoreError::Conflict("insufficient balance".into()));
    }

    Ok(())
}

#[async_trait]
impl RewardStore for MemoryStore {
    async fn user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.referral_code == code)
            .cloned())
    }

    async fn referrer_of(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.id == user_id)
            .and_then(|u| u.referrer_id.clone()))
    }

    async fn plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.plans.iter().find(|p| p.id == plan_id).cloned())
    }

    async fn active_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Subscription, Plan)>, StoreError> {
        let inner = self.inner.lock().await;

        let subscription = inner
            .subscriptions
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.status == subscriptions::STATUS_ACTIVE
                    && s.end_date > now
            })
            .max_by_key(|s| s.end_date)
            .cloned();

        let Some(subscription) = subscription else {
            return Ok(None);
        };

        let plan = inner
            .plans
            .iter()
            .find(|p| p.id == subscription.plan_id)
            .cloned()
            .ok_or_else(|| StoreError::Backend("subscription references missing plan".into()))?;

        Ok(Some((subscription, plan)))
    }

    async fn active_direct_referrals(
        &self,
        user_id: &str,
        trial_plan_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;

        let count = inner
            .users
            .iter()
            .filter(|u| u.referrer_id.as_deref() == Some(user_id))
            .filter(|u| {
                inner.subscriptions.iter().any(|s| {
                    s.user_id == u.id
                        && s.status == subscriptions::STATUS_ACTIVE
                        && s.end_date > now
                        && s.plan_id != trial_plan_id
                })
            })
            .count();

        Ok(count as i64)
    }

    async fn balance(&self, user_id: &str) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        let balance: i64 = inner
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(balance::signed_amount)
            .sum();

        Ok(balance + inner.balance_skew)
    }

    async fn income_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.kind == "income"
                    && e.status == "success"
                    && e.created_at >= since
            })
            .map(|e| e.amount)
            .sum())
    }

    async fn job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn jobs_for_level(&self, level: i32) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .iter()
            .filter(|j| j.min_plan_level <= level)
            .cloned()
            .collect())
    }

    async fn completions_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        let count = inner
            .completions
            .iter()
            .filter(|c| c.user_id == user_id && c.completed_at >= since)
            .count() as i64;

        Ok((count + inner.completion_skew).max(0))
    }

    async fn job_completed_since(
        &self,
        user_id: &str,
        job_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.completions.iter().any(|c| {
            c.user_id == user_id && c.job_id == job_id && c.completed_at >= since
        }))
    }

    async fn completed_job_ids_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = inner
            .completions
            .iter()
            .filter(|c| c.user_id == user_id && c.completed_at >= since)
            .map(|c| c.job_id.clone())
            .collect();

        ids.sort();
        ids.dedup();

        Ok(ids)
    }

    async fn settings(&self) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.settings.clone())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        // Fail-fast checks first so a refused batch leaves no trace.
        if let Some(threshold) = inner.fail_ops_at_least {
            if batch.ops().len() >= threshold {
                return Err(StoreError::Backend("injected storage fault".into()));
            }
        }

        if let Some(guard) = batch.guard() {
            check_guard(&inner, guard)?;
        }

        if let Some(guard) = batch.funds_guard() {
            check_funds_guard(&inner, guard)?;
        }

        for op in batch.ops() {
            match op {
                WriteOp::InsertUser(user) => inner.users.push(user.clone()),
                WriteOp::InsertSubscription(sub) => inner.subscriptions.push(sub.clone()),
                WriteOp::ExpireActiveSubscriptions { user_id } => {
                    for sub in inner
                        .subscriptions
                        .iter_mut()
                        .filter(|s| s.user_id == *user_id)
                    {
                        if sub.status == subscriptions::STATUS_ACTIVE {
                            sub.status = subscriptions::STATUS_EXPIRED.to_owned();
                        }
                    }
                }
                WriteOp::InsertLedgerEntry(entry) => inner.ledger.push(entry.clone()),
                WriteOp::InsertCompletion(completion) => {
                    inner.completions.push(completion.clone())
                }
            }
        }

        Ok(())
    }
}
