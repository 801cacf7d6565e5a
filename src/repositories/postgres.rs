use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{RewardStore, StoreError, WriteBatch, WriteOp};
use crate::models::{
    jobs::Job,
    plans::Plan,
    subscriptions::{self, Subscription},
    users::User,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

// Mirrors engine::balance::signed_amount. Keep the two in sync.
const BALANCE_SQL: &str = r#"SELECT COALESCE(SUM(CASE
    WHEN status = 'success'
         AND kind IN ('deposit', 'income', 'commission', 'bonus', 'admin_add')
        THEN amount
    WHEN status = 'success' AND kind IN ('expense', 'admin_deduct')
        THEN -amount
    WHEN kind = 'withdrawal' AND status IN ('pending', 'success')
        THEN -amount
    ELSE 0
END), 0)::BIGINT
FROM transactions WHERE user_id = $1"#;

#[derive(Clone)]
pub struct PgRewardStore {
    conn: PgPool,
}

impl PgRewardStore {
    pub fn new(conn: PgPool) -> Self {
        PgRewardStore { conn }
    }
}

#[async_trait]
impl RewardStore for PgRewardStore {
    async fn user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn referrer_of(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let referrer: Option<Option<String>> =
            sqlx::query_scalar("SELECT referrer_id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.conn)
                .await?;

        Ok(referrer.flatten())
    }

    async fn plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(plan)
    }

    async fn active_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Subscription, Plan)>, StoreError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"SELECT * FROM subscriptions
            WHERE user_id = $1 AND status = 'active' AND end_date > $2
            ORDER BY end_date DESC LIMIT 1"#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.conn)
        .await?;

        let Some(subscription) = subscription else {
            return Ok(None);
        };

        let plan = self
            .plan(&subscription.plan_id)
            .await?
            .ok_or_else(|| StoreError::Backend("subscription references missing plan".into()))?;

        Ok(Some((subscription, plan)))
    }

    async fn active_direct_referrals(
        &self,
        user_id: &str,
        trial_plan_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(DISTINCT u.id) FROM users u
            JOIN subscriptions s ON s.user_id = u.id
            WHERE u.referrer_id = $1
              AND s.status = 'active' AND s.end_date > $2
              AND s.plan_id <> $3"#,
        )
        .bind(user_id)
        .bind(now)
        .bind(trial_plan_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(count)
    }

    async fn balance(&self, user_id: &str) -> Result<i64, StoreError> {
        let balance: i64 = sqlx::query_scalar(BALANCE_SQL)
            .bind(user_id)
            .fetch_one(&self.conn)
            .await?;

        Ok(balance)
    }

    async fn income_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let income: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transactions
            WHERE user_id = $1 AND kind = 'income' AND status = 'success'
              AND created_at >= $2"#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.conn)
        .await?;

        Ok(income)
    }

    async fn job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(job)
    }

    async fn jobs_for_level(&self, level: i32) -> Result<Vec<Job>, StoreError> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE min_plan_level <= $1 ORDER BY created_at DESC",
        )
        .bind(level)
        .fetch_all(&self.conn)
        .await?;

        Ok(jobs)
    }

    async fn completions_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_completions WHERE user_id = $1 AND completed_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.conn)
        .await?;

        Ok(count)
    }

    async fn job_completed_since(
        &self,
        user_id: &str,
        job_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM task_completions
            WHERE user_id = $1 AND job_id = $2 AND completed_at >= $3"#,
        )
        .bind(user_id)
        .bind(job_id)
        .bind(since)
        .fetch_one(&self.conn)
        .await?;

        Ok(count > 0)
    }

    async fn completed_job_ids_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT DISTINCT job_id FROM task_completions
            WHERE user_id = $1 AND completed_at >= $2"#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.conn)
        .await?;

        Ok(ids)
    }

    async fn settings(&self) -> Result<HashMap<String, String>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings")
                .fetch_all(&self.conn)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.conn.begin().await?;

        // Serialize events per user before re-checking the quota guard.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(batch.user_id())
            .execute(&mut *tx)
            .await?;

        if let Some(guard) = batch.guard() {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM task_completions WHERE user_id = $1 AND completed_at >= $2",
            )
            .bind(&guard.user_id)
            .bind(guard.since)
            .fetch_one(&mut *tx)
            .await?;

            if count >= guard.limit {
                return Err(StoreError::Conflict("daily quota exhausted".into()));
            }
        }

        if let Some(guard) = batch.funds_guard() {
            let balance: i64 = sqlx::query_scalar(BALANCE_SQL)
                .bind(&guard.user_id)
                .fetch_one(&mut *tx)
                .await?;

            if balance < guard.required {
                return Err(StoreError::Conflict("insufficient balance".into()));
            }
        }

        for op in batch.ops() {
            match op {
                WriteOp::InsertUser(user) => {
                    sqlx::query(
                        r#"INSERT INTO users
                        (id, username, referral_code, referrer_id, status, role, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
                    )
                    .bind(&user.id)
                    .bind(&user.username)
                    .bind(&user.referral_code)
                    .bind(&user.referrer_id)
                    .bind(&user.status)
                    .bind(&user.role)
                    .bind(user.created_at)
                    .bind(user.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::InsertSubscription(sub) => {
                    sqlx::query(
                        r#"INSERT INTO subscriptions
                        (id, user_id, plan_id, start_date, end_date, status, created_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
                    )
                    .bind(&sub.id)
                    .bind(&sub.user_id)
                    .bind(&sub.plan_id)
                    .bind(sub.start_date)
                    .bind(sub.end_date)
                    .bind(&sub.status)
                    .bind(sub.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::ExpireActiveSubscriptions { user_id } => {
                    sqlx::query(
                        "UPDATE subscriptions SET status = $1 WHERE user_id = $2 AND status = $3",
                    )
                    .bind(subscriptions::STATUS_EXPIRED)
                    .bind(user_id)
                    .bind(subscriptions::STATUS_ACTIVE)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::InsertLedgerEntry(entry) => {
                    sqlx::query(
                        r#"INSERT INTO transactions
                        (id, user_id, kind, amount, status, description, created_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
                    )
                    .bind(&entry.id)
                    .bind(&entry.user_id)
                    .bind(&entry.kind)
                    .bind(entry.amount)
                    .bind(&entry.status)
                    .bind(&entry.description)
                    .bind(entry.created_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::InsertCompletion(completion) => {
                    sqlx::query(
                        r#"INSERT INTO task_completions
                        (id, user_id, job_id, amount_earned, completed_at)
                        VALUES ($1, $2, $3, $4, $5)"#,
                    )
                    .bind(&completion.id)
                    .bind(&completion.user_id)
                    .bind(&completion.job_id)
                    .bind(completion.amount_earned)
                    .bind(completion.completed_at)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;

        Ok(())
    }
}
