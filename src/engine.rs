//! The ledger and commission-distribution engine: balance projection, quota
//! enforcement, task claims, plan purchases and the referral fan-out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    plans::Plan,
    subscriptions::{self, ActivePlan, Subscription},
    users::{self, NewUser, Profile, User},
};
use crate::repositories::{RewardStore, StoreError, WriteBatch, WriteOp};
use crate::settings::Reward;

pub mod balance;
pub mod claims;
pub mod commission;
pub mod period;
pub mod purchase;

use commission::RateTable;
use period::PeriodClock;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown or inactive user")]
    Unauthorized,
    #[error("no active plan")]
    NoActivePlan,
    #[error("daily task quota exhausted")]
    QuotaExceeded,
    #[error("unknown job")]
    InvalidJob,
    #[error("job already claimed in this period")]
    AlreadyClaimed,
    #[error("unknown or inactive plan")]
    InvalidPlan,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("active referral requirement not met")]
    ReferralRequirementNotMet,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Machine-readable rejection kind for callers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Unauthorized => "unauthorized",
            EngineError::NoActivePlan => "no_active_plan",
            EngineError::QuotaExceeded => "quota_exceeded",
            EngineError::InvalidJob => "invalid_job",
            EngineError::AlreadyClaimed => "already_claimed",
            EngineError::InvalidPlan => "invalid_plan",
            EngineError::InsufficientBalance => "insufficient_balance",
            EngineError::ReferralRequirementNotMet => "referral_requirement_not_met",
            EngineError::Validation(_) => "validation_error",
            EngineError::Storage(_) => "storage_error",
        }
    }

    /// Only storage faults are worth retrying; every other rejection is a
    /// stable precondition failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}

pub struct RewardEngine<S> {
    store: Arc<S>,
    clock: PeriodClock,
    trial_plan_id: String,
    trial_days: i64,
    allow_repeat_claims: bool,
    default_rates: RateTable,
}

impl<S: RewardStore> RewardEngine<S> {
    pub fn new(store: Arc<S>, reward: &Reward, default_rates: RateTable) -> Self {
        RewardEngine {
            store,
            clock: PeriodClock::new(reward.timezone_offset_minutes),
            trial_plan_id: reward.trial_plan_id.clone(),
            trial_days: reward.trial_days,
            allow_repeat_claims: reward.allow_repeat_claims,
            default_rates,
        }
    }

    pub fn clock(&self) -> &PeriodClock {
        &self.clock
    }

    pub(crate) fn trial_plan_id(&self) -> &str {
        &self.trial_plan_id
    }

    pub(crate) fn allow_repeat_claims(&self) -> bool {
        self.allow_repeat_claims
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) async fn require_user(&self, user_id: &str) -> Result<User, EngineError> {
        match self.store.user(user_id).await? {
            Some(user) if user.is_active() => Ok(user),
            _ => Err(EngineError::Unauthorized),
        }
    }

    /// Current commission rates: configured defaults overlaid with the
    /// settings collaborator's rows, snapshotted per event.
    pub(crate) async fn rate_table(&self) -> Result<RateTable, StoreError> {
        let overrides = self.store.settings().await?;
        Ok(self.default_rates.with_overrides(&overrides))
    }

    /// The user's active paid subscription, or the trial plan fallback.
    /// `None` only when no subscription exists and the trial plan is absent
    /// from the catalog.
    pub(crate) async fn resolve_plan(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ActivePlan>, StoreError> {
        if let Some((subscription, plan)) = self.store.active_subscription(user_id, now).await? {
            let trial = plan.id == self.trial_plan_id;
            return Ok(Some(ActivePlan::from_plan(
                &plan,
                Some(subscription.end_date),
                trial,
            )));
        }

        let trial_plan = self.store.plan(&self.trial_plan_id).await?;
        Ok(trial_plan.map(|plan| ActivePlan::from_plan(&plan, None, true)))
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<i64, EngineError> {
        self.require_user(user_id).await?;
        Ok(self.store.balance(user_id).await?)
    }

    pub async fn get_active_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<ActivePlan>, EngineError> {
        self.require_user(user_id).await?;
        Ok(self.resolve_plan(user_id, Utc::now()).await?)
    }

    pub async fn register(&self, request: NewUser) -> Result<User, EngineError> {
        let now = Utc::now();
        let username = request.username.trim();

        if username.is_empty() {
            return Err(EngineError::Validation("username must not be empty".into()));
        }
        if self.store.user_by_username(username).await?.is_some() {
            return Err(EngineError::Validation("username already taken".into()));
        }

        // An unknown referral code is ignored, not rejected; the original
        // flow registers such users without an upline.
        let referrer_id = match &request.referral_code {
            Some(code) => self
                .store
                .user_by_referral_code(code)
                .await?
                .map(|referrer| referrer.id),
            None => None,
        };

        let user = User {
            id: Uuid::new_v4().hyphenated().to_string(),
            username: username.to_owned(),
            referral_code: users::generate_referral_code(),
            referrer_id,
            status: users::STATUS_ACTIVE.to_owned(),
            role: users::ROLE_MEMBER.to_owned(),
            created_at: now,
            updated_at: now,
        };

        let mut batch = WriteBatch::new(&user.id);
        batch.push(WriteOp::InsertUser(user.clone()));

        // Trial grant, only when the trial plan exists in the catalog.
        if let Some(trial_plan) = self.store.plan(&self.trial_plan_id).await? {
            batch.push(WriteOp::InsertSubscription(new_subscription(
                &user.id,
                &trial_plan,
                now,
                now + Duration::days(self.trial_days),
            )));
        }

        self.store.commit(batch).await?;
        log::info!("Registered user {} ({})", user.username, user.id);

        Ok(user)
    }

    pub async fn profile(&self, user_id: &str) -> Result<Profile, EngineError> {
        let user = self.require_user(user_id).await?;
        let now = Utc::now();
        let since = self.clock.period_start(now);

        Ok(Profile {
            balance: self.store.balance(user_id).await?,
            today_income: self.store.income_since(user_id, since).await?,
            tasks_done_today: self.store.completions_since(user_id, since).await?,
            plan: self.resolve_plan(user_id, now).await?,
            user,
        })
    }
}

pub(crate) fn new_subscription(
    user_id: &str,
    plan: &Plan,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Subscription {
    Subscription {
        id: Uuid::new_v4().hyphenated().to_string(),
        user_id: user_id.to_owned(),
        plan_id: plan.id.clone(),
        start_date,
        end_date,
        status: subscriptions::STATUS_ACTIVE.to_owned(),
        created_at: start_date,
    }
}
