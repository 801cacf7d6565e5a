use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::engine::claims::ClaimReceipt;
use crate::engine::purchase::PurchaseReceipt;
use crate::engine::RewardEngine;
use crate::models::jobs::JobBoard;
use crate::models::subscriptions::ActivePlan;
use crate::models::transactions::LedgerEntry;
use crate::repositories::RewardStore;

pub enum RewardsRequest {
    ClaimTask {
        user_id: String,
        job_id: String,
        response: oneshot::Sender<Result<ClaimReceipt, ServiceError>>,
    },
    PurchasePlan {
        user_id: String,
        plan_id: String,
        response: oneshot::Sender<Result<PurchaseReceipt, ServiceError>>,
    },
    GetBalance {
        user_id: String,
        response: oneshot::Sender<Result<i64, ServiceError>>,
    },
    GetActiveSubscription {
        user_id: String,
        response: oneshot::Sender<Result<Option<ActivePlan>, ServiceError>>,
    },
    ListJobs {
        user_id: String,
        response: oneshot::Sender<Result<JobBoard, ServiceError>>,
    },
    RequestDeposit {
        user_id: String,
        amount: i64,
        method: String,
        response: oneshot::Sender<Result<LedgerEntry, ServiceError>>,
    },
    RequestWithdrawal {
        user_id: String,
        amount: i64,
        account: String,
        response: oneshot::Sender<Result<LedgerEntry, ServiceError>>,
    },
}

pub struct RewardsRequestHandler<S> {
    engine: Arc<RewardEngine<S>>,
}

impl<S> Clone for RewardsRequestHandler<S> {
    fn clone(&self) -> Self {
        RewardsRequestHandler {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: RewardStore> RewardsRequestHandler<S> {
    pub fn new(engine: Arc<RewardEngine<S>>) -> Self {
        RewardsRequestHandler { engine }
    }
}

#[async_trait]
impl<S: RewardStore> RequestHandler<RewardsRequest> for RewardsRequestHandler<S> {
    async fn handle_request(&self, request: RewardsRequest) {
        match request {
            RewardsRequest::ClaimTask {
                user_id,
                job_id,
                response,
            } => {
                let result = self.engine.claim_task(&user_id, &job_id).await;
                if let Err(err) = &result {
                    log::warn!("Claim by {user_id} on {job_id} rejected: {err}");
                }
                let _ = response.send(result.map_err(ServiceError::from));
            }
            RewardsRequest::PurchasePlan {
                user_id,
                plan_id,
                response,
            } => {
                let result = self.engine.purchase_plan(&user_id, &plan_id).await;
                if let Err(err) = &result {
                    log::warn!("Purchase by {user_id} of {plan_id} rejected: {err}");
                }
                let _ = response.send(result.map_err(ServiceError::from));
            }
            RewardsRequest::GetBalance { user_id, response } => {
                let result = self.engine.get_balance(&user_id).await;
                let _ = response.send(result.map_err(ServiceError::from));
            }
            RewardsRequest::GetActiveSubscription { user_id, response } => {
                let result = self.engine.get_active_subscription(&user_id).await;
                let _ = response.send(result.map_err(ServiceError::from));
            }
            RewardsRequest::ListJobs { user_id, response } => {
                let result = self.engine.list_jobs(&user_id).await;
                let _ = response.send(result.map_err(ServiceError::from));
            }
            RewardsRequest::RequestDeposit {
                user_id,
                amount,
                method,
                response,
            } => {
                let result = self.engine.request_deposit(&user_id, amount, &method).await;
                let _ = response.send(result.map_err(ServiceError::from));
            }
            RewardsRequest::RequestWithdrawal {
                user_id,
                amount,
                account,
                response,
            } => {
                let result = self
                    .engine
                    .request_withdrawal(&user_id, amount, &account)
                    .await;
                let _ = response.send(result.map_err(ServiceError::from));
            }
        }
    }
}

pub struct RewardsService;

impl RewardsService {
    pub fn new() -> Self {
        RewardsService {}
    }
}

impl Default for RewardsService {
    fn default() -> Self {
        RewardsService::new()
    }
}

#[async_trait]
impl<S: RewardStore> Service<RewardsRequest, RewardsRequestHandler<S>> for RewardsService {}
