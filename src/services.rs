use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{EngineError, RewardEngine};
use crate::repositories::RewardStore;
use crate::settings::Settings;

pub mod rewards;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Engine(err) => err.kind(),
            ServiceError::Communication(_, _) => "communication_error",
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Handles to the running services. Dropping all senders stops the service
/// loops.
pub struct ServiceChannels {
    pub rewards: mpsc::Sender<rewards::RewardsRequest>,
    pub users: mpsc::Sender<users::UserRequest>,
}

pub async fn start_services<S: RewardStore>(
    store: Arc<S>,
    settings: Settings,
) -> Result<ServiceChannels, anyhow::Error> {
    let engine = Arc::new(RewardEngine::new(
        store,
        &settings.reward,
        settings.rates.clone(),
    ));

    let (rewards_tx, mut rewards_rx) = mpsc::channel(512);
    let (user_tx, mut user_rx) = mpsc::channel(512);

    let mut rewards_service = rewards::RewardsService::new();
    let mut user_service = users::UserService::new();

    log::info!("Starting rewards service.");
    let rewards_engine = engine.clone();
    tokio::spawn(async move {
        rewards_service
            .run(
                rewards::RewardsRequestHandler::new(rewards_engine),
                &mut rewards_rx,
            )
            .await;
    });

    log::info!("Starting user service.");
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(engine), &mut user_rx)
            .await;
    });

    Ok(ServiceChannels {
        rewards: rewards_tx,
        users: user_tx,
    })
}
