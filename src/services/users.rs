use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::engine::RewardEngine;
use crate::models::users::{NewUser, Profile, User};
use crate::repositories::RewardStore;

pub enum UserRequest {
    Register {
        request: NewUser,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    GetProfile {
        user_id: String,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
}

pub struct UserRequestHandler<S> {
    engine: Arc<RewardEngine<S>>,
}

impl<S> Clone for UserRequestHandler<S> {
    fn clone(&self) -> Self {
        UserRequestHandler {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: RewardStore> UserRequestHandler<S> {
    pub fn new(engine: Arc<RewardEngine<S>>) -> Self {
        UserRequestHandler { engine }
    }
}

#[async_trait]
impl<S: RewardStore> RequestHandler<UserRequest> for UserRequestHandler<S> {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register { request, response } => {
                let result = self.engine.register(request).await;
                if let Err(err) = &result {
                    log::warn!("Registration rejected: {err}");
                }
                let _ = response.send(result.map_err(ServiceError::from));
            }
            UserRequest::GetProfile { user_id, response } => {
                let result = self.engine.profile(&user_id).await;
                let _ = response.send(result.map_err(ServiceError::from));
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

impl Default for UserService {
    fn default() -> Self {
        UserService::new()
    }
}

#[async_trait]
impl<S: RewardStore> Service<UserRequest, UserRequestHandler<S>> for UserService {}
