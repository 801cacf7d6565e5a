pub mod jobs;
pub mod plans;
pub mod subscriptions;
pub mod transactions;
pub mod users;
