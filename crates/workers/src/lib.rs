pub mod auth;
pub mod jobs;
pub mod manager;

pub use auth::{mint_token, verify_token, TokenError};
pub use jobs::{FailedJob, JobsError, JobsManager, JobsManagerHandle};
pub use manager::{WorkerManager, WorkerManagerHandle};
