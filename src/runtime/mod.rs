//! Runtime adapters and the surface consumed by command handlers.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    cancel_all, cancel_download, global_status, global_status_message, logout, status_message,
    submit_for, with_session, CancelResponse, GlobalStatusResponse, SubmitResponse,
};
pub use tokio_spawner::TokioSpawner;
