pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use error::ApiError;
pub use server::{AgentServer, AppState, ServerBuilder, build_app, shutdown_signal};
