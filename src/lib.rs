pub mod app;
pub mod cli;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use app::{AppContext, AskOptions};
pub use cli::{Cli, Commands};
pub use error::AppError;
pub use models::{AskRequest, AskResponse, Config, OutputFormat};
