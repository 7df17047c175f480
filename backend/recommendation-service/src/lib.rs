pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod services;
pub mod startup;

pub use config::Config;
pub use error::{AppError, Result};
pub use startup::ServiceContext;
