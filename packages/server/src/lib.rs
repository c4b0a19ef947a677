pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod generator;
pub mod jobs;
pub mod outbox;
pub mod repository;
pub mod service;
pub mod sweeper;

pub use config::AppConfig;
pub use repository::AssetRepository;
pub use service::Service;
