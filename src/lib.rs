pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::StoreConfig;
pub use db::ArchiveStore;
pub use error::{StoreError, StoreResult};
pub use models::{
    Category, CategoryCount, Email, EmailFilter, NewCategory, NewEmail, Statistics, User,
};
