// src/lib.rs

pub mod config;
pub mod db;
pub mod extensions;
pub mod manifest;
pub mod repositories;
pub mod services;
pub mod tasks;

pub use config::ActivationConfig;
pub use db::Database;
pub use rollbot_common::error::Error;
pub use rollbot_common::models;
