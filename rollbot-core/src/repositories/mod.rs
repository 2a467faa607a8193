// src/repositories/mod.rs

pub mod json_file;
pub mod postgres;

pub use json_file::{JsonScopeStateRepository, ScopeStatesFile};
pub use postgres::PostgresScopeStateRepository;
pub use rollbot_common::traits::repository_traits::ScopeStateRepository;
