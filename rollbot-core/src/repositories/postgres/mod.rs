// src/repositories/postgres/mod.rs

pub mod scope_state;

pub use scope_state::PostgresScopeStateRepository;
