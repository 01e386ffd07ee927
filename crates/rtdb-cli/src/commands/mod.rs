//! Command implementations for rtdb-cli

pub mod delete;
pub mod get;
pub mod rules;
pub mod watch;
pub mod write;

pub use delete::delete;
pub use get::{get, QueryArgs};
pub use rules::{rules, RulesAction};
pub use watch::watch;
pub use write::{push, set, update};
