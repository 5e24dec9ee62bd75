// Library root: re-exports all modules so the CLI and integration tests can
// access the crate's public API.

pub mod attendance;
pub mod config;
pub mod db;
pub mod division;
pub mod events;
pub mod model;
pub mod squad;
