//! InkVault operator CLI, as a library so integration tests can exercise
//! the helpers.

pub mod cli;
pub mod commands;
pub mod utils;
