//! Core domain + application logic for the group broadcast bot.
//!
//! This crate is framework-agnostic. Telegram lives behind the messaging port
//! implemented in the adapter crate.

pub mod batch;
pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod context;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod groups;
pub mod interval;
pub mod logging;
pub mod membership;
pub mod messages;
pub mod messaging;
pub mod security;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
