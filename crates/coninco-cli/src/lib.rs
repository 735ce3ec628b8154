//! coninco command-line library.
//!
//! This crate wires the feed, chat and core crates into the bot binary.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, FeedConfig};
