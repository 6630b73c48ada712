//! Storage infrastructure: configuration and key file persistence.
//!
//! - **`config`** reads and writes the TOML [`BrokerConfig`] and falls back to
//!   defaults on first run.
//! - **`keyfile`** reads, creates, and rotates the keyring used for version 3
//!   tokens.
//!
//! [`BrokerConfig`]: crate::domain::config::BrokerConfig

pub mod config;
pub mod keyfile;
