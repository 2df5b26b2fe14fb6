//! Storage infrastructure: the server's TOML configuration file.

pub mod config;
