//! Subcommand handlers

pub mod expire;
pub mod fetch;
pub mod list;
pub mod precache;
