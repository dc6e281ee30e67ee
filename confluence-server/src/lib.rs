//! Confluence Server - HTTP surface over the confluence signal pipeline.
//!
//! Configuration comes from environment variables (see [`config::ServerConfig`]); routes
//! and handlers live in [`api`].

pub mod api;
pub mod config;
