//! stockroom: role-gated inventory administration API
//!
//! Products, users and stock counts live as JSON documents in Sled; callers
//! authenticate with HS256 bearer tokens and are authorized by the role on
//! their user document. One external scanner process can be supervised.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod models;
pub mod policy;
// REST API module: Axum HTTP handlers on port 11111
pub mod rest;
pub mod scanner;
pub mod storage;
pub mod telemetry;
