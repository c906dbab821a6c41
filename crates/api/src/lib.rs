//! Outlet Stock API library.
//!
//! Pulls inventory adjustments from Zoho Inventory into `PostgreSQL` and
//! applies them to per-outlet stock. Exposed as a library so the CLI and the
//! integration tests can drive the same services as the HTTP server.
//!
//! # Modules
//!
//! - [`zoho`] - Zoho Inventory client and record mapping
//! - [`services`] - Sync and processing jobs
//! - [`db`] - `PostgreSQL` and in-memory stores
//! - [`routes`] - JSON API

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod zoho;
