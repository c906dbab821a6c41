//! Outlet Stock Core - Shared types library.
//!
//! This crate provides common types used across all Outlet Stock components:
//! - `api` - JSON API and Zoho adjustment sync service
//! - `cli` - Command-line tools for migrations, one-shot syncs, and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, status enums, and the
//!   location-to-module lookup table

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
