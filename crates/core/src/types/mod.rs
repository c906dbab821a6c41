//! Core types for Outlet Stock.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod module;
pub mod status;

pub use id::*;
pub use module::{LocationModuleMap, Module, ModuleMapError};
pub use status::*;
