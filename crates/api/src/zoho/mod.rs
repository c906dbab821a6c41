//! Zoho Inventory API client.
//!
//! Provides read-only access to Zoho Inventory's REST API for pulling
//! inventory adjustments into the local database.
//!
//! # Architecture
//!
//! - OAuth refresh-token grant: refresh token → short-lived access token → API
//! - Access tokens cached in memory, refreshed shortly before expiry
//! - Every response is a JSON envelope with a numeric `code` (0 = success)
//! - [`AdjustmentSource`] is the seam the sync job depends on, so it can be
//!   driven by a fake in tests

pub mod adjustments;
pub mod auth;
pub mod client;
pub mod conversions;

pub use adjustments::{AdjustmentPage, ZohoAdjustment, ZohoLineItem};
pub use client::ZohoClient;
pub use conversions::{MappingError, map_adjustment};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when interacting with the Zoho API.
#[derive(Debug, Error)]
pub enum ZohoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Zoho returned a non-zero envelope code.
    #[error("Zoho API error {code}: {message}")]
    Api {
        /// Zoho error code.
        code: i64,
        /// Zoho error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Zoho.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Token refresh failed (invalid client or revoked refresh token).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Zoho rejected the access token even after a refresh.
    #[error("Access token rejected")]
    TokenRejected,

    /// HTTP status Zoho does not document for this endpoint.
    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response message, if any.
        message: String,
    },
}

/// Source of inventory adjustments for the sync job.
#[async_trait]
pub trait AdjustmentSource: Send + Sync {
    /// Fetch one page (1-indexed) of adjustment summaries.
    async fn list_adjustments_page(&self, page: u32) -> Result<AdjustmentPage, ZohoError>;

    /// Fetch a single adjustment including its line items.
    async fn get_adjustment(&self, adjustment_id: &str) -> Result<ZohoAdjustment, ZohoError>;
}
