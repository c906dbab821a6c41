//! Inventory adjustment endpoints.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use super::{AdjustmentSource, ZohoClient, ZohoError};

/// An inventory adjustment as returned by Zoho.
///
/// List responses carry header fields only; `line_items` is populated by the
/// detail endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZohoAdjustment {
    #[serde(default)]
    pub inventory_adjustment_id: Option<String>,
    #[serde(default)]
    pub adjustment_number: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub adjustment_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub line_items: Vec<ZohoLineItem>,
}

/// One line of a Zoho inventory adjustment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZohoLineItem {
    #[serde(default)]
    pub line_item_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub item_sku: Option<String>,
    #[serde(default)]
    pub adjustment_account_name: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub quantity_adjusted: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub warehouse_name: Option<String>,
}

/// One page of the adjustment list.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentPage {
    pub adjustments: Vec<ZohoAdjustment>,
    pub has_more_page: bool,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    inventory_adjustments: Vec<ZohoAdjustment>,
    #[serde(default)]
    page_context: Option<PageContext>,
}

#[derive(Debug, Deserialize)]
struct PageContext {
    #[serde(default)]
    has_more_page: bool,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    inventory_adjustment: ZohoAdjustment,
}

impl ZohoClient {
    /// Fetch one page (1-indexed) of inventory adjustments.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_adjustments(&self, page: u32) -> Result<AdjustmentPage, ZohoError> {
        let response: ListResponse = self
            .get(
                "inventoryadjustments",
                &[
                    ("page", page.to_string()),
                    ("per_page", self.per_page().to_string()),
                ],
            )
            .await?;

        Ok(AdjustmentPage {
            adjustments: response.inventory_adjustments,
            has_more_page: response.page_context.is_some_and(|ctx| ctx.has_more_page),
        })
    }

    /// Fetch one inventory adjustment with its line items.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if Zoho has no such adjustment.
    #[instrument(skip(self))]
    pub async fn adjustment(&self, adjustment_id: &str) -> Result<ZohoAdjustment, ZohoError> {
        let response: DetailResponse = self
            .get(&format!("inventoryadjustments/{adjustment_id}"), &[])
            .await?;
        Ok(response.inventory_adjustment)
    }
}

#[async_trait]
impl AdjustmentSource for ZohoClient {
    async fn list_adjustments_page(&self, page: u32) -> Result<AdjustmentPage, ZohoError> {
        self.list_adjustments(page).await
    }

    async fn get_adjustment(&self, adjustment_id: &str) -> Result<ZohoAdjustment, ZohoError> {
        self.adjustment(adjustment_id).await
    }
}
