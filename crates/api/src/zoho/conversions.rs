//! Mapping from Zoho records to local adjustments.
//!
//! Zoho fills different fields depending on the edition and on how the
//! adjustment was created, so every local field is read from a fallback
//! chain. Blank strings count as absent.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use outlet_stock_core::AdjustmentType;

use super::{ZohoAdjustment, ZohoLineItem};
use crate::models::{AdjustmentLine, NewAdjustment};

/// Errors mapping a Zoho adjustment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("adjustment has no inventory_adjustment_id")]
    MissingId,
    #[error("adjustment {0} has no date")]
    MissingDate(String),
    #[error("adjustment {id} has invalid date {value:?}")]
    InvalidDate { id: String, value: String },
}

/// First non-blank value of a fallback chain, trimmed.
fn first_present<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Map a Zoho adjustment (summary or detail) to the fields a sync writes.
///
/// # Errors
///
/// Returns `MappingError` if the record has no id or no valid `YYYY-MM-DD` date.
pub fn map_adjustment(zoho: &ZohoAdjustment) -> Result<NewAdjustment, MappingError> {
    let zoho_adjustment_id =
        first_present([zoho.inventory_adjustment_id.as_deref()]).ok_or(MappingError::MissingId)?;

    let raw_date = first_present([zoho.date.as_deref()])
        .ok_or_else(|| MappingError::MissingDate(zoho_adjustment_id.clone()))?;
    let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|_| {
        MappingError::InvalidDate {
            id: zoho_adjustment_id.clone(),
            value: raw_date.clone(),
        }
    })?;

    let adjustment_number = first_present([
        zoho.reference_number.as_deref(),
        zoho.adjustment_number.as_deref(),
    ])
    .unwrap_or_else(|| format!("ADJ-{zoho_adjustment_id}"));

    let location_name = first_present([
        zoho.location_name.as_deref(),
        zoho.warehouse_name.as_deref(),
    ]);

    let line_items = zoho
        .line_items
        .iter()
        .map(|line| map_line(line, location_name.as_deref()))
        .collect();

    Ok(NewAdjustment {
        zoho_adjustment_id,
        adjustment_number,
        date,
        reason: first_present([zoho.reason.as_deref(), zoho.description.as_deref()]),
        description: first_present([zoho.description.as_deref()]),
        adjustment_type: AdjustmentType::from_zoho(zoho.adjustment_type.as_deref()),
        zoho_status: first_present([zoho.status.as_deref()]).map(|s| s.to_lowercase()),
        location_name,
        line_items,
    })
}

fn map_line(line: &ZohoLineItem, header_location: Option<&str>) -> AdjustmentLine {
    AdjustmentLine {
        line_item_id: first_present([line.line_item_id.as_deref()]),
        item_id: first_present([line.item_id.as_deref()]),
        sku: first_present([line.sku.as_deref(), line.item_sku.as_deref()]),
        name: first_present([
            line.name.as_deref(),
            line.item_name.as_deref(),
            line.description.as_deref(),
        ])
        .unwrap_or_default(),
        account_name: first_present([
            line.adjustment_account_name.as_deref(),
            line.account_name.as_deref(),
        ]),
        // A zero adjusted quantity counts as absent
        quantity: line
            .quantity_adjusted
            .filter(|q| !q.is_zero())
            .or(line.quantity)
            .unwrap_or(Decimal::ZERO),
        unit: first_present([line.unit.as_deref()]),
        location_name: first_present([
            line.location_name.as_deref(),
            line.warehouse_name.as_deref(),
            header_location,
        ]),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn summary() -> ZohoAdjustment {
        ZohoAdjustment {
            inventory_adjustment_id: Some("4815000000044100".to_string()),
            date: Some("2026-10-01".to_string()),
            ..ZohoAdjustment::default()
        }
    }

    #[test]
    fn test_adjustment_number_fallback_chain() {
        let mut zoho = summary();
        assert_eq!(
            map_adjustment(&zoho).unwrap().adjustment_number,
            "ADJ-4815000000044100"
        );

        zoho.adjustment_number = Some("IA-7".to_string());
        assert_eq!(map_adjustment(&zoho).unwrap().adjustment_number, "IA-7");

        zoho.reference_number = Some("  ".to_string());
        assert_eq!(map_adjustment(&zoho).unwrap().adjustment_number, "IA-7");

        zoho.reference_number = Some("REF-99".to_string());
        assert_eq!(map_adjustment(&zoho).unwrap().adjustment_number, "REF-99");
    }

    #[test]
    fn test_reason_falls_back_to_description() {
        let mut zoho = summary();
        zoho.description = Some("Dropped tray".to_string());
        let mapped = map_adjustment(&zoho).unwrap();
        assert_eq!(mapped.reason.as_deref(), Some("Dropped tray"));

        zoho.reason = Some("Damaged goods".to_string());
        let mapped = map_adjustment(&zoho).unwrap();
        assert_eq!(mapped.reason.as_deref(), Some("Damaged goods"));
        assert_eq!(mapped.description.as_deref(), Some("Dropped tray"));
    }

    #[test]
    fn test_line_fallbacks_and_header_location() {
        let mut zoho = summary();
        zoho.warehouse_name = Some("Downtown Outlet".to_string());
        zoho.line_items = vec![
            ZohoLineItem {
                item_name: Some("Tomatoes".to_string()),
                item_sku: Some("RM-TOM".to_string()),
                account_name: Some("Inventory Asset".to_string()),
                quantity: Some(Decimal::new(-15, 1)),
                ..ZohoLineItem::default()
            },
            ZohoLineItem {
                description: Some("Burger buns".to_string()),
                quantity_adjusted: Some(Decimal::from(12)),
                quantity: Some(Decimal::from(99)),
                location_name: Some("Mall Outlet".to_string()),
                ..ZohoLineItem::default()
            },
        ];

        let mapped = map_adjustment(&zoho).unwrap();
        assert_eq!(mapped.location_name.as_deref(), Some("Downtown Outlet"));

        let first = &mapped.line_items[0];
        assert_eq!(first.name, "Tomatoes");
        assert_eq!(first.sku.as_deref(), Some("RM-TOM"));
        assert_eq!(first.account_name.as_deref(), Some("Inventory Asset"));
        assert_eq!(first.quantity, Decimal::new(-15, 1));
        assert_eq!(first.location_name.as_deref(), Some("Downtown Outlet"));

        let second = &mapped.line_items[1];
        assert_eq!(second.name, "Burger buns");
        assert_eq!(second.quantity, Decimal::from(12));
        assert_eq!(second.location_name.as_deref(), Some("Mall Outlet"));
    }

    #[test]
    fn test_missing_quantity_is_zero() {
        let mut zoho = summary();
        zoho.line_items = vec![ZohoLineItem {
            name: Some("Salt".to_string()),
            ..ZohoLineItem::default()
        }];
        assert_eq!(map_adjustment(&zoho).unwrap().line_items[0].quantity, Decimal::ZERO);
    }

    #[test]
    fn test_zero_quantity_adjusted_falls_back_to_quantity() {
        let mut zoho = summary();
        zoho.line_items = vec![ZohoLineItem {
            name: Some("Flour".to_string()),
            quantity_adjusted: Some(Decimal::ZERO),
            quantity: Some(Decimal::from(-4)),
            ..ZohoLineItem::default()
        }];
        assert_eq!(
            map_adjustment(&zoho).unwrap().line_items[0].quantity,
            Decimal::from(-4)
        );
    }

    #[test]
    fn test_status_and_type() {
        let mut zoho = summary();
        zoho.status = Some("Adjusted".to_string());
        zoho.adjustment_type = Some("value".to_string());
        let mapped = map_adjustment(&zoho).unwrap();
        assert_eq!(mapped.zoho_status.as_deref(), Some("adjusted"));
        assert_eq!(mapped.adjustment_type, AdjustmentType::Value);
    }

    #[test]
    fn test_date_errors() {
        let mut zoho = summary();
        zoho.date = None;
        assert_eq!(
            map_adjustment(&zoho),
            Err(MappingError::MissingDate("4815000000044100".to_string()))
        );

        zoho.date = Some("01/10/2026".to_string());
        assert!(matches!(
            map_adjustment(&zoho),
            Err(MappingError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_missing_id() {
        let zoho = ZohoAdjustment {
            date: Some("2026-10-01".to_string()),
            ..ZohoAdjustment::default()
        };
        assert_eq!(map_adjustment(&zoho), Err(MappingError::MissingId));
    }
}
