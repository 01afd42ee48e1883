//! Receipt data model shared by extraction, the session and the exporter.
//!
//! Field names match the JSON schema sent to the model one-to-one, so the
//! parsed response deserialises straight into [`Receipt`] and the same type
//! serialises back out for `--json` output.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One purchased line on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    /// Empty when the model could not read it.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Absent when the receipt does not print a quantity.
    #[serde(default)]
    pub quantity: Option<f64>,
    /// Unit price or line total, as printed. Currency is implicit.
    /// Absent when the model could not read it.
    #[serde(default)]
    pub price: Option<f64>,
}

/// A structured record extracted from one receipt image.
///
/// Immutable once produced: it is either the session's current result or an
/// entry in history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub merchant: Option<String>,
    /// Transaction date, nominally `YYYY-MM-DD`. Not validated.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    /// Last four digits of the payment card. Not validated.
    #[serde(default)]
    pub card_number: Option<String>,
    /// `null` from the model is read as no items.
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<ReceiptItem>,
}

impl Receipt {
    /// Total amount with an absent value counted as zero.
    pub fn total_or_zero(&self) -> f64 {
        self.total_amount.unwrap_or(0.0)
    }
}

/// Sum of `total_amount` across `receipts`, treating missing amounts as zero.
pub fn running_total(receipts: &[Receipt]) -> f64 {
    receipts.iter().map(Receipt::total_or_zero).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(total: Option<f64>) -> Receipt {
        Receipt {
            total_amount: total,
            ..Default::default()
        }
    }

    #[test]
    fn running_total_of_empty_history_is_zero() {
        assert_eq!(running_total(&[]), 0.0);
    }

    #[test]
    fn running_total_counts_missing_amounts_as_zero() {
        let history = vec![receipt(Some(12.5)), receipt(None), receipt(Some(7.25))];
        assert!((running_total(&history) - 19.75).abs() < 1e-9);
    }

    #[test]
    fn deserialises_nulls_and_missing_items() {
        let json = r#"{"merchant": null, "date": "2024-03-01", "total_amount": 9.99}"#;
        let r: Receipt = serde_json::from_str(json).unwrap();
        assert_eq!(r.merchant, None);
        assert_eq!(r.date.as_deref(), Some("2024-03-01"));
        assert!(r.items.is_empty());
    }

    #[test]
    fn item_tolerates_null_or_missing_fields() {
        let missing_price = r#"{"name": "Milk", "quantity": 1}"#;
        let item: ReceiptItem = serde_json::from_str(missing_price).unwrap();
        assert_eq!(item.price, None);
        assert_eq!(item.quantity, Some(1.0));

        let nulls = r#"{"name": null, "quantity": null, "price": null}"#;
        let item: ReceiptItem = serde_json::from_str(nulls).unwrap();
        assert_eq!(item.name, "");
        assert_eq!(item.price, None);

        let ok = r#"{"name": "Milk", "price": 1.29}"#;
        let item: ReceiptItem = serde_json::from_str(ok).unwrap();
        assert_eq!(item.price, Some(1.29));
    }

    #[test]
    fn null_items_read_as_empty() {
        let r: Receipt = serde_json::from_str(r#"{"merchant": "Shop", "items": null}"#).unwrap();
        assert!(r.items.is_empty());
    }
}
