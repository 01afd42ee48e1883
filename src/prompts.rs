//! Prompt and output schema for receipt extraction.
//!
//! Centralising the instruction and the schema here keeps
//! [`crate::pipeline::llm`] free of prompt text, and lets unit tests inspect
//! both without calling a model.
//!
//! Callers can override the instruction via
//! [`crate::config::ScannerConfig::system_prompt`]; the schema is always
//! appended so the response shape stays fixed.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// Default instruction sent with every receipt image.
pub const DEFAULT_RECEIPT_PROMPT: &str = "You are an expert document parser. Analyze the following receipt. \
Extract and return the data in strict JSON format. If a field is missing, return null for it. \
The items array should contain all line items from the receipt.";

/// JSON schema the model's answer must conform to.
pub static RECEIPT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "merchant": { "type": "string", "description": "Name of the store or merchant." },
            "date": { "type": "string", "description": "Date of the transaction in YYYY-MM-DD format." },
            "total_amount": { "type": "number", "description": "The final total amount paid." },
            "location": { "type": "string", "description": "The physical address of the merchant, if available." },
            "card_number": { "type": "string", "description": "The last 4 digits of the credit/debit card, if present." },
            "items": {
                "type": "array",
                "description": "List of all items purchased.",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Name of the purchased item." },
                        "quantity": { "type": "number", "description": "Quantity of the item, if specified." },
                        "price": { "type": "number", "description": "Price of the single item or total for the line item." }
                    },
                    "required": ["name", "price"]
                }
            }
        },
        "required": ["merchant", "date", "total_amount", "items"]
    })
});

/// Build the full system message: instruction followed by the schema.
pub fn extraction_prompt(instruction: &str) -> String {
    let schema = serde_json::to_string_pretty(&*RECEIPT_SCHEMA).unwrap_or_default();
    format!(
        "{instruction}\n\nRespond with a single JSON object only, no prose and no code fences. \
It must conform to this JSON schema:\n{schema}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_item_name_and_price() {
        let required = &RECEIPT_SCHEMA["properties"]["items"]["items"]["required"];
        assert_eq!(required, &json!(["name", "price"]));
    }

    #[test]
    fn prompt_embeds_schema_fields() {
        let p = extraction_prompt(DEFAULT_RECEIPT_PROMPT);
        assert!(p.starts_with("You are an expert document parser."));
        for field in ["merchant", "total_amount", "card_number", "items"] {
            assert!(p.contains(field), "prompt is missing {field}");
        }
    }
}
