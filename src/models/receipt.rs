use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The nine receipt fields, in schema order. Used by the normalization
/// prompt and by tests asserting the closed key set.
pub const RECEIPT_FIELDS: [&str; 9] = [
    "store_name",
    "shop_name",
    "date",
    "total_amount",
    "tax_amount",
    "gst_amount",
    "sales_tax",
    "received",
    "payable",
];

/// Normalized receipt record. Every field is always present in serialized
/// output; a field the source data lacks is `null`, never absent. Amount
/// fields may be JSON numbers or strings depending on what the LLM produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub store_name: Option<Value>,
    pub shop_name: Option<Value>,
    pub date: Option<Value>,
    pub total_amount: Option<Value>,
    pub tax_amount: Option<Value>,
    pub gst_amount: Option<Value>,
    pub sales_tax: Option<Value>,
    pub received: Option<Value>,
    pub payable: Option<Value>,
}

impl ReceiptRecord {
    /// Project an arbitrary JSON object onto the fixed schema: keys absent
    /// from `data` (or explicitly null) become `None`, unknown keys are
    /// discarded.
    pub fn project(data: &serde_json::Map<String, Value>) -> Self {
        let field = |name: &str| -> Option<Value> {
            data.get(name).filter(|v| !v.is_null()).cloned()
        };
        Self {
            store_name: field("store_name"),
            shop_name: field("shop_name"),
            date: field("date"),
            total_amount: field("total_amount"),
            tax_amount: field("tax_amount"),
            gst_amount: field("gst_amount"),
            sales_tax: field("sales_tax"),
            received: field("received"),
            payable: field("payable"),
        }
    }

    /// Record with every field missing, used when normalization soft-fails.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Diagnostic side channel for normalization soft failures. Carried next to
/// the receipt (as `receipt_meta`), never merged into its key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptMeta {
    #[serde(rename = "_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "_raw", skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ReceiptMeta {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            raw: None,
        }
    }

    pub fn error_with_raw(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            raw: Some(raw.into()),
        }
    }
}
