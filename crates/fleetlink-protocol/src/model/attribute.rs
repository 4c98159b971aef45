//! Matchmaking attribute values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A matchmaking attribute value: one of the four data types the rule-set
/// language understands.
///
/// On the wire this is a tagged object, e.g. `{"AttrType": "DOUBLE",
/// "N": 23.0}` or `{"AttrType": "STRING", "S": "deathmatch"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "AttrType")]
pub enum AttributeValue {
    /// A single string value.
    #[serde(rename = "STRING")]
    String {
        #[serde(rename = "S")]
        s: String,
    },

    /// A number value, expressed as a double.
    #[serde(rename = "DOUBLE")]
    Double {
        #[serde(rename = "N")]
        n: f64,
    },

    /// A list of strings.
    #[serde(rename = "STRING_LIST")]
    StringList {
        #[serde(rename = "SL")]
        sl: Vec<String>,
    },

    /// A map from strings to doubles.
    #[serde(rename = "STRING_DOUBLE_MAP")]
    StringDoubleMap {
        #[serde(rename = "SDM")]
        sdm: HashMap<String, f64>,
    },

    /// No value.
    #[serde(rename = "NONE")]
    None,
}

impl AttributeValue {
    /// Coerces a loosely-typed JSON value (as found in matchmaker documents)
    /// into an attribute value. Non-string list members and non-numeric map
    /// values are skipped; anything unrecognized becomes `None`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => AttributeValue::String { s: s.clone() },
            serde_json::Value::Number(n) => AttributeValue::Double {
                n: n.as_f64().unwrap_or_default(),
            },
            serde_json::Value::Array(items) => AttributeValue::StringList {
                sl: items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect(),
            },
            serde_json::Value::Object(entries) => AttributeValue::StringDoubleMap {
                sdm: entries
                    .iter()
                    .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                    .collect(),
            },
            _ => AttributeValue::None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
