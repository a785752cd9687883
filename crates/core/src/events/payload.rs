use std::fmt;

use serde::{Deserialize, Serialize};

/// A JSON scalar that the storage API may encode either as a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Subset of the object resource carried in `JSON_API_V1` notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPayload {
    pub size: Scalar,
    pub content_type: String,
    pub metageneration: Scalar,
}
