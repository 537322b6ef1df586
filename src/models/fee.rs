use serde::{Deserialize, Serialize};

use crate::codec::lenient;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchFee {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    /// Cents.
    #[serde(deserialize_with = "lenient::integer")]
    pub amount: i64,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub fee_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
}
