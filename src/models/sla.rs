use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::lenient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaType {
    #[default]
    Acceptance,
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSla {
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub sla_type: SlaType,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
}
