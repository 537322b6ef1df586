use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::lenient;

/// The workflow phase a reading proves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeReadingType {
    #[default]
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeReadingState {
    Captured,
    #[default]
    Missing,
}

/// A reading the server already holds for an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeReading {
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub kind: BarcodeReadingType,
    #[serde(deserialize_with = "lenient::or_default")]
    pub state: BarcodeReadingState,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub photo: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub barcode: Option<String>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub inserted_at: Option<DateTime<Utc>>,
}

/// Outstanding (or freshly captured) capture work for one item and phase.
///
/// Derived from item requirements on demand; never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBarcodeReading {
    #[serde(rename = "type")]
    pub kind: BarcodeReadingType,
    pub state: BarcodeReadingState,
    /// Base64 photo contents.
    pub photo: Option<String>,
    pub barcode: Option<String>,
    pub item_id: String,
    pub stop_id: String,
}

impl NewBarcodeReading {
    pub fn missing(kind: BarcodeReadingType, item_id: &str, stop_id: &str) -> Self {
        Self {
            kind,
            state: BarcodeReadingState::Missing,
            photo: None,
            barcode: None,
            item_id: item_id.to_string(),
            stop_id: stop_id.to_string(),
        }
    }

    pub fn captured(mut self, barcode: impl Into<String>) -> Self {
        self.state = BarcodeReadingState::Captured;
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }
}
