use serde::{Deserialize, Serialize};

use crate::codec::lenient;
use crate::models::barcode::{BarcodeReading, BarcodeReadingType, NewBarcodeReading};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchStopItem {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub height: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub width: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub length: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub weight: f64,
    #[serde(deserialize_with = "lenient::integer")]
    pub pieces: i64,
    #[serde(deserialize_with = "lenient::number")]
    pub volume: f64,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub barcode: Option<String>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub barcode_pickup_required: bool,
    #[serde(deserialize_with = "lenient::boolean")]
    pub barcode_delivery_required: bool,
    #[serde(deserialize_with = "lenient::list")]
    pub barcode_readings: Vec<BarcodeReading>,
}

impl MatchStopItem {
    pub fn is_barcode_required(&self, kind: BarcodeReadingType) -> bool {
        match kind {
            BarcodeReadingType::Pickup => self.barcode_pickup_required,
            BarcodeReadingType::Delivery => self.barcode_delivery_required,
        }
    }

    pub fn barcode_reading(&self, kind: BarcodeReadingType) -> Option<&BarcodeReading> {
        self.barcode_readings.iter().find(|r| r.kind == kind)
    }

    pub fn needs_barcode(&self, kind: BarcodeReadingType) -> bool {
        self.is_barcode_required(kind) && self.barcode_reading(kind).is_none()
    }

    pub fn needed_barcode(&self, kind: BarcodeReadingType, stop_id: &str) -> Option<NewBarcodeReading> {
        self.needs_barcode(kind)
            .then(|| NewBarcodeReading::missing(kind, &self.id, stop_id))
    }
}
