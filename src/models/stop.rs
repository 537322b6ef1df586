use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::lenient;
use crate::models::address::{Contact, GeoAddress};
use crate::models::barcode::{BarcodeReadingType, NewBarcodeReading};
use crate::models::item::MatchStopItem;

/// Delivery progress of a single stop.
///
/// `pending → en_route → arrived → signed → delivered`, with `undeliverable`
/// reachable from `en_route`, `arrived` and `signed`. `delivered` and
/// `undeliverable` are absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStopState {
    #[default]
    Pending,
    EnRoute,
    Arrived,
    Signed,
    Delivered,
    Undeliverable,
}

impl MatchStopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Undeliverable)
    }

    /// Forward edges plus the driver-asserted `en_route → pending` toggle.
    pub fn can_transition_to(self, next: MatchStopState) -> bool {
        use MatchStopState::*;

        match (self, next) {
            (Pending, EnRoute | Arrived) => true,
            (EnRoute, Pending | Arrived | Undeliverable) => true,
            (Arrived, Signed | Delivered | Undeliverable) => true,
            (Signed, Delivered | Undeliverable) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::EnRoute => "en_route",
            Self::Arrived => "arrived",
            Self::Signed => "signed",
            Self::Delivered => "delivered",
            Self::Undeliverable => "undeliverable",
        }
    }
}

impl fmt::Display for MatchStopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    #[default]
    Electronic,
    Photo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchStop {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub state: MatchStopState,
    #[serde(deserialize_with = "lenient::integer")]
    pub index: i64,
    #[serde(deserialize_with = "lenient::opt")]
    pub destination_address: Option<GeoAddress>,
    #[serde(deserialize_with = "lenient::opt")]
    pub recipient: Option<Contact>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub self_recipient: bool,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub delivery_notes: Option<String>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub driver_tip: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub signature_photo: Option<String>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub signature_required: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub signature_type: SignatureType,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub signature_instructions: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub destination_photo: Option<String>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub destination_photo_required: bool,
    #[serde(deserialize_with = "lenient::boolean")]
    pub has_load_fee: bool,
    #[serde(deserialize_with = "lenient::boolean")]
    pub needs_pallet_jack: bool,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub dropoff_by: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub po: Option<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub items: Vec<MatchStopItem>,
}

impl MatchStop {
    pub fn is_en_route_toggleable(&self) -> bool {
        matches!(self.state, MatchStopState::Pending | MatchStopState::EnRoute)
    }

    /// Items still owing a reading for `kind`, in item order.
    pub fn needed_barcodes(&self, kind: BarcodeReadingType) -> Vec<NewBarcodeReading> {
        self.items
            .iter()
            .filter_map(|item| item.needed_barcode(kind, &self.id))
            .collect()
    }

    pub fn item(&self, item_id: &str) -> Option<&MatchStopItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}
