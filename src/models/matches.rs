use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::codec::{CodecError, lenient};
use crate::models::address::{GeoAddress, Shipper};
use crate::models::barcode::{BarcodeReadingType, NewBarcodeReading};
use crate::models::fee::MatchFee;
use crate::models::sla::{MatchSla, SlaType};
use crate::models::stop::{MatchStop, MatchStopState};

/// Lifecycle of a delivery job.
///
/// `assigning_driver → accepted → en_route_to_pickup → arrived_at_pickup →
/// picked_up → [en_route_to_return → arrived_at_return] → completed → charged`,
/// with cancellation out of `accepted`, `en_route_to_pickup` and
/// `arrived_at_pickup`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Pending,
    Scheduled,
    Inactive,
    AssigningDriver,
    Accepted,
    EnRouteToPickup,
    ArrivedAtPickup,
    PickedUp,
    EnRouteToReturn,
    ArrivedAtReturn,
    Completed,
    Charged,
    Canceled,
    DriverCanceled,
    AdminCanceled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MatchState {
    pub const LIVE: [MatchState; 6] = [
        MatchState::Accepted,
        MatchState::EnRouteToPickup,
        MatchState::ArrivedAtPickup,
        MatchState::PickedUp,
        MatchState::EnRouteToReturn,
        MatchState::ArrivedAtReturn,
    ];

    pub const COMPLETE: [MatchState; 2] = [MatchState::Completed, MatchState::Charged];

    pub fn is_live(self) -> bool {
        Self::LIVE.contains(&self)
    }

    pub fn is_complete(self) -> bool {
        Self::COMPLETE.contains(&self)
    }

    pub fn is_canceled(self) -> bool {
        matches!(
            self,
            Self::Canceled | Self::DriverCanceled | Self::AdminCanceled
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Charged || self.is_canceled()
    }

    pub fn can_transition_to(self, next: MatchState) -> bool {
        use MatchState::*;

        match (self, next) {
            (Pending | Scheduled | Inactive, AssigningDriver) => true,
            (AssigningDriver, Accepted) => true,
            (Accepted, EnRouteToPickup | ArrivedAtPickup) => true,
            (EnRouteToPickup, Accepted | ArrivedAtPickup) => true,
            (
                Accepted | EnRouteToPickup | ArrivedAtPickup,
                DriverCanceled | Canceled | AdminCanceled,
            ) => true,
            (ArrivedAtPickup, PickedUp) => true,
            (PickedUp, EnRouteToReturn | Completed) => true,
            (EnRouteToReturn, ArrivedAtReturn) => true,
            (ArrivedAtReturn, Completed) => true,
            (Completed, Charged) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Inactive => "inactive",
            Self::AssigningDriver => "assigning_driver",
            Self::Accepted => "accepted",
            Self::EnRouteToPickup => "en_route_to_pickup",
            Self::ArrivedAtPickup => "arrived_at_pickup",
            Self::PickedUp => "picked_up",
            Self::EnRouteToReturn => "en_route_to_return",
            Self::ArrivedAtReturn => "arrived_at_return",
            Self::Completed => "completed",
            Self::Charged => "charged",
            Self::Canceled => "canceled",
            Self::DriverCanceled => "driver_canceled",
            Self::AdminCanceled => "admin_canceled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLevel {
    Dash,
    SameDay,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Match {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub shortcode: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub driver_id: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub state: MatchState,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub bill_of_lading_photo: Option<String>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub bill_of_lading_required: bool,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub origin_photo: Option<String>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub origin_photo_required: bool,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub vehicle_class_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub vehicle_class: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub service_level: Option<String>,
    #[serde(deserialize_with = "lenient::opt")]
    pub origin_address: Option<GeoAddress>,
    #[serde(deserialize_with = "lenient::number")]
    pub distance: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub total_volume: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub total_weight: f64,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub po: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub pickup_notes: Option<String>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub pickup_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub dropoff_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt")]
    pub shipper: Option<Shipper>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_datetime")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub driver_total_pay: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_number")]
    pub rating: Option<f64>,
    #[serde(deserialize_with = "lenient::boolean")]
    pub scheduled: bool,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub unload_method: Option<String>,
    #[serde(deserialize_with = "sorted_stops")]
    pub stops: Vec<MatchStop>,
    #[serde(deserialize_with = "lenient::list")]
    pub fees: Vec<MatchFee>,
    #[serde(deserialize_with = "lenient::list")]
    pub slas: Vec<MatchSla>,
}

fn sorted_stops<'de, D>(deserializer: D) -> Result<Vec<MatchStop>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut stops: Vec<MatchStop> = lenient::list(deserializer)?;
    stops.sort_by_key(|stop| stop.index);
    Ok(stops)
}

impl Match {
    /// Builds a match from a server payload (or a decoded row).
    ///
    /// Only a non-object payload or one without an id is rejected; every
    /// other malformed field falls back to its empty value.
    pub fn from_wire(payload: Value) -> Result<Self, CodecError> {
        let Value::Object(fields) = &payload else {
            return Err(CodecError::NotAnObject);
        };

        let has_id = match fields.get("id") {
            Some(Value::String(id)) => !id.trim().is_empty(),
            Some(Value::Number(_)) => true,
            _ => false,
        };
        if !has_id {
            return Err(CodecError::MissingId);
        }

        serde_json::from_value(payload).map_err(|err| CodecError::Malformed(err.to_string()))
    }

    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_available(&self) -> bool {
        self.state == MatchState::AssigningDriver
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    pub fn is_picked_up(&self) -> bool {
        matches!(
            self.state,
            MatchState::PickedUp | MatchState::Completed | MatchState::Charged
        )
    }

    pub fn is_at_pickup(&self) -> bool {
        self.state == MatchState::ArrivedAtPickup
    }

    pub fn is_signed(&self) -> bool {
        self.stops.iter().any(|s| s.state == MatchStopState::Signed)
    }

    pub fn is_at_dropoff(&self) -> bool {
        self.stops
            .iter()
            .any(|s| matches!(s.state, MatchStopState::Arrived | MatchStopState::Signed))
    }

    pub fn is_en_route_to_dropoff(&self) -> bool {
        self.stops.iter().any(|s| s.state == MatchStopState::EnRoute)
    }

    pub fn is_en_route(&self) -> bool {
        self.is_en_route_to_dropoff()
            || matches!(
                self.state,
                MatchState::EnRouteToPickup | MatchState::EnRouteToReturn
            )
    }

    pub fn is_en_route_toggleable(&self) -> bool {
        match self.state {
            MatchState::Accepted | MatchState::EnRouteToPickup => true,
            MatchState::PickedUp => self.stops.iter().any(MatchStop::is_en_route_toggleable),
            _ => false,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.state.is_live() && self.state != MatchState::Accepted
    }

    pub fn is_multi_stop(&self) -> bool {
        self.stops.len() > 1
    }

    /// Owning driver is either unset, unknown to us, or the acting driver.
    pub fn is_authorized(&self, acting_driver: Option<&str>) -> bool {
        match (self.driver_id.as_deref(), acting_driver) {
            (None, _) | (_, None) => true,
            (Some(owner), Some(acting)) => owner == acting,
        }
    }

    /// The furthest-along stop the driver is currently working.
    pub fn stop_currently_en_route(&self) -> Option<&MatchStop> {
        self.stops.iter().rev().find(|s| {
            matches!(
                s.state,
                MatchStopState::EnRoute | MatchStopState::Arrived | MatchStopState::Signed
            )
        })
    }

    pub fn stop(&self, stop_id: &str) -> Option<&MatchStop> {
        self.stops.iter().find(|s| s.id == stop_id)
    }

    pub fn has_undelivered_stops(&self) -> bool {
        self.stops
            .iter()
            .any(|s| s.state != MatchStopState::Delivered)
    }

    pub fn needed_pickup_barcodes(&self) -> Vec<NewBarcodeReading> {
        self.stops
            .iter()
            .flat_map(|stop| stop.needed_barcodes(BarcodeReadingType::Pickup))
            .collect()
    }

    pub fn has_items(&self) -> bool {
        self.stops.iter().any(|s| !s.items.is_empty())
    }

    pub fn has_fee(&self, fee_type: &str) -> bool {
        self.fees.iter().any(|fee| fee.fee_type == fee_type)
    }

    pub fn needs_load_unload(&self) -> bool {
        self.stops.iter().any(|s| s.has_load_fee)
    }

    pub fn needs_pallet_jack(&self) -> bool {
        self.stops.iter().any(|s| s.needs_pallet_jack)
    }

    pub fn sla(&self, sla_type: SlaType) -> Option<&MatchSla> {
        self.slas.iter().find(|sla| sla.sla_type == sla_type)
    }

    pub fn service_level(&self) -> ServiceLevel {
        match self.service_level.as_deref() {
            Some("2") => ServiceLevel::SameDay,
            _ => ServiceLevel::Dash,
        }
    }
}
