use serde_json::{Map, Value};

use crate::codec::{CodecError, ColumnType, FieldValue, StoredValue, decode, encode};
use crate::models::Match;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn column(name: &'static str, column_type: ColumnType) -> Column {
    Column { name, column_type }
}

/// One row per match. Stops, fees and SLAs travel as encoded blobs on the
/// parent row and are never stored as child rows.
pub const MATCH_COLUMNS: &[Column] = &[
    column("id", ColumnType::String),
    column("shortcode", ColumnType::String),
    column("driver_id", ColumnType::String),
    column("state", ColumnType::String),
    column("bill_of_lading_photo", ColumnType::String),
    column("bill_of_lading_required", ColumnType::Boolean),
    column("origin_photo", ColumnType::String),
    column("vehicle_class_id", ColumnType::String),
    column("vehicle_class", ColumnType::String),
    column("service_level", ColumnType::String),
    column("origin_address", ColumnType::Json),
    column("distance", ColumnType::Number),
    column("total_volume", ColumnType::Number),
    column("total_weight", ColumnType::Number),
    column("po", ColumnType::String),
    column("pickup_notes", ColumnType::String),
    column("pickup_at", ColumnType::Date),
    column("dropoff_at", ColumnType::Date),
    column("shipper", ColumnType::Json),
    column("created_at", ColumnType::Date),
    column("completed_at", ColumnType::Date),
    column("accepted_at", ColumnType::Date),
    column("picked_up_at", ColumnType::Date),
    column("driver_total_pay", ColumnType::Number),
    column("rating", ColumnType::Number),
    column("origin_photo_required", ColumnType::Boolean),
    column("stops", ColumnType::Json),
    column("fees", ColumnType::Json),
    column("slas", ColumnType::Json),
    column("scheduled", ColumnType::Boolean),
    column("unload_method", ColumnType::String),
];

/// Stored values in `MATCH_COLUMNS` order.
pub type MatchRow = Vec<StoredValue>;

pub fn match_to_row(m: &Match) -> MatchRow {
    let wire = m.to_wire();

    MATCH_COLUMNS
        .iter()
        .map(|col| {
            let value = wire.get(col.name).unwrap_or(&Value::Null);
            encode(&FieldValue::from_json(value, col.column_type), col.column_type)
        })
        .collect()
}

pub fn match_from_row(row: &[StoredValue]) -> Result<Match, CodecError> {
    let mut fields = Map::with_capacity(MATCH_COLUMNS.len());

    for (col, stored) in MATCH_COLUMNS.iter().zip(row) {
        let value = decode(stored, col.column_type).to_json();
        fields.insert(col.name.to_string(), value);
    }

    Match::from_wire(Value::Object(fields))
}
