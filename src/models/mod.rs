pub mod address;
pub mod barcode;
pub mod fee;
pub mod item;
pub mod matches;
pub mod sla;
pub mod stop;

pub use address::{Contact, GeoAddress, Shipper};
pub use barcode::{BarcodeReading, BarcodeReadingState, BarcodeReadingType, NewBarcodeReading};
pub use fee::MatchFee;
pub use item::MatchStopItem;
pub use matches::{Match, MatchState, ServiceLevel};
pub use sla::{MatchSla, SlaType};
pub use stop::{MatchStop, MatchStopState, SignatureType};
