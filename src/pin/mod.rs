//! Pin domain types, remote access and the offline-capable repository.

mod api_types;
mod connectivity;
mod remote;
mod repository;
mod types;

pub use api_types::{ApiPin, PinCreateRequest};
pub use connectivity::{Connectivity, ConnectivityFlag};
pub use remote::{HttpPinRemote, PinRemote};
pub use repository::PinRepository;
pub use types::{GeoPoint, Pin, PinPatch, PinStatus, LOCAL_ID_PREFIX};
