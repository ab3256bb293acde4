//! Client-facing location service.
//!
//! [`Request`] is the decoded form of one client call, [`Reply`] one message
//! back. [`LocationService`] routes requests to the handlers, the criteria
//! engine and the geocoding providers held by the
//! [`AppContext`](crate::context::AppContext). The transport lives in
//! [`crate::ipc`].

mod reply;
mod request;
mod router;

pub use reply::{
    GeocodeBody, PositionBody, Reply, ReplyBody, SatelliteBody, SatelliteEntry, StateBody,
};
pub use request::Request;
pub use router::{ClientId, LocationService};
