//! Criteria-based tracking.
//!
//! A subscriber asks for fixes by accuracy and power budget instead of by
//! handler. The engine picks handlers through a [`SelectionPolicy`], enables
//! tracking on them and forwards each fix to a subscriber only when it is
//! the first one, or when the subscriber has moved at least the minimum
//! distance since the last fix it was sent.

mod engine;
mod policy;
mod request;

pub use engine::{Criteria, CriteriaConfig, CriteriaEngine, EnabledHandlers, DEFAULT_MIN_DISTANCE_M};
pub use policy::{AccuracyCriterion, PowerCriterion, SelectionPolicy};
pub use request::{CriteriaRequest, SubscriberId};
