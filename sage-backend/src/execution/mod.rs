pub mod session_lanes;

pub use session_lanes::{SessionLaneGuard, SessionLaneManager};
