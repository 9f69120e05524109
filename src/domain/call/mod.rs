//! Call module - the durable call record and its lifecycle.
//!
//! A call is created in `initiated`, rung, then answered or declined, and
//! finally ended. Records are never deleted; every status change is a
//! conditional transition checked against the stored status.

mod call;
mod errors;
mod status;

pub use call::{Call, CallRole, UserPair};
pub use errors::CallError;
pub use status::CallStatus;
