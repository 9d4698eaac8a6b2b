//! Notification delivery: the push transport, outcome classification, retry
//! policy and the workers that drain the delayed queue.

pub mod delivery;
pub mod retry;
pub mod transport;
pub mod worker;
