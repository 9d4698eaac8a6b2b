//! Scheduling core: subscription identity, the delayed job queue and the
//! scheduler that turns client requests into queue mutations.

pub mod capability;
pub mod identity;
pub mod queue;
pub mod scheduler;
