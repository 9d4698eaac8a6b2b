//! HTTP surface for scheduling and cancelling push notifications.

pub mod middleware;
pub mod routes;
pub mod state;
