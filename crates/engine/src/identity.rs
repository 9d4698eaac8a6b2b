//! Subscription identity: maps a push endpoint to a stable job id.
//!
//! The id is the hex SHA-256 digest of the endpoint string. Using the endpoint
//! as a natural key is what lets a second `schedule` for the same recipient
//! replace the first instead of queueing a duplicate.

use sha2::{Digest, Sha256};

use chexmix_common::types::JobId;

/// Derive the job id for a subscription endpoint.
///
/// Pure and total: malformed endpoints are hashed like any other string.
pub fn job_id(endpoint: &str) -> JobId {
    let digest = Sha256::digest(endpoint.as_bytes());
    JobId(hex::encode(digest))
}
