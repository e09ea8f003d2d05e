use crate::crds::ChallengeInstance;
use chrono::Utc;

/// True once the instance's expiry time has passed. Instances without an
/// `until` never expire.
pub fn is_expired(instance: &ChallengeInstance) -> bool {
    instance
        .spec
        .until
        .map(|until| Utc::now() > until)
        .unwrap_or(false)
}
