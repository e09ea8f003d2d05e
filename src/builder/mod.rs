//! Pure desired-state builders.
//!
//! Each builder derives the full desired form of one owned resource from an
//! (instance, challenge) pair. Builders are deterministic: identical inputs
//! produce byte-identical output, which is what lets the reconciler get
//! away with plain create-if-absent semantics. Optional resources return
//! `Ok(None)` when the Challenge does not request them.

pub mod deployment;
pub mod ingress;
pub mod labels;
pub mod network_policy;
pub mod service;
pub mod terminal;
