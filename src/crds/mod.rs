pub mod challenge;
pub mod challenge_instance;

// Re-export types
pub use challenge::{
    AuthProxySpec, Challenge, ChallengeSpec, ExposeType, IngressSpec, NetworkPolicySpec,
    ResourceSpec, ScenarioSpec, TerminalSpec,
};
pub use challenge_instance::{
    ChallengeInstance, ChallengeInstanceSpec, ChallengeInstanceStatus, Condition, ConditionStatus,
    Phase,
};
