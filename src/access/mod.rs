//! Endpoint reconciliation and policy attachment

pub mod policy_manager;
pub mod reconciler;

pub use policy_manager::{AttachOutcome, PersonalPolicy, PolicyManager};
pub use reconciler::{DesiredEndpoint, EndpointReconciler, Reconciled};
