//! Error taxonomy for control-plane flow-table operations.
//!
//! The data-plane NAT rewrite path does not use this type; it returns a [`crate::nat::NatResult`]
//! sentinel instead, matching the spec's DROP-code convention for an expected, high-frequency
//! outcome rather than raising an error.

use thiserror::Error;

/// Errors returned by control-plane flow-table operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// Allocation failed while constructing a [`crate::FlowEntry`] or inserting it into a table.
    #[error("resource exhaustion")]
    ResourceExhaustion,

    /// The tracked connection is already dying; refused to offload it.
    #[error("connection is dying")]
    DyingConnection,

    /// A second hardware-offload backend attempted to register.
    #[error("hardware offload backend already registered")]
    Busy,

    /// A table was created with the HW flag but no backend is registered.
    #[error("hardware offload not supported: no backend registered")]
    NotSupported,
}
