//! Step registry and per-step validation for the recommendation wizard

pub mod registry;
pub mod validation;

pub use registry::{
    CollectStep, OutOfRangeError, RegistryError, StepDescriptor, StepKind, StepRegistry,
};
pub use validation::{validate_step, ValidationError};
