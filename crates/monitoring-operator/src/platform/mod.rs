//! Container platform abstraction: object model, client trait and an
//! in-memory implementation.

pub mod client;
pub mod error;
pub mod memory;
pub mod object;

pub use client::PlatformClient;
pub use error::PlatformError;
pub use memory::{InMemoryPlatform, Mutation, MutationKind};
pub use object::{
    AppliedObject, ApplyOutcome, DesiredObject, ObjectKind, ObjectRef, PlatformObject,
    WorkloadStatus,
};
