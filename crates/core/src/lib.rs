//! Sidecar core: decides whether a pod gets an injection profile and
//! synthesizes the JSON Patch that applies it.
//!
//! Everything here is synchronous and free of I/O. The registry and policy are
//! immutable after startup, so `decide` can be called from any number of
//! request handlers concurrently.

#![forbid(unsafe_code)]

pub mod builder;
pub mod mutate;
pub mod patch;
pub mod pod;
pub mod policy;
pub mod profile;

pub use builder::build_patch;
pub use mutate::{decide, Outcome};
pub use patch::{PatchOp, PatchOperation, PatchValue};
pub use pod::PodSnapshot;
pub use policy::{MutationDecision, MutationPolicy, SkipReason};
pub use profile::{InjectionProfile, ProfileRegistry};

pub mod prelude {
    pub use super::{
        decide, InjectionProfile, MutationDecision, MutationPolicy, Outcome, PatchOperation, PodSnapshot,
        ProfileRegistry, SkipReason,
    };
}
