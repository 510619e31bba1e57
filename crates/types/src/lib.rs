#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shared data model for the otad update agent

pub mod manifest;
pub mod package;
pub mod snapshot;
pub mod stage;

pub use manifest::{Manifest, ModuleEntry};
pub use package::PackageDescriptor;
pub use snapshot::{ProgressSnapshot, RollbackTarget};
pub use stage::UpdateStage;
