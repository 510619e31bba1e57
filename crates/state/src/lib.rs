#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Persistent update journal
//!
//! The journal is the only crash-durable state of the agent: a single JSON
//! record written via temp-file-and-rename so that a crash or power loss
//! leaves either the previous valid file or a complete new one. The engine
//! task is the sole writer; saves are serialized through it.

mod model;
mod store;

pub use model::PersistentState;
pub use store::StateStore;
