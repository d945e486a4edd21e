//! Pipeline stages, in run order.
//!
//! Each stage is a plain function over paths and a [`crate::config::Config`]
//! slice; the filesystem is the only state passed between them.

pub mod bootstrap;
pub mod build;
pub mod package;
pub mod patch;
pub mod source;
pub mod stage_output;
pub mod verify;
pub mod version;
