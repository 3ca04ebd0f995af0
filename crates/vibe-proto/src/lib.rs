//! Types shared by the vibe client crates: the pipeline's wire format,
//! the on-disk configuration and platform paths.

pub mod config;
pub mod platform;
pub mod protocol;
