#![doc = "Common types shared across the cbm-timing workspace."]

pub mod config;
pub mod error;
pub mod jobcode;
pub mod status;

pub use config::*;
pub use error::*;
pub use jobcode::*;
pub use status::*;
