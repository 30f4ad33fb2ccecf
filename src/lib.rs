pub mod types;
pub mod error;
pub mod data;
pub mod upstream;
pub mod config;
pub mod utils;

pub use types::*;
pub use error::{Result, VolumeError};
