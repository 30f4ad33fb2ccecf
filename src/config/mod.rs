pub mod loader;

pub use loader::{load_config, validate_config, ENV_PREFIX};
