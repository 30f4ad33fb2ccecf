pub mod rate_limiter;
pub mod time;

pub use rate_limiter::RequestPacer;
pub use time::*;
