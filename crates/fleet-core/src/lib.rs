pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, FleetConfig, parse_duration};
pub use types::*;
