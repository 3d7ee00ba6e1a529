pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SpacecatConfig;
pub use error::{Result, SpacecatError};
