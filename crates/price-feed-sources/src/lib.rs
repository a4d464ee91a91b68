pub mod cycle;
pub mod error;
pub mod http;
pub mod source;

pub use cycle::{CycleOutcome, run_cycle};
pub use error::SourceError;
pub use source::PriceSource;
