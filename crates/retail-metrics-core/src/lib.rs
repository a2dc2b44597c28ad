pub mod aggregation;
pub mod cohort;
pub mod currency;
pub mod derivation;
pub mod dimensions;
pub mod error;
pub mod margin;
pub mod pipeline;
pub mod pivot;
pub mod ranking;
pub mod types;

pub use error::RetailMetricsError;
pub use types::*;

/// Standard result type for all retail-metrics operations
pub type RetailMetricsResult<T> = Result<T, RetailMetricsError>;
