pub mod exc_sum;

pub use exc_sum::{ExcSumBuilder, ExceptionClass};
