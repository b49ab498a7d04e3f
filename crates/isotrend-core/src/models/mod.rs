//! Domain models for the isotrend system.

mod aggregate;
mod record;

pub use aggregate::*;
pub use record::*;
