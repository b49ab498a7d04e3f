//! Trend analysis over a patient's visible visits.
//!
//! Pipeline: visibility-filtered records → date aggregation → change and
//! asymmetry → chart/table views.

mod aggregate;
mod axis;
mod change;
mod norms;
mod report;

pub use aggregate::*;
pub use axis::*;
pub use change::*;
pub use norms::*;
pub use report::*;
