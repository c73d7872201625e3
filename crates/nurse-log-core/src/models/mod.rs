//! Domain models for the nurse health log.

mod field;
mod patch;
mod patient_id;
mod record;
mod validation;

pub use field::*;
pub use patch::*;
pub use patient_id::*;
pub use record::*;
pub use validation::*;
