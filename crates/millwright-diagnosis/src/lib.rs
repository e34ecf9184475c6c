pub mod faults;
pub mod prompts;

pub use faults::{detect_faults, FaultDiagnosis, FaultSeverity};
