mod phase_clock;
mod source;

pub use phase_clock::{PhaseClock, PhaseCompletion};
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource};
