mod definition;
mod library;

pub use definition::{BreathingPattern, Phase, PhaseName};
pub use library::{PatternLibrary, PatternSource};
