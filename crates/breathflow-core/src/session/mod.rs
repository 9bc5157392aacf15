mod machine;
mod state;

pub use machine::SessionMachine;
pub use state::{SessionData, SessionPhase, SessionState};
