//! Turn routing: the engine entry point and the host hooks it dispatches to

pub mod engine;

pub use engine::{DialogEngine, DialogEngineBuilder, TurnHandler, TurnOutcome};
