//! The standard processor chain, in its required order: log, parse, store,
//! debugger fan-out, session updates.

pub mod debugger;
pub mod log;
pub mod parse;
pub mod session;
pub mod store;

pub use debugger::{DebuggerFilter, DebuggerObserver, DebuggerRegistry};
pub use log::LogProcessor;
pub use parse::ParseProcessor;
pub use session::{
    SessionObserver, SessionObserverRegistry, SessionProcessor, SessionSnapshot, SessionState,
    SharedSessions,
};
pub use store::StoreProcessor;

use crate::db::Store;
use crate::pipeline::PipelineBuilder;

/// Compose the standard chain.  Additional processors can still be appended
/// with [`PipelineBuilder::with`] before spawning.
pub fn standard_pipeline(
    store: Store,
    debugger_registry: DebuggerRegistry,
    session_registry: SessionObserverRegistry,
    open_sessions: SharedSessions,
) -> PipelineBuilder {
    PipelineBuilder::new()
        .with(Box::new(LogProcessor))
        .with(Box::new(ParseProcessor))
        .with(Box::new(StoreProcessor::new(store)))
        .with(Box::new(debugger::DebuggerProcessor::new(debugger_registry)))
        .with(Box::new(SessionProcessor::new(
            session_registry,
            open_sessions,
        )))
}
