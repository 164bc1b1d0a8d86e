//! Compiler context shared by all passes.
//!
//! The [`CompilerContext`] holds what passes may read but not own: the
//! options and the event log. It is shared by reference between the worker
//! threads compiling different shaders, so everything in it is either
//! immutable or append-only.

use std::time::{Duration, Instant};

use crate::compiler::{events::EventLog, options::CompilerOptions};

/// Read-only state and event sink for a compilation.
pub struct CompilerContext {
    /// Target capabilities and pipeline limits.
    pub options: CompilerOptions,

    /// Accumulated events from all passes.
    pub events: EventLog,

    start_time: Instant,
}

impl CompilerContext {
    /// Creates a context with an empty event log.
    #[must_use]
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            events: EventLog::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}
