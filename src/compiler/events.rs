//! Event logging for the pass pipeline.
//!
//! Passes and the scheduler describe what they did as [`Event`]s appended to
//! an [`EventLog`]. The log is append-only and can be written through a shared
//! reference from several threads at once, so shaders compiled in parallel
//! report into the same log without locking.
//!
//! - [`Event`] - a single recorded event (transformation, pass boundary, diagnostic)
//! - [`EventLog`] - collection of events with query and summary helpers
//! - [`EventBuilder`] - fluent API returned by [`EventLog::record`]
//! - [`DerivedStats`] - counters computed from a log after the fact
//!
//! # Example
//!
//! ```rust
//! use shadeopt::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::InstructionLowered)
//!     .at("blur.fs", 12)
//!     .message("atan2 -> polynomial");
//! log.info("starting lower_atan");
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.summary(), "1 instruction lowered");
//! ```

use std::{collections::BTreeSet, fmt};

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// What an [`EventKind`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// The shader was rewritten.
    Transformation,
    /// Scheduler bookkeeping.
    Pipeline,
    /// Free-form info, warnings and errors.
    Diagnostic,
}

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum EventKind {
    /// An instruction was replaced by an equivalent sequence.
    InstructionLowered,
    /// Two instructions feeding a select or phi were merged into one.
    SelectHoisted,
    /// A move or modifier instruction was folded into its users.
    CopyPropagated,
    /// An instruction was removed.
    InstructionRemoved,
    /// A register read was canonicalized through a load.
    LoadInserted,
    /// A load was expanded into register moves.
    LoadLowered,

    /// A pass started on a shader.
    PassStarted,
    /// A pass finished on a shader.
    PassCompleted,
    /// A shader was re-validated after a pass.
    ShaderValidated,

    /// Informational message.
    Info,
    /// Warning, the pipeline carried on.
    Warning,
    /// Error, the pipeline stopped.
    Error,
}

impl EventKind {
    /// Short lower-case description, also the default event message.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::InstructionLowered => "instruction lowered",
            Self::SelectHoisted => "select hoisted",
            Self::CopyPropagated => "copy propagated",
            Self::InstructionRemoved => "instruction removed",
            Self::LoadInserted => "load inserted",
            Self::LoadLowered => "load lowered",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::ShaderValidated => "shader validated",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// The category this kind belongs to.
    #[must_use]
    pub fn category(self) -> EventCategory {
        match self {
            Self::InstructionLowered
            | Self::SelectHoisted
            | Self::CopyPropagated
            | Self::InstructionRemoved
            | Self::LoadInserted
            | Self::LoadLowered => EventCategory::Transformation,
            Self::PassStarted | Self::PassCompleted | Self::ShaderValidated => {
                EventCategory::Pipeline
            }
            Self::Info | Self::Warning | Self::Error => EventCategory::Diagnostic,
        }
    }

    /// Returns true if this event represents a change to a shader.
    #[must_use]
    pub fn is_transformation(self) -> bool {
        self.category() == EventCategory::Transformation
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Name of the shader the event occurred in, if any.
    pub shader: Option<String>,
    /// Instruction index within the shader.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Name of the pass that recorded the event.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            shader: None,
            location: None,
            message: String::new(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind)?;
        if let Some(shader) = &self.shader {
            write!(f, "{shader}")?;
            if let Some(loc) = self.location {
                write!(f, "@{loc}")?;
            }
            f.write_str(": ")?;
        }
        f.write_str(&self.message)
    }
}

/// Fluent event construction, returned by [`EventLog::record`].
///
/// The event lands in the log when the builder is dropped; without a
/// [`message`](Self::message) it reads as the kind's description.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Event,
}

impl EventBuilder<'_> {
    /// Sets the shader and instruction index.
    pub fn at(mut self, shader: &str, location: usize) -> Self {
        self.event.shader = Some(shader.to_string());
        self.event.location = Some(location);
        self
    }

    /// Sets only the shader, for shader-level events.
    pub fn shader(mut self, shader: &str) -> Self {
        self.event.shader = Some(shader.to_string());
        self
    }

    /// Sets the instruction index.
    pub fn location(mut self, location: usize) -> Self {
        self.event.location = Some(location);
        self
    }

    /// Sets the message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.event.message = msg.into();
        self
    }

    /// Associates the event with a pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.event.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let mut event = Event::new(self.event.kind);
        std::mem::swap(&mut event, &mut self.event);
        if event.message.is_empty() {
            event.message = event.kind.description().to_string();
        }
        self.log.events.push(event);
    }
}

/// Per-kind event counts, indexed by [`EventKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCounts([usize; EventKind::COUNT]);

impl KindCounts {
    /// Count for `kind`.
    #[must_use]
    pub fn get(&self, kind: EventKind) -> usize {
        self.0[kind as usize]
    }

    /// Non-zero counts in declaration order.
    pub fn nonzero(&self) -> impl Iterator<Item = (EventKind, usize)> + '_ {
        EventKind::iter()
            .map(|kind| (kind, self.get(kind)))
            .filter(|&(_, n)| n > 0)
    }
}

/// Append-only log of everything the pipeline did.
///
/// Statistics are derived from the events rather than tracked separately.
/// Recording only needs `&self`, so parallel compilations share one log.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Event::new(kind),
        }
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.record(EventKind::Error).message(message);
    }

    /// Appends copies of all events of `other`.
    ///
    /// Passes record into a local log and merge it once they know they
    /// changed something.
    pub fn merge(&self, other: &EventLog) {
        for event in other {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Counts every kind in one pass over the log.
    #[must_use]
    pub fn counts(&self) -> KindCounts {
        let mut counts = [0; EventKind::COUNT];
        for event in self {
            counts[event.kind as usize] += 1;
        }
        KindCounts(counts)
    }

    /// Returns an iterator over all events in insertion order.
    pub fn iter(&self) -> EventLogIter<'_> {
        self.into_iter()
    }

    /// Events recorded for `shader`.
    pub fn filter_shader<'a>(&'a self, shader: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter()
            .filter(move |e| e.shader.as_deref() == Some(shader))
    }

    /// Events that changed a shader.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind == EventKind::Warning)
    }

    /// Error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind == EventKind::Error)
    }

    /// Number of distinct shaders with at least one transformation.
    #[must_use]
    pub fn shaders_affected(&self) -> usize {
        self.transformations()
            .filter_map(|e| e.shader.as_deref())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// One-line summary of the transformations, in [`EventKind`] order,
    /// such as `"3 instruction lowered, 1 select hoisted"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }
        let parts: Vec<String> = self
            .counts()
            .nonzero()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, n)| format!("{n} {kind}"))
            .collect();
        if parts.is_empty() {
            format!("{} events", self.len())
        } else {
            parts.join(", ")
        }
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

/// Counters derived from an [`EventLog`] after compilation.
#[derive(Debug, Clone, Default)]
pub struct DerivedStats {
    /// Shaders with at least one transformation.
    pub shaders_transformed: usize,
    /// Instructions replaced by lowered sequences.
    pub instructions_lowered: usize,
    /// Selects and phis hoisted over their operands.
    pub selects_hoisted: usize,
    /// Copies and modifiers folded into users.
    pub copies_propagated: usize,
    /// Instructions deleted.
    pub instructions_removed: usize,
    /// `load_reg` values materialized.
    pub loads_inserted: usize,
    /// `load_reg` values expanded to moves.
    pub loads_lowered: usize,
    /// Pass runs that completed.
    pub pass_runs: usize,
    /// Warnings.
    pub warnings: usize,
    /// Errors.
    pub errors: usize,
    /// Pipeline iterations, when the caller provides them.
    pub iterations: usize,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.counts();
        Self {
            shaders_transformed: log.shaders_affected(),
            instructions_lowered: counts.get(EventKind::InstructionLowered),
            selects_hoisted: counts.get(EventKind::SelectHoisted),
            copies_propagated: counts.get(EventKind::CopyPropagated),
            instructions_removed: counts.get(EventKind::InstructionRemoved),
            loads_inserted: counts.get(EventKind::LoadInserted),
            loads_lowered: counts.get(EventKind::LoadLowered),
            pass_runs: counts.get(EventKind::PassCompleted),
            warnings: counts.get(EventKind::Warning),
            errors: counts.get(EventKind::Error),
            iterations: 0,
        }
    }

    /// Sets the number of iterations, as returned by the scheduler.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Human-readable summary of the non-zero counters.
    #[must_use]
    pub fn summary(&self) -> String {
        let counters = [
            (self.shaders_transformed, "shaders"),
            (self.instructions_lowered, "lowered"),
            (self.selects_hoisted, "selects hoisted"),
            (self.copies_propagated, "copies propagated"),
            (self.instructions_removed, "instructions removed"),
            (self.loads_inserted, "loads inserted"),
            (self.loads_lowered, "loads lowered"),
            (self.errors, "errors"),
            (self.warnings, "warnings"),
        ];
        let mut out = counters
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, what)| format!("{n} {what}"))
            .collect::<Vec<_>>()
            .join(", ");
        if out.is_empty() {
            out.push_str("no transformations");
        }
        if self.iterations > 0 {
            out.push_str(&format!(" ({} iterations)", self.iterations));
        }
        out
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
