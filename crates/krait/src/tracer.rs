//! Execution tracing hooks.
//!
//! The VM carries its tracer as a type parameter, so with [`NoopTracer`] every
//! hook monomorphizes to nothing and the dispatch loop pays no tracing cost.
//! Other implementations override only the hooks they care about.

use std::collections::HashMap;

use crate::op::Opcode;

/// Trace event captured by [`RecordingTracer`] for post-mortem analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction was dispatched.
    Instruction {
        /// Byte offset of the instruction (its first `ExtendedArg` prefix,
        /// if any).
        offset: usize,
        opcode: Opcode,
        /// Folded operand.
        oparg: u32,
        /// Operand-stack depth at dispatch.
        stack_depth: usize,
    },
    /// A call pushed a new frame.
    Call { func_name: String, depth: usize },
    /// A frame returned.
    Return { depth: usize },
    /// A closure cell was read.
    CellLoad { slot: usize, cells_len: usize },
    /// A closure cell was written.
    CellStore { slot: usize, cells_len: usize },
    /// A function object was created.
    MakeFunction {
        qualname: String,
        cell_count: usize,
        defaults_count: usize,
    },
    /// An explicit raise unwound the frame.
    Raise { exc_type: String },
}

/// Hook points in the dispatch loop. Every method defaults to a no-op.
pub trait VmTracer: std::fmt::Debug {
    /// Called before each instruction is executed.
    ///
    /// The hottest hook; implementations should stay lightweight.
    #[inline(always)]
    fn on_instruction(&mut self, _offset: usize, _opcode: Opcode, _oparg: u32, _stack_depth: usize) {}

    /// Called after a call pushes a new frame. `depth` counts frames
    /// including the new one.
    #[inline(always)]
    fn on_call(&mut self, _func_name: &str, _depth: usize) {}

    /// Called when a frame returns. `depth` counts the remaining frames.
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called when a binary-operation cache slot serves its specialized path.
    #[inline(always)]
    fn on_cache_hit(&mut self, _offset: usize, _opcode: Opcode) {}

    /// Called when a binary-operation cache slot is rewritten.
    #[inline(always)]
    fn on_cache_miss(&mut self, _offset: usize, _opcode: Opcode) {}

    /// Called when a closure cell is read through `LoadDeref`.
    #[inline(always)]
    fn on_cell_load(&mut self, _slot: usize, _cells_len: usize) {}

    /// Called when a closure cell is written through `StoreDeref`.
    #[inline(always)]
    fn on_cell_store(&mut self, _slot: usize, _cells_len: usize) {}

    /// Called when `MakeFunction` creates a function object.
    #[inline(always)]
    fn on_make_function(&mut self, _qualname: &str, _cell_count: usize, _defaults_count: usize) {}

    /// Called when `RaiseVarargs` raises.
    #[inline(always)]
    fn on_raise(&mut self, _exc_type: &str) {}
}

/// A tracer that does nothing; the production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints a human-readable execution log to stderr, optionally stopping
/// after a fixed number of instructions so loops stay readable.
#[derive(Debug, Default)]
pub struct StderrTracer {
    limit: Option<usize>,
    count: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops logging after `limit` instructions.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
        }
    }

    fn exhausted(&mut self) -> bool {
        match self.limit {
            Some(limit) if self.count >= limit => true,
            _ => {
                self.count += 1;
                false
            }
        }
    }
}

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, offset: usize, opcode: Opcode, oparg: u32, stack_depth: usize) {
        if !self.exhausted() {
            eprintln!("[{offset:>5}] {opcode:<16} arg={oparg:<5} stack={stack_depth}");
        }
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        eprintln!("  >>> CALL {func_name}  depth={depth}");
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("  <<< RETURN  depth={depth}");
    }

    fn on_raise(&mut self, exc_type: &str) {
        eprintln!("  !!! RAISE {exc_type}");
    }
}

/// Counts instruction frequencies, cache behavior, and call depth.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    /// Executions per opcode.
    pub opcode_counts: HashMap<Opcode, u64>,
    /// Total instructions executed.
    pub instructions: u64,
    /// Specialized-path executions of cached binary sites.
    pub cache_hits: u64,
    /// Cache slot rewrites.
    pub cache_misses: u64,
    /// Deepest call stack observed.
    pub max_call_depth: usize,
    /// Function objects created.
    pub functions_made: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One-line summary for logs and benchmarks.
    #[must_use]
    pub fn report(&self) -> String {
        format!(
            "{} instructions, cache {}/{} hit/miss, max depth {}",
            self.instructions, self.cache_hits, self.cache_misses, self.max_call_depth
        )
    }
}

/// Records every event in order, for replay comparisons and post-mortem
/// debugging. An optional limit caps memory on long runs.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_none_or(|limit| self.events.len() < limit) {
            self.events.push(event);
        }
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, offset: usize, opcode: Opcode, oparg: u32, stack_depth: usize) {
        self.record(TraceEvent::Instruction {
            offset,
            opcode,
            oparg,
            stack_depth,
        });
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        self.record(TraceEvent::Call {
            func_name: func_name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.record(TraceEvent::Return { depth });
    }

    fn on_cell_load(&mut self, slot: usize, cells_len: usize) {
        self.record(TraceEvent::CellLoad { slot, cells_len });
    }

    fn on_cell_store(&mut self, slot: usize, cells_len: usize) {
        self.record(TraceEvent::CellStore { slot, cells_len });
    }

    fn on_make_function(&mut self, qualname: &str, cell_count: usize, defaults_count: usize) {
        self.record(TraceEvent::MakeFunction {
            qualname: qualname.to_owned(),
            cell_count,
            defaults_count,
        });
    }

    fn on_raise(&mut self, exc_type: &str) {
        self.record(TraceEvent::Raise {
            exc_type: exc_type.to_owned(),
        });
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _offset: usize, opcode: Opcode, _oparg: u32, _stack_depth: usize) {
        self.instructions += 1;
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
    }

    fn on_call(&mut self, _func_name: &str, depth: usize) {
        self.max_call_depth = self.max_call_depth.max(depth);
    }

    #[inline]
    fn on_cache_hit(&mut self, _offset: usize, _opcode: Opcode) {
        self.cache_hits += 1;
    }

    #[inline]
    fn on_cache_miss(&mut self, _offset: usize, _opcode: Opcode) {
        self.cache_misses += 1;
    }

    fn on_make_function(&mut self, _qualname: &str, _cell_count: usize, _defaults_count: usize) {
        self.functions_made += 1;
    }
}
