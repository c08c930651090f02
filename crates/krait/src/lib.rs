#![doc = include_str!("../../../README.md")]

mod args;
mod cache;
mod code;
mod exception;
mod frame;
mod function;
mod import;
mod namespace;
mod op;
mod signature;
pub mod tracer;
mod value;
mod vm;

pub use crate::{
    args::CallArgs,
    cache::{BinaryShape, CacheStatus, OpCache},
    code::{Code, CodeBuilder, JumpLabel},
    exception::{ExcType, RunError, RunResult, SimpleException},
    function::Function,
    import::{Importer, ModuleRegistry, NoImports},
    namespace::{Namespace, default_builtins},
    op::{CompareKind, Opcode},
    signature::Signature,
    tracer::{NoopTracer, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    value::{BinaryKind, CellRef, Dict, NativeFn, NativeFunction, UnaryKind, Value},
    vm::{Vm, VmOptions},
};
