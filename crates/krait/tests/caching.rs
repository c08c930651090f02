//! Observable behavior of the per-site operation caches, via the profiling
//! tracer. Caches are hints: every test asserts the computed values first and
//! the cache statistics second.

use std::rc::Rc;

use krait::{
    Code, CodeBuilder, CompareKind, Namespace, NoImports, Opcode, ProfilingTracer, RecordingTracer, Signature,
    TraceEvent, Value, Vm,
};

/// `def add(a, b): return a + b` plus a module that calls it once.
fn add_and_call(arg_a: Value, arg_b: Value, add: &Rc<Code>) -> Code {
    let mut b = CodeBuilder::new("<module>");
    let code_k = b.const_(Value::Code(Rc::clone(add)));
    let qual_k = b.const_(Value::from("add"));
    let a_k = b.const_(arg_a);
    let b_k = b.const_(arg_b);
    b.emit_arg(Opcode::LoadConst, code_k);
    b.emit_arg(Opcode::LoadConst, qual_k);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::LoadConst, a_k);
    b.emit_arg(Opcode::LoadConst, b_k);
    b.emit_arg(Opcode::CallFunction, 2);
    b.emit(Opcode::ReturnValue);
    b.finish()
}

fn add_code() -> Rc<Code> {
    let mut f = CodeBuilder::new("add");
    f.set_signature(Signature::positional(&["a", "b"]));
    let a = f.local("a");
    let b = f.local("b");
    f.emit_arg(Opcode::LoadFast, a);
    f.emit_arg(Opcode::LoadFast, b);
    f.emit(Opcode::BinaryAdd);
    f.emit(Opcode::ReturnValue);
    Rc::new(f.finish())
}

/// The first execution of a site specializes it; repeats on the same operand
/// shape are hits. The cache lives in the code object, so it stays warm
/// across activations.
#[test]
fn sites_warm_up_once_across_activations() {
    let add = add_code();
    let mut vm = Vm::new(NoImports, ProfilingTracer::new());

    let result = vm
        .run_module(Rc::new(add_and_call(Value::Int(1), Value::Int(2), &add)), Namespace::new())
        .unwrap();
    assert_eq!(result, Value::Int(3));
    assert_eq!(vm.tracer().cache_misses, 1);
    assert_eq!(vm.tracer().cache_hits, 0);

    let result = vm
        .run_module(Rc::new(add_and_call(Value::Int(3), Value::Int(4), &add)), Namespace::new())
        .unwrap();
    assert_eq!(result, Value::Int(7));
    assert_eq!(vm.tracer().cache_misses, 1);
    assert_eq!(vm.tracer().cache_hits, 1);
}

/// A shape change rewrites the slot but never changes results.
#[test]
fn mis_speculation_recovers_transparently() {
    let add = add_code();
    let mut vm = Vm::new(NoImports, ProfilingTracer::new());

    let int_sum = vm
        .run_module(Rc::new(add_and_call(Value::Int(1), Value::Int(2), &add)), Namespace::new())
        .unwrap();
    let float_sum = vm
        .run_module(
            Rc::new(add_and_call(Value::Float(0.5), Value::Float(0.25), &add)),
            Namespace::new(),
        )
        .unwrap();
    let int_again = vm
        .run_module(Rc::new(add_and_call(Value::Int(5), Value::Int(6), &add)), Namespace::new())
        .unwrap();
    let str_sum = vm
        .run_module(
            Rc::new(add_and_call(Value::from("ab"), Value::from("cd"), &add)),
            Namespace::new(),
        )
        .unwrap();

    assert_eq!(int_sum, Value::Int(3));
    assert_eq!(float_sum, Value::Float(0.75));
    assert_eq!(int_again, Value::Int(11));
    assert_eq!(str_sum, Value::from("abcd"));
    // first execution specialized, the float call rewrote to generic, and
    // the generic slot served everything after
    assert_eq!(vm.tracer().cache_misses, 2);
    assert_eq!(vm.tracer().cache_hits, 2);
}

/// A hot loop mostly hits: exactly one miss per arithmetic site.
#[test]
fn hot_loops_hit_after_the_first_iteration() {
    let mut b = CodeBuilder::new("<module>");
    let zero = b.const_(Value::Int(0));
    let one = b.const_(Value::Int(1));
    let limit = b.const_(Value::Int(100));
    let i = b.local("i");

    b.emit_arg(Opcode::LoadConst, zero);
    b.emit_arg(Opcode::StoreFast, i);
    let top = b.mark();
    b.emit_arg(Opcode::LoadFast, i);
    b.emit_arg(Opcode::LoadConst, limit);
    b.emit_arg(Opcode::CompareOp, CompareKind::Lt as u32);
    let out = b.emit_jump(Opcode::PopJumpIfFalse);
    b.emit_arg(Opcode::LoadFast, i);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit(Opcode::BinaryAdd);
    b.emit_arg(Opcode::StoreFast, i);
    b.emit_arg(Opcode::JumpAbsolute, top);
    b.patch_jump(out);
    b.emit_arg(Opcode::LoadFast, i);
    b.emit(Opcode::ReturnValue);

    let mut vm = Vm::new(NoImports, ProfilingTracer::new());
    let result = vm.run_module(Rc::new(b.finish()), Namespace::new()).unwrap();
    assert_eq!(result, Value::Int(100));
    assert_eq!(vm.tracer().cache_misses, 1);
    assert_eq!(vm.tracer().cache_hits, 99);
}

/// The recording tracer captures events in dispatch order.
#[test]
fn recording_tracer_captures_the_call_sequence() {
    let add = add_code();
    let mut vm = Vm::new(NoImports, RecordingTracer::new());
    vm.run_module(Rc::new(add_and_call(Value::Int(1), Value::Int(2), &add)), Namespace::new())
        .unwrap();
    let events = vm.into_tracer().into_events();

    let calls: Vec<&TraceEvent> = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::Call { .. } | TraceEvent::Return { .. }))
        .collect();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        &TraceEvent::Call {
            func_name: "add".to_owned(),
            depth: 1
        }
    );
    assert_eq!(calls[1], &TraceEvent::Return { depth: 0 });

    assert!(events.iter().any(|e| matches!(
        e,
        TraceEvent::MakeFunction { qualname, cell_count: 0, defaults_count: 0 } if qualname == "add"
    )));
    let first = events.first().expect("a module frame dispatches instructions");
    assert!(matches!(
        first,
        TraceEvent::Instruction {
            offset: 0,
            opcode: Opcode::LoadConst,
            stack_depth: 0,
            ..
        }
    ));
}

/// The profiling tracer counts instructions and call depth.
#[test]
fn profiling_tracer_reports_execution_statistics() {
    let add = add_code();
    let mut vm = Vm::new(NoImports, ProfilingTracer::new());
    vm.run_module(Rc::new(add_and_call(Value::Int(1), Value::Int(2), &add)), Namespace::new())
        .unwrap();
    let tracer = vm.into_tracer();
    assert!(tracer.instructions > 0);
    assert_eq!(tracer.max_call_depth, 1);
    assert_eq!(tracer.functions_made, 1);
    assert_eq!(tracer.opcode_counts.get(&Opcode::BinaryAdd), Some(&1));
    assert!(tracer.report().contains("instructions"));
}
