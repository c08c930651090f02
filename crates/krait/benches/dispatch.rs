//! Dispatch-loop benchmarks: a counting loop (jump + compare + cached
//! arithmetic) and a recursive call chain (frame setup + binding).

use std::rc::Rc;

use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use krait::{Code, CodeBuilder, CompareKind, Namespace, Opcode, Signature, Value, Vm};

/// Verifies the expected result once, then measures repeated executions of
/// the same code object (warm caches, fresh namespaces).
fn run_module(bench: &mut Bencher, code: Code, expected: i64) {
    let code = Rc::new(code);
    let mut vm = Vm::default();
    let first = vm.run_module(Rc::clone(&code), Namespace::new()).unwrap();
    assert_eq!(first, Value::Int(expected));

    bench.iter(|| {
        let result = vm.run_module(Rc::clone(&code), Namespace::new()).unwrap();
        black_box(result);
    });
}

/// `i = 0; total = 0; while i < n: total += i; i += 1; return total`
fn counting_loop(n: i64) -> Code {
    let mut b = CodeBuilder::new("<bench>");
    let zero = b.const_(Value::Int(0));
    let one = b.const_(Value::Int(1));
    let limit = b.const_(Value::Int(n));
    let i = b.local("i");
    let total = b.local("total");

    b.emit_arg(Opcode::LoadConst, zero);
    b.emit_arg(Opcode::StoreFast, i);
    b.emit_arg(Opcode::LoadConst, zero);
    b.emit_arg(Opcode::StoreFast, total);
    let top = b.mark();
    b.emit_arg(Opcode::LoadFast, i);
    b.emit_arg(Opcode::LoadConst, limit);
    b.emit_arg(Opcode::CompareOp, CompareKind::Lt as u32);
    let out = b.emit_jump(Opcode::PopJumpIfFalse);
    b.emit_arg(Opcode::LoadFast, total);
    b.emit_arg(Opcode::LoadFast, i);
    b.emit(Opcode::BinaryAdd);
    b.emit_arg(Opcode::StoreFast, total);
    b.emit_arg(Opcode::LoadFast, i);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit(Opcode::BinaryAdd);
    b.emit_arg(Opcode::StoreFast, i);
    b.emit_arg(Opcode::JumpAbsolute, top);
    b.patch_jump(out);
    b.emit_arg(Opcode::LoadFast, total);
    b.emit(Opcode::ReturnValue);
    b.finish()
}

/// `def f(n): return n if n == 0 else f(n - 1)` called with `depth`.
fn recursive_countdown(depth: i64) -> Code {
    let mut f = CodeBuilder::new("f");
    f.set_signature(Signature::positional(&["n"]));
    let n = f.local("n");
    let zero = f.const_(Value::Int(0));
    let one = f.const_(Value::Int(1));
    let f_name = f.name("f");
    f.emit_arg(Opcode::LoadFast, n);
    f.emit_arg(Opcode::LoadConst, zero);
    f.emit_arg(Opcode::CompareOp, CompareKind::Eq as u32);
    let recurse = f.emit_jump(Opcode::PopJumpIfFalse);
    f.emit_arg(Opcode::LoadFast, n);
    f.emit(Opcode::ReturnValue);
    f.patch_jump(recurse);
    f.emit_arg(Opcode::LoadGlobal, f_name);
    f.emit_arg(Opcode::LoadFast, n);
    f.emit_arg(Opcode::LoadConst, one);
    f.emit(Opcode::BinarySubtract);
    f.emit_arg(Opcode::CallFunction, 1);
    f.emit(Opcode::ReturnValue);
    let f = Rc::new(f.finish());

    let mut b = CodeBuilder::new("<bench>");
    let code_k = b.const_(Value::Code(f));
    let qual_k = b.const_(Value::from("f"));
    let f_name = b.name("f");
    let depth_k = b.const_(Value::Int(depth));
    b.emit_arg(Opcode::LoadConst, code_k);
    b.emit_arg(Opcode::LoadConst, qual_k);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::StoreName, f_name);
    b.emit_arg(Opcode::LoadName, f_name);
    b.emit_arg(Opcode::LoadConst, depth_k);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit(Opcode::ReturnValue);
    b.finish()
}

fn bench_dispatch(c: &mut Criterion) {
    c.bench_function("counting_loop_10k", |b| {
        run_module(b, counting_loop(10_000), (0..10_000).sum());
    });
    c.bench_function("recursive_calls_500", |b| {
        run_module(b, recursive_countdown(500), 0);
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
