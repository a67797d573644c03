//! Concurrent executions of one loaded program
//!
//! A `Program` and a `SyscallRegistry` are shared read-only; every thread
//! builds its own interpreter with its own input buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use sbpf_vm::test_harness::*;
use sbpf_vm::{Fault, SyscallContext};

/// Triples the u64 at the start of the input, writes it back, logs it and
/// returns it.
fn triple() -> Asm {
    Asm::new()
        .load(op::LDXDW, 6, 1, 0)
        .alu_imm(op::MUL64_IMM, 6, 3)
        .store_reg(op::STXDW, 1, 0, 6)
        .mov64_reg(1, 6)
        .syscall("sol_log_64_")
        .mov64_reg(0, 6)
        .exit()
}

#[test]
fn test_threads_share_program_and_registry() {
    let program = sbpf_vm::load(&ElfBuilder::new(&triple()).build()).expect("load");
    let syscalls = SyscallRegistry::with_builtins();

    let outcomes: Vec<(u64, Outcome)> = thread::scope(|scope| {
        let handles: Vec<_> = (1..=8u64)
            .map(|seed| {
                let program = &program;
                let syscalls = &syscalls;
                scope.spawn(move || {
                    let options = VmOptions::default().with_input(seed.to_le_bytes());
                    (seed, run_with(program, syscalls, options))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (seed, outcome) in outcomes {
        assert_eq!(outcome.result, Ok(seed * 3));
        assert_eq!(outcome.input, (seed * 3).to_le_bytes());
        assert_eq!(outcome.logs.len(), 1);
        assert!(
            outcome.logs[0].starts_with(&format!("Program log: {:#x}, ", seed * 3)),
            "{:?}",
            outcome.logs
        );
    }
}

#[test]
fn test_host_syscall_state_is_shared() {
    let counter = Arc::new(AtomicU64::new(0));
    let mut syscalls = SyscallRegistry::new();
    let seen = Arc::clone(&counter);
    syscalls
        .register(
            "count",
            move |_: &mut SyscallContext<'_, '_>, args: [u64; 5]| -> Result<u64, Fault> {
                Ok(seen.fetch_add(args[0], Ordering::SeqCst) + args[0])
            },
        )
        .unwrap();
    let syscalls = Arc::new(syscalls);
    let program = Arc::new(assemble(&Asm::new().mov64_imm(1, 1).syscall("count").exit()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let program = Arc::clone(&program);
            let syscalls = Arc::clone(&syscalls);
            thread::spawn(move || {
                (0..25)
                    .map(|_| run_with(&program, &syscalls, VmOptions::default()).result)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut results: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(|r| r.expect("run"))
        .collect();
    results.sort_unstable();
    assert_eq!(results, (1..=100).collect::<Vec<_>>());
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

#[test]
fn test_executions_are_independent() {
    // A fault in one execution leaves the shared program usable.
    let program = assemble(&Asm::new().load(op::LDXDW, 0, 1, 0).exit());
    let short = run_program(&program, VmOptions::default().with_input(vec![1, 2]));
    assert!(matches!(
        short.result,
        Err(Exception {
            pc: 0,
            fault: Fault::AccessViolation { .. }
        })
    ));
    let full = run_program(&program, VmOptions::default().with_input(7u64.to_le_bytes()));
    assert_eq!(full.result, Ok(7));
}
