//! Property-based tests for the SBF VM.
//!
//! Uses `proptest` to generate random inputs and verify invariants:
//! - Slots decode back to the fields they were built from
//! - The verifier and the loader never panic, whatever the bytes
//! - Verified programs run to a result or a fault, deterministically
//! - Every executed instruction costs exactly one compute unit
//! - Memory accesses never cross from one region into another

use proptest::prelude::*;
use sbpf_vm::abi::REGION_SHIFT;
use sbpf_vm::test_harness::*;
use sbpf_vm::vm::{MemoryMap, Region};

fn slot_strategy() -> impl Strategy<Value = Slot> {
    (any::<u8>(), 0u8..16, 0u8..16, any::<i16>(), any::<i32>())
        .prop_map(|(opcode, dst, src, off, imm)| Slot::new(opcode, dst, src, off, imm))
}

/// One instruction a program generator may emit. Jumps only go forward so
/// that generated programs terminate without relying on the budget.
fn instruction_strategy() -> impl Strategy<Value = Slot> {
    let reg = 0u8..10;
    let alu = prop_oneof![
        Just(op::ADD64_IMM),
        Just(op::SUB32_IMM),
        Just(op::MUL64_IMM),
        Just(op::OR32_IMM),
        Just(op::AND64_IMM),
        Just(op::XOR32_IMM),
        Just(op::MOV64_IMM),
        Just(op::MOV32_IMM),
        Just(op::DIV64_IMM),
        Just(op::SDIV32_IMM),
        Just(op::MOD32_IMM),
    ];
    let alu_reg = prop_oneof![
        Just(op::ADD32_REG),
        Just(op::SUB64_REG),
        Just(op::MUL32_REG),
        Just(op::DIV64_REG),
        Just(op::MOD64_REG),
        Just(op::SDIV64_REG),
        Just(op::LSH64_REG),
        Just(op::RSH32_REG),
        Just(op::ARSH64_REG),
        Just(op::MOV64_REG),
    ];
    let memory = prop_oneof![
        Just(op::LDXB),
        Just(op::LDXDW),
        Just(op::STXW),
        Just(op::STH),
        Just(op::STDW),
    ];
    let jump = prop_oneof![
        Just(op::JEQ_IMM),
        Just(op::JGT_REG),
        Just(op::JSLT_IMM),
        Just(op::JSET_REG),
        Just(op::JA),
    ];

    prop_oneof![
        (alu, reg.clone(), any::<i32>())
            .prop_map(|(opcode, dst, imm)| Slot::new(opcode, dst, 0, 0, imm)),
        (alu_reg, reg.clone(), 0u8..11)
            .prop_map(|(opcode, dst, src)| Slot::new(opcode, dst, src, 0, 0)),
        (reg.clone(), 0u8..64).prop_map(|(dst, shift)| {
            Slot::new(op::LSH64_IMM, dst, 0, 0, i32::from(shift))
        }),
        (reg.clone(), prop_oneof![Just(16), Just(32), Just(64)])
            .prop_map(|(dst, width)| Slot::new(op::BE, dst, 0, 0, width)),
        (memory, 0u8..11, 0u8..11, -64i16..64, any::<i32>())
            .prop_map(|(opcode, dst, src, off, imm)| Slot::new(opcode, dst, src, off, imm)),
        (jump, reg, 0u8..11, 0i16..4, any::<i32>())
            .prop_map(|(opcode, dst, src, off, imm)| Slot::new(opcode, dst, src, off, imm)),
        Just(Slot::new(op::NEG32, 1, 0, 0, 0)),
    ]
}

fn program_strategy() -> impl Strategy<Value = Asm> {
    prop::collection::vec(instruction_strategy(), 1..40).prop_map(|slots| {
        let mut asm = Asm::new();
        for slot in slots {
            asm = asm.ins(slot.opcode(), slot.dst(), slot.src(), slot.off(), slot.imm());
        }
        // Forward jumps past the end land on one of these.
        (0..4).fold(asm, |asm, _| asm.exit())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn slot_fields_survive_encoding(slot in slot_strategy()) {
        let decoded = Slot::from_bytes(slot.to_bytes());
        prop_assert_eq!(decoded, slot);
        prop_assert_eq!(decoded.raw().to_le_bytes(), slot.to_bytes());
    }

    #[test]
    fn verifier_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let result = sbpf_vm::verify(&bytes);
        if bytes.is_empty() || bytes.len() % 8 != 0 {
            prop_assert!(result.is_err());
        }
        if let Err(err) = result {
            if let Some(pc) = err.pc() {
                prop_assert!(pc < bytes.len() / 8);
            }
        }
    }

    #[test]
    fn verified_programs_run_to_completion(asm in program_strategy()) {
        let program = assemble(&asm);
        prop_assume!(program.verify().is_ok());

        let options = VmOptions::default()
            .with_compute_budget(200)
            .with_input(vec![0xab; 64]);
        let first = run_program(&program, options.clone());
        let second = run_program(&program, options);
        prop_assert_eq!(&first, &second);

        prop_assert_eq!(first.compute_used + first.compute_remaining, 200);
        if let Err(exception) = &first.result {
            prop_assert!(exception.pc < asm.len() as u64);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn each_instruction_costs_one_unit(n in 1usize..200, value in any::<i32>()) {
        let asm = (0..n).fold(Asm::new(), |asm, _| asm.mov64_imm(0, value)).exit();
        let program = assemble(&asm);

        let outcome = run_program(&program, VmOptions::default());
        prop_assert_eq!(outcome.result, Ok(i64::from(value) as u64));
        prop_assert_eq!(outcome.compute_used, n as u64 + 1);

        let outcome = run_program(&program, VmOptions::default().with_compute_budget(n as u64));
        prop_assert_eq!(
            outcome.result,
            Err(Exception { pc: n as u64, fault: Fault::OutOfCompute })
        );
        prop_assert_eq!(outcome.compute_remaining, 0);
    }

    #[test]
    fn loader_never_panics_on_mutated_images(
        edits in prop::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 1..8),
    ) {
        let asm = Asm::new().mov64_imm(0, 1).call_unresolved().call(0).exit();
        let mut bytes = ElfBuilder::new(&asm)
            .rodata(&[7; 24])
            .syscall_reloc(1, "sol_log_")
            .data_relative_reloc(0, 8)
            .build();
        for (index, value) in edits {
            let at = index.index(bytes.len());
            bytes[at] = value;
        }
        if let Ok(program) = sbpf_vm::load(&bytes) {
            prop_assert!(program.slot_count() > 0);
            prop_assert!((program.entry_pc() as usize) < program.slot_count());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn writes_stay_inside_their_region(
        region in 0u64..6,
        offset in 0u64..0x9000,
        value in any::<u64>(),
    ) {
        let program = [0x11u8; 64];
        let mut memory = MemoryMap::new(&program, 0x100, vec![0x22; 0x100]);
        let addr = (region << REGION_SHIFT) + offset;

        match memory.write_u64(addr, value) {
            Ok(()) => {
                let written = Region::of(addr);
                prop_assert!(matches!(written, Some(Region::Stack | Region::Heap | Region::Input)));
                prop_assert_eq!(memory.read_u64(addr), Ok(value));
                if written != Some(Region::Heap) {
                    prop_assert!(memory.heap().iter().all(|&b| b == 0));
                }
                if written != Some(Region::Input) {
                    prop_assert!(memory.input().iter().all(|&b| b == 0x22));
                }
            }
            Err(Fault::AccessViolation { addr: at, size, write, .. }) => {
                prop_assert_eq!(at, addr);
                prop_assert_eq!(size, 8);
                prop_assert!(write);
                prop_assert!(memory.heap().iter().all(|&b| b == 0));
                prop_assert!(memory.input().iter().all(|&b| b == 0x22));
            }
            Err(other) => prop_assert!(false, "unexpected fault {other:?}"),
        }
    }
}
