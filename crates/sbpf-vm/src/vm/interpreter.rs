use crate::abi::{
    FIRST_ARG_REG, FIRST_SAVED_REG, FRAME_PTR_REG, INITIAL_FRAME_PTR, INSTRUCTION_COST,
    REGISTER_COUNT, RETURN_VALUE_REG, SAVED_REG_COUNT, SLOT_SIZE, VADDR_INPUT,
};
use crate::error::{Exception, Fault, VerifyError};
use crate::program::Program;
use crate::sbf::opcode as op;
use crate::sbf::{Slot, disassemble_slot};

use super::VmOptions;
use super::compute::ComputeMeter;
use super::log::LogCollector;
use super::memory::MemoryMap;
use super::stack::CallStack;
use super::syscall::{SyscallContext, SyscallRegistry};

/// Lifecycle of an [`Interpreter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Ready,
    Running,
    HaltedOk,
    HaltedFault,
}

/// Executes one verified [`Program`] once.
///
/// Registers, stack, heap and input are owned by the interpreter. The program
/// and the syscall registry are only borrowed, so any number of interpreters
/// can run the same program concurrently.
#[derive(Debug)]
pub struct Interpreter<'a> {
    program: &'a Program,
    syscalls: &'a SyscallRegistry,
    state: VmState,
    regs: [u64; REGISTER_COUNT],
    pc: u64,
    memory: MemoryMap<'a>,
    stack: CallStack,
    compute: ComputeMeter,
    log: LogCollector,
}

impl<'a> Interpreter<'a> {
    /// Prepares an execution. Fails if the program does not verify.
    pub fn new(
        program: &'a Program,
        syscalls: &'a SyscallRegistry,
        options: VmOptions,
    ) -> Result<Self, VerifyError> {
        program.verify()?;

        let VmOptions {
            heap_size,
            compute_budget,
            input,
        } = options;

        let mut regs = [0; REGISTER_COUNT];
        regs[usize::from(FIRST_ARG_REG)] = VADDR_INPUT;
        regs[usize::from(FRAME_PTR_REG)] = INITIAL_FRAME_PTR;

        Ok(Self {
            program,
            syscalls,
            state: VmState::Ready,
            regs,
            pc: program.entry_pc(),
            memory: MemoryMap::new(program.image(), heap_size, input),
            stack: CallStack::new(),
            compute: ComputeMeter::new(compute_budget),
            log: LogCollector::new(),
        })
    }

    /// Runs until `exit` from the entry frame (returning r0) or the first
    /// fault. Can only be called once.
    pub fn run(&mut self) -> Result<u64, Exception> {
        if self.state != VmState::Ready {
            return Err(Exception {
                pc: self.pc,
                fault: Fault::AlreadyExecuted,
            });
        }
        self.state = VmState::Running;

        let trace = tracing::enabled!(tracing::Level::TRACE);
        let result = loop {
            let pc = self.pc;
            match self.step(trace) {
                Ok(Some(ret)) => break Ok(ret),
                Ok(None) => {}
                Err(fault) => {
                    self.pc = pc;
                    break Err(Exception { pc, fault });
                }
            }
        };

        match &result {
            Ok(ret) => {
                self.state = VmState::HaltedOk;
                tracing::debug!(
                    ret,
                    compute_used = self.compute.used(),
                    "program exited"
                );
            }
            Err(exception) => {
                self.state = VmState::HaltedFault;
                tracing::debug!(
                    pc = exception.pc,
                    fault = %exception.fault,
                    compute_used = self.compute.used(),
                    "program faulted"
                );
            }
        }
        result
    }

    fn fetch(&self, pc: u64) -> Result<Slot, Fault> {
        usize::try_from(pc)
            .ok()
            .and_then(|pc| self.program.slot(pc))
            .ok_or(Fault::PcOutOfBounds(pc))
    }

    /// Executes one instruction. `Some(r0)` means the program exited.
    fn step(&mut self, trace: bool) -> Result<Option<u64>, Fault> {
        let pc = self.pc;
        let slot = self.fetch(pc)?;
        self.compute.consume(INSTRUCTION_COST)?;
        if trace {
            let next = usize::try_from(pc + 1)
                .ok()
                .and_then(|next| self.program.slot(next));
            tracing::trace!(pc, insn = %disassemble_slot(slot, next), "step");
        }
        self.pc = pc + 1;

        let dst = usize::from(slot.dst());
        let src = usize::from(slot.src());
        // Immediates are sign-extended to 64 bits before use.
        let imm = i64::from(slot.imm()) as u64;
        let off = i64::from(slot.off()) as u64;

        match slot.opcode() {
            op::LDDW => {
                let next = self.fetch(pc + 1)?;
                self.regs[dst] = u64::from(slot.uimm()) | (u64::from(next.uimm()) << 32);
                self.pc = pc + 2;
            }

            op::LDXB => {
                self.regs[dst] = u64::from(self.memory.read_u8(self.regs[src].wrapping_add(off))?);
            }
            op::LDXH => {
                self.regs[dst] = u64::from(self.memory.read_u16(self.regs[src].wrapping_add(off))?);
            }
            op::LDXW => {
                self.regs[dst] = u64::from(self.memory.read_u32(self.regs[src].wrapping_add(off))?);
            }
            op::LDXDW => {
                self.regs[dst] = self.memory.read_u64(self.regs[src].wrapping_add(off))?;
            }

            op::STB => self.memory.write_u8(self.regs[dst].wrapping_add(off), slot.uimm() as u8)?,
            op::STH => self.memory.write_u16(self.regs[dst].wrapping_add(off), slot.uimm() as u16)?,
            op::STW => self.memory.write_u32(self.regs[dst].wrapping_add(off), slot.uimm())?,
            op::STDW => self.memory.write_u64(self.regs[dst].wrapping_add(off), imm)?,
            op::STXB => {
                let value = self.regs[src] as u8;
                self.memory.write_u8(self.regs[dst].wrapping_add(off), value)?;
            }
            op::STXH => {
                let value = self.regs[src] as u16;
                self.memory.write_u16(self.regs[dst].wrapping_add(off), value)?;
            }
            op::STXW => {
                let value = self.regs[src] as u32;
                self.memory.write_u32(self.regs[dst].wrapping_add(off), value)?;
            }
            op::STXDW => {
                let value = self.regs[src];
                self.memory.write_u64(self.regs[dst].wrapping_add(off), value)?;
            }

            op::NEG32 => self.regs[dst] = i64::from((self.regs[dst] as i32).wrapping_neg()) as u64,
            op::NEG64 => self.regs[dst] = self.regs[dst].wrapping_neg(),
            op::MOV32_IMM => self.regs[dst] = u64::from(slot.uimm()),
            op::MOV32_REG => self.regs[dst] = self.regs[src] & 0xffff_ffff,
            op::LE => self.regs[dst] = to_le(self.regs[dst], slot.imm()),
            op::BE => self.regs[dst] = to_be(self.regs[dst], slot.imm()),

            opcode if opcode & 0x07 == op::CLASS_ALU => {
                let rhs = if opcode & op::SRC_X == 0 { imm } else { self.regs[src] };
                self.regs[dst] = alu32(opcode, self.regs[dst], rhs)?;
            }
            opcode if opcode & 0x07 == op::CLASS_ALU64 => {
                let rhs = if opcode & op::SRC_X == 0 { imm } else { self.regs[src] };
                self.regs[dst] = alu64(opcode, self.regs[dst], rhs)?;
            }

            op::JA => self.pc = self.pc.wrapping_add(off),
            op::CALL => self.call(slot.uimm())?,
            op::CALLX => {
                let addr = self.regs.get(slot.uimm() as usize).copied().unwrap_or_default();
                let target = self.callx_target(addr)?;
                self.push_frame(target)?;
            }
            op::EXIT => match self.stack.pop() {
                Some(frame) => {
                    let saved = usize::from(FIRST_SAVED_REG);
                    self.regs[saved..saved + SAVED_REG_COUNT].copy_from_slice(&frame.saved);
                    self.regs[usize::from(FRAME_PTR_REG)] = self.stack.frame_ptr();
                    self.pc = frame.return_pc;
                }
                None => return Ok(Some(self.regs[usize::from(RETURN_VALUE_REG)])),
            },

            opcode if op::is_jump(opcode) => {
                let rhs = if opcode & op::SRC_X == 0 { imm } else { self.regs[src] };
                if condition(opcode & 0xf0, self.regs[dst], rhs) {
                    self.pc = self.pc.wrapping_add(off);
                }
            }

            opcode => return Err(Fault::InvalidInstruction(opcode)),
        }

        Ok(None)
    }

    /// Syscalls take precedence over local functions sharing the same hash.
    fn call(&mut self, hash: u32) -> Result<(), Fault> {
        let mut ctx = SyscallContext {
            memory: &mut self.memory,
            compute: &mut self.compute,
            log: &mut self.log,
        };
        let first = usize::from(FIRST_ARG_REG);
        let mut args = [0; 5];
        let len = args.len();
        args.copy_from_slice(&self.regs[first..first + len]);
        if let Some(result) = self.syscalls.dispatch(hash, &mut ctx, args) {
            self.regs[usize::from(RETURN_VALUE_REG)] = result?;
            return Ok(());
        }

        let target = self
            .program
            .function(hash)
            .ok_or(Fault::UnknownCallTarget(hash))?;
        self.push_frame(target)
    }

    fn callx_target(&self, addr: u64) -> Result<u64, Fault> {
        addr.checked_sub(self.program.text_vaddr())
            .filter(|offset| offset % SLOT_SIZE as u64 == 0)
            .map(|offset| offset / SLOT_SIZE as u64)
            .filter(|&target| target < self.program.slot_count() as u64)
            .ok_or(Fault::CallxOutOfBounds(addr))
    }

    fn push_frame(&mut self, target: u64) -> Result<(), Fault> {
        let first = usize::from(FIRST_SAVED_REG);
        let mut saved = [0; SAVED_REG_COUNT];
        saved.copy_from_slice(&self.regs[first..first + SAVED_REG_COUNT]);
        self.regs[usize::from(FRAME_PTR_REG)] = self.stack.push(saved, self.pc)?;
        self.pc = target;
        Ok(())
    }

    #[must_use]
    pub fn registers(&self) -> &[u64; REGISTER_COUNT] {
        &self.regs
    }

    /// Slot index of the next instruction, or of the faulting one after a
    /// fault.
    #[must_use]
    pub fn pc(&self) -> u64 {
        self.pc
    }

    #[must_use]
    pub fn state(&self) -> VmState {
        self.state
    }

    #[must_use]
    pub fn compute_remaining(&self) -> u64 {
        self.compute.remaining()
    }

    #[must_use]
    pub fn compute_used(&self) -> u64 {
        self.compute.used()
    }

    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.stack.depth()
    }

    #[must_use]
    pub fn logs(&self) -> &[String] {
        self.log.lines()
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryMap<'a> {
        &self.memory
    }

    /// Consumes the interpreter, returning the input region and the log.
    #[must_use]
    pub fn into_output(self) -> (Vec<u8>, Vec<String>) {
        (self.memory.into_input(), self.log.into_lines())
    }
}

fn to_le(value: u64, width: i32) -> u64 {
    match width {
        16 => u64::from(value as u16),
        32 => u64::from(value as u32),
        _ => value,
    }
}

fn to_be(value: u64, width: i32) -> u64 {
    match width {
        16 => u64::from((value as u16).swap_bytes()),
        32 => u64::from((value as u32).swap_bytes()),
        _ => value.swap_bytes(),
    }
}

/// 32-bit ALU. add/sub/mul/neg/sdiv/arsh results are sign-extended to 64
/// bits; the bitwise and unsigned ops are zero-extended.
#[allow(clippy::match_same_arms)]
fn alu32(opcode: u8, lhs: u64, rhs: u64) -> Result<u64, Fault> {
    let (a, b) = (lhs as u32, rhs as u32);
    let signed = |v: i32| i64::from(v) as u64;
    Ok(match opcode & 0xf0 {
        op::ALU_ADD => signed((a as i32).wrapping_add(b as i32)),
        op::ALU_SUB => signed((a as i32).wrapping_sub(b as i32)),
        op::ALU_MUL => signed((a as i32).wrapping_mul(b as i32)),
        op::ALU_DIV => u64::from(a.checked_div(b).ok_or(Fault::DivideByZero)?),
        op::ALU_MOD => u64::from(a.checked_rem(b).ok_or(Fault::DivideByZero)?),
        op::ALU_SDIV => signed(signed_div(a as i32, b as i32)?),
        op::ALU_OR => u64::from(a | b),
        op::ALU_AND => u64::from(a & b),
        op::ALU_XOR => u64::from(a ^ b),
        op::ALU_LSH => u64::from(a.wrapping_shl(b)),
        op::ALU_RSH => u64::from(a.wrapping_shr(b)),
        op::ALU_ARSH => signed((a as i32).wrapping_shr(b)),
        op::ALU_MOV => u64::from(b),
        _ => return Err(Fault::InvalidInstruction(opcode)),
    })
}

#[allow(clippy::match_same_arms)]
fn alu64(opcode: u8, lhs: u64, rhs: u64) -> Result<u64, Fault> {
    Ok(match opcode & 0xf0 {
        op::ALU_ADD => lhs.wrapping_add(rhs),
        op::ALU_SUB => lhs.wrapping_sub(rhs),
        op::ALU_MUL => lhs.wrapping_mul(rhs),
        op::ALU_DIV => lhs.checked_div(rhs).ok_or(Fault::DivideByZero)?,
        op::ALU_MOD => lhs.checked_rem(rhs).ok_or(Fault::DivideByZero)?,
        op::ALU_SDIV => signed_div(lhs as i64, rhs as i64)? as u64,
        op::ALU_OR => lhs | rhs,
        op::ALU_AND => lhs & rhs,
        op::ALU_XOR => lhs ^ rhs,
        op::ALU_LSH => lhs.wrapping_shl(rhs as u32),
        op::ALU_RSH => lhs.wrapping_shr(rhs as u32),
        op::ALU_ARSH => (lhs as i64).wrapping_shr(rhs as u32) as u64,
        op::ALU_MOV => rhs,
        _ => return Err(Fault::InvalidInstruction(opcode)),
    })
}

trait SignedDiv: Copy + PartialEq {
    const ZERO: Self;
    const MIN: Self;
    const MINUS_ONE: Self;
    fn wrapping_div(self, rhs: Self) -> Self;
}

macro_rules! impl_signed_div {
    ($($t:ty),*) => {$(
        impl SignedDiv for $t {
            const ZERO: Self = 0;
            const MIN: Self = <$t>::MIN;
            const MINUS_ONE: Self = -1;
            fn wrapping_div(self, rhs: Self) -> Self {
                <$t>::wrapping_div(self, rhs)
            }
        }
    )*};
}

impl_signed_div!(i32, i64);

fn signed_div<T: SignedDiv>(lhs: T, rhs: T) -> Result<T, Fault> {
    if rhs == T::ZERO {
        return Err(Fault::DivideByZero);
    }
    if lhs == T::MIN && rhs == T::MINUS_ONE {
        return Err(Fault::DivideOverflow);
    }
    Ok(lhs.wrapping_div(rhs))
}

fn condition(operation: u8, lhs: u64, rhs: u64) -> bool {
    match operation {
        op::JMP_EQ => lhs == rhs,
        op::JMP_NE => lhs != rhs,
        op::JMP_GT => lhs > rhs,
        op::JMP_GE => lhs >= rhs,
        op::JMP_LT => lhs < rhs,
        op::JMP_LE => lhs <= rhs,
        op::JMP_SET => lhs & rhs != 0,
        op::JMP_SGT => (lhs as i64) > (rhs as i64),
        op::JMP_SGE => (lhs as i64) >= (rhs as i64),
        op::JMP_SLT => (lhs as i64) < (rhs as i64),
        op::JMP_SLE => (lhs as i64) <= (rhs as i64),
        _ => false,
    }
}
