//! Execution: address space, call stack, compute metering, syscall dispatch
//! and the interpreter loop that ties them together.

// Register values are reinterpreted between u64, i64, u32 and i32 constantly.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

mod compute;
mod interpreter;
mod log;
mod memory;
mod stack;
mod syscall;

pub use compute::ComputeMeter;
pub use interpreter::{Interpreter, VmState};
pub use log::LogCollector;
pub use memory::{MemoryMap, Region};
pub use stack::{CallStack, Frame};
pub use syscall::{Syscall, SyscallContext, SyscallRegistry};

use crate::abi::{DEFAULT_COMPUTE_BUDGET, DEFAULT_HEAP_SIZE};

/// Per-execution configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOptions {
    heap_size: usize,
    compute_budget: u64,
    input: Vec<u8>,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            heap_size: DEFAULT_HEAP_SIZE,
            compute_budget: DEFAULT_COMPUTE_BUDGET,
            input: Vec::new(),
        }
    }
}

impl VmOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_heap_size(mut self, heap_size: usize) -> Self {
        self.heap_size = heap_size;
        self
    }

    #[must_use]
    pub fn with_compute_budget(mut self, compute_budget: u64) -> Self {
        self.compute_budget = compute_budget;
        self
    }

    /// Bytes mapped at the start of the input region.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = input.into();
        self
    }

    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    #[must_use]
    pub fn compute_budget(&self) -> u64 {
        self.compute_budget
    }

    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.input
    }
}
