//! Builtin syscalls: program logging and memory primitives.

mod log;
mod mem;

use crate::error::Fault;
use crate::hash::symbol_hash;
use crate::vm::SyscallContext;

/// The closed set of syscalls the VM implements itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Abort,
    Log,
    Log64,
    LogComputeUnits,
    Memcpy,
    Memmove,
    Memset,
    Memcmp,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Abort,
        Builtin::Log,
        Builtin::Log64,
        Builtin::LogComputeUnits,
        Builtin::Memcpy,
        Builtin::Memmove,
        Builtin::Memset,
        Builtin::Memcmp,
    ];

    /// Symbol name programs link against.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Log => "sol_log_",
            Self::Log64 => "sol_log_64_",
            Self::LogComputeUnits => "sol_log_compute_units_",
            Self::Memcpy => "sol_memcpy_",
            Self::Memmove => "sol_memmove_",
            Self::Memset => "sol_memset_",
            Self::Memcmp => "sol_memcmp_",
        }
    }

    #[must_use]
    pub fn hash(self) -> u32 {
        symbol_hash(self.name())
    }

    pub fn invoke(self, ctx: &mut SyscallContext<'_, '_>, args: [u64; 5]) -> Result<u64, Fault> {
        let [r1, r2, r3, r4, r5] = args;
        match self {
            Self::Abort => Err(Fault::Abort),
            Self::Log => log::log(ctx, r1, r2),
            Self::Log64 => log::log_64(ctx, [r1, r2, r3, r4, r5]),
            Self::LogComputeUnits => log::log_compute_units(ctx),
            Self::Memcpy => mem::memcpy(ctx, r1, r2, r3),
            Self::Memmove => mem::memmove(ctx, r1, r2, r3),
            Self::Memset => mem::memset(ctx, r1, r2, r3),
            Self::Memcmp => mem::memcmp(ctx, r1, r2, r3, r4),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vm::{ComputeMeter, LogCollector, MemoryMap};

    /// Owns everything a `SyscallContext` borrows.
    pub(crate) struct Host {
        pub memory: MemoryMap<'static>,
        pub compute: ComputeMeter,
        pub log: LogCollector,
    }

    impl Host {
        pub fn new(budget: u64) -> Self {
            Self {
                memory: MemoryMap::new(&[], 64, vec![0; 64]),
                compute: ComputeMeter::new(budget),
                log: LogCollector::new(),
            }
        }

        pub fn call(&mut self, builtin: Builtin, args: [u64; 5]) -> Result<u64, Fault> {
            let mut ctx = SyscallContext {
                memory: &mut self.memory,
                compute: &mut self.compute,
                log: &mut self.log,
            };
            builtin.invoke(&mut ctx, args)
        }
    }

    #[test]
    fn test_names_and_hashes() {
        assert_eq!(Builtin::Log.hash(), 0x2075_59bd);
        assert_eq!(Builtin::Log64.hash(), 0x5c2a_3178);
        assert_eq!(Builtin::Abort.hash(), 0xb6fc_1a11);
        assert_eq!(Builtin::Memcpy.hash(), 0x717c_c4a3);
    }

    #[test]
    fn test_abort() {
        let mut host = Host::new(100);
        assert_eq!(host.call(Builtin::Abort, [0; 5]), Err(Fault::Abort));
    }
}
