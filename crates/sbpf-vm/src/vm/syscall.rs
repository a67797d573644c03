use std::collections::HashMap;
use std::fmt;

use crate::error::{Fault, RegistryError};
use crate::hash::symbol_hash;
use crate::syscalls::Builtin;

use super::compute::ComputeMeter;
use super::log::LogCollector;
use super::memory::MemoryMap;

/// What a syscall may touch while it runs.
pub struct SyscallContext<'a, 'p> {
    pub memory: &'a mut MemoryMap<'p>,
    pub compute: &'a mut ComputeMeter,
    pub log: &'a mut LogCollector,
}

/// A host-provided syscall.
///
/// Receives r1-r5 and returns the value placed in r0. Costs are charged to
/// `ctx.compute` by the implementation itself.
pub trait Syscall {
    fn invoke(&self, ctx: &mut SyscallContext<'_, '_>, args: [u64; 5]) -> Result<u64, Fault>;
}

impl<F> Syscall for F
where
    F: Fn(&mut SyscallContext<'_, '_>, [u64; 5]) -> Result<u64, Fault>,
{
    fn invoke(&self, ctx: &mut SyscallContext<'_, '_>, args: [u64; 5]) -> Result<u64, Fault> {
        self(ctx, args)
    }
}

enum Handler {
    Builtin(Builtin),
    Host(Box<dyn Syscall + Send + Sync>),
}

struct Entry {
    name: String,
    handler: Handler,
}

/// Syscalls by name hash. Built once, then shared read-only across
/// executions.
#[derive(Default)]
pub struct SyscallRegistry {
    entries: HashMap<u32, Entry>,
}

impl fmt::Debug for SyscallRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("SyscallRegistry")
            .field("syscalls", &names)
            .finish()
    }
}

impl SyscallRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every [`Builtin`].
    ///
    /// Builtin names hash to distinct values, so none of them shadows
    /// another.
    #[must_use]
    pub fn with_builtins() -> Self {
        let entries = Builtin::ALL
            .into_iter()
            .map(|builtin| {
                let entry = Entry {
                    name: builtin.name().to_string(),
                    handler: Handler::Builtin(builtin),
                };
                (builtin.hash(), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn register_builtin(&mut self, builtin: Builtin) -> Result<u32, RegistryError> {
        self.insert(builtin.name(), Handler::Builtin(builtin))
    }

    /// Registers a host syscall under `name`.
    pub fn register<S>(&mut self, name: &str, syscall: S) -> Result<u32, RegistryError>
    where
        S: Syscall + Send + Sync + 'static,
    {
        self.insert(name, Handler::Host(Box::new(syscall)))
    }

    fn insert(&mut self, name: &str, handler: Handler) -> Result<u32, RegistryError> {
        let hash = symbol_hash(name);
        if self.entries.contains_key(&hash) {
            return Err(RegistryError::Duplicate {
                name: name.to_string(),
                hash,
            });
        }
        self.entries.insert(
            hash,
            Entry {
                name: name.to_string(),
                handler,
            },
        );
        Ok(hash)
    }

    #[must_use]
    pub fn contains(&self, hash: u32) -> bool {
        self.entries.contains_key(&hash)
    }

    #[must_use]
    pub fn name(&self, hash: u32) -> Option<&str> {
        self.entries.get(&hash).map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the syscall registered under `hash`, or returns `None` if there
    /// is none.
    pub fn dispatch(
        &self,
        hash: u32,
        ctx: &mut SyscallContext<'_, '_>,
        args: [u64; 5],
    ) -> Option<Result<u64, Fault>> {
        let entry = self.entries.get(&hash)?;
        Some(match &entry.handler {
            Handler::Builtin(builtin) => builtin.invoke(ctx, args),
            Handler::Host(syscall) => syscall.invoke(ctx, args),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn zero(_: &mut SyscallContext<'_, '_>, _: [u64; 5]) -> Result<u64, Fault> {
        Ok(0)
    }

    fn sum(_: &mut SyscallContext<'_, '_>, args: [u64; 5]) -> Result<u64, Fault> {
        Ok(args.iter().sum())
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = SyscallRegistry::new();
        let hash = registry.register_builtin(Builtin::Abort).unwrap();
        assert_eq!(hash, symbol_hash("abort"));
        let err = registry.register("abort", zero).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                name: "abort".into(),
                hash
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_builtin_hashes_distinct() {
        let hashes: HashSet<u32> = Builtin::ALL.iter().map(|b| b.hash()).collect();
        assert_eq!(hashes.len(), Builtin::ALL.len());

        let mut registry = SyscallRegistry::new();
        for builtin in Builtin::ALL {
            assert_eq!(registry.register_builtin(builtin), Ok(builtin.hash()));
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = SyscallRegistry::with_builtins();
        assert_eq!(registry.len(), Builtin::ALL.len());
        for builtin in Builtin::ALL {
            assert_eq!(registry.name(builtin.hash()), Some(builtin.name()));
        }
    }

    #[test]
    fn test_dispatch_host_syscall() {
        let mut registry = SyscallRegistry::new();
        let hash = registry.register("add", sum).unwrap();

        let mut memory = MemoryMap::new(&[], 0, Vec::new());
        let mut compute = ComputeMeter::new(10);
        let mut log = LogCollector::new();
        let mut ctx = SyscallContext {
            memory: &mut memory,
            compute: &mut compute,
            log: &mut log,
        };
        assert_eq!(registry.dispatch(hash, &mut ctx, [1, 2, 3, 4, 5]), Some(Ok(15)));
        assert_eq!(registry.dispatch(hash ^ 1, &mut ctx, [0; 5]), None);
    }
}
