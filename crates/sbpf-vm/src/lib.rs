#![allow(
    clippy::cast_possible_truncation, // intentional: slot fields and register halves are narrowed with 'as'
    clippy::cast_possible_wrap, // intentional: immediates are reinterpreted between signed and unsigned
    clippy::cast_sign_loss, // intentional: signed offsets are applied to unsigned addresses
    clippy::missing_errors_doc // error enums document every failure
)]

pub mod abi;
pub mod error;
pub mod hash;
pub mod loader;
mod program;
pub mod sbf;
pub mod syscalls;
pub mod verifier;
pub mod vm;

/// Test harness module for writing unit and integration tests.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::{AccessReason, Error, Exception, Fault, LoadError, RegistryError, Result, VerifyError};
pub use loader::load;
pub use program::Program;
pub use sbf::Slot;
pub use syscalls::Builtin;
pub use verifier::verify;
pub use vm::{
    Interpreter, MemoryMap, Region, Syscall, SyscallContext, SyscallRegistry, VmOptions, VmState,
};
