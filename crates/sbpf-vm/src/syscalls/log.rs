use crate::abi::{MAX_LOG_LEN, SYSCALL_BASE_COST};
use crate::error::Fault;
use crate::vm::SyscallContext;

/// `sol_log_(ptr, len)`: logs a message from VM memory.
pub fn log(ctx: &mut SyscallContext<'_, '_>, ptr: u64, len: u64) -> Result<u64, Fault> {
    if len > MAX_LOG_LEN {
        return Err(Fault::OutOfCompute);
    }
    ctx.compute.consume_lower_bound(SYSCALL_BASE_COST, len)?;

    let message = ctx.memory.slice(ptr, len)?;
    let line = format!("Program log: {}", String::from_utf8_lossy(message));
    ctx.log.log(line);
    Ok(0)
}

/// `sol_log_64_(r1..r5)`: logs five registers in hex.
pub fn log_64(ctx: &mut SyscallContext<'_, '_>, args: [u64; 5]) -> Result<u64, Fault> {
    ctx.compute.consume(SYSCALL_BASE_COST)?;
    let [a, b, c, d, e] = args;
    ctx.log
        .log(format!("Program log: {a:#x}, {b:#x}, {c:#x}, {d:#x}, {e:#x}"));
    Ok(0)
}

/// `sol_log_compute_units_()`: logs the remaining budget.
pub fn log_compute_units(ctx: &mut SyscallContext<'_, '_>) -> Result<u64, Fault> {
    ctx.compute.consume(SYSCALL_BASE_COST)?;
    let remaining = ctx.compute.remaining();
    ctx.log
        .log(format!("Program consumption: {remaining} units remaining"));
    Ok(0)
}

#[cfg(test)]
mod tests {
    use crate::abi::VADDR_INPUT;
    use crate::error::Fault;
    use crate::syscalls::Builtin;
    use crate::syscalls::tests::Host;

    #[test]
    fn test_log_message() {
        let mut host = Host::new(1000);
        host.memory.write(VADDR_INPUT, b"hello").unwrap();
        assert_eq!(host.call(Builtin::Log, [VADDR_INPUT, 5, 0, 0, 0]), Ok(0));
        assert_eq!(host.log.lines(), ["Program log: hello"]);
        assert_eq!(host.compute.remaining(), 900);
    }

    #[test]
    fn test_log_charges_base_cost_for_short_messages() {
        let mut host = Host::new(1000);
        assert_eq!(host.call(Builtin::Log, [VADDR_INPUT, 64, 0, 0, 0]), Ok(0));
        assert_eq!(host.compute.remaining(), 900);

        let mut host = Host::new(1000);
        host.call(Builtin::Log, [VADDR_INPUT, 0, 0, 0, 0]).unwrap();
        assert_eq!(host.log.lines(), ["Program log: "]);
    }

    #[test]
    fn test_log_bad_pointer() {
        let mut host = Host::new(1000);
        let err = host.call(Builtin::Log, [0x10, 4, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Fault::AccessViolation { addr: 0x10, .. }));
        assert!(host.log.lines().is_empty());
    }

    #[test]
    fn test_log_too_long_exhausts_budget() {
        let mut host = Host::new(u64::MAX);
        let err = host
            .call(Builtin::Log, [VADDR_INPUT, (1 << 30) + 1, 0, 0, 0])
            .unwrap_err();
        assert_eq!(err, Fault::OutOfCompute);
    }

    #[test]
    fn test_log_out_of_budget() {
        let mut host = Host::new(99);
        assert_eq!(
            host.call(Builtin::Log, [VADDR_INPUT, 1, 0, 0, 0]),
            Err(Fault::OutOfCompute)
        );
        assert!(host.log.lines().is_empty());
    }

    #[test]
    fn test_log_64_format() {
        let mut host = Host::new(1000);
        host.call(Builtin::Log64, [1, 2, 3, 4, 0xff]).unwrap();
        assert_eq!(host.log.lines(), ["Program log: 0x1, 0x2, 0x3, 0x4, 0xff"]);
        assert_eq!(host.compute.remaining(), 900);
    }

    #[test]
    fn test_log_compute_units() {
        let mut host = Host::new(1000);
        host.call(Builtin::LogComputeUnits, [0; 5]).unwrap();
        assert_eq!(host.log.lines(), ["Program consumption: 900 units remaining"]);
    }
}
