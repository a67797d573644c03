use crate::abi::{BYTES_PER_COMPUTE_UNIT, MEM_OP_BASE_COST};
use crate::error::Fault;
use crate::vm::SyscallContext;

fn charge(ctx: &mut SyscallContext<'_, '_>, n: u64) -> Result<(), Fault> {
    ctx.compute
        .consume_lower_bound(MEM_OP_BASE_COST, n / BYTES_PER_COMPUTE_UNIT)
}

fn is_overlapping(a: u64, b: u64, n: u64) -> bool {
    a.abs_diff(b) < n
}

/// `sol_memcpy_(dst, src, n)`. Overlapping ranges fault before any byte moves.
pub fn memcpy(ctx: &mut SyscallContext<'_, '_>, dst: u64, src: u64, n: u64) -> Result<u64, Fault> {
    charge(ctx, n)?;
    if is_overlapping(dst, src, n) {
        return Err(Fault::CopyOverlapping);
    }
    copy(ctx, dst, src, n)
}

/// `sol_memmove_(dst, src, n)`.
pub fn memmove(ctx: &mut SyscallContext<'_, '_>, dst: u64, src: u64, n: u64) -> Result<u64, Fault> {
    charge(ctx, n)?;
    copy(ctx, dst, src, n)
}

fn copy(ctx: &mut SyscallContext<'_, '_>, dst: u64, src: u64, n: u64) -> Result<u64, Fault> {
    let data = ctx.memory.slice(src, n)?.to_vec();
    ctx.memory.write(dst, &data)?;
    Ok(0)
}

/// `sol_memset_(dst, byte, n)`.
pub fn memset(ctx: &mut SyscallContext<'_, '_>, dst: u64, byte: u64, n: u64) -> Result<u64, Fault> {
    charge(ctx, n)?;
    ctx.memory.slice_mut(dst, n)?.fill(byte as u8);
    Ok(0)
}

/// `sol_memcmp_(a, b, n, result)`: writes the difference of the first
/// mismatching bytes (or 0) as an `i32` to `result`.
pub fn memcmp(
    ctx: &mut SyscallContext<'_, '_>,
    a: u64,
    b: u64,
    n: u64,
    result: u64,
) -> Result<u64, Fault> {
    charge(ctx, n)?;
    let lhs = ctx.memory.slice(a, n)?;
    let rhs = ctx.memory.slice(b, n)?;
    let diff = lhs
        .iter()
        .zip(rhs)
        .find(|(x, y)| x != y)
        .map_or(0, |(&x, &y)| i32::from(x) - i32::from(y));
    ctx.memory.write_u32(result, diff as u32)?;
    Ok(0)
}
