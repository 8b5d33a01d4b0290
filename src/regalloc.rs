//! Per-probe storage allocators consumed during code generation.
//!
//! Each probe compiles against a bank of three allocatable registers
//! and a downward-growing stack frame. Reservations last for the whole
//! compilation of the probe; neither allocator has a release operation.

use bitflags::bitflags;
use tracing::trace;

use crate::ast::{Ast, NodeId};

/// First register of the allocatable window. Lower registers are
/// clobbered across VM helper calls and the register above the window
/// is the read-only frame pointer.
pub const REG_FIRST: u8 = 6;
/// Last register of the allocatable window.
pub const REG_LAST: u8 = 8;

bitflags! {
    /// Availability mask over the allocatable register window.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RegSet: u16 {
        const R6 = 1 << 6;
        const R7 = 1 << 7;
        const R8 = 1 << 8;
    }
}

/// Which reservation pool an acquisition is charged against: registers
/// holding statically placed values, or dynamically computed
/// intermediates. Both pools draw from the same physical window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Static,
    Dynamic,
}

/// Register reservation state for one probe.
#[derive(Clone, Debug)]
pub struct RegBank {
    stat_regs: RegSet,
    dyn_regs: RegSet,
}

impl RegBank {
    /// A fresh bank with every register available to both categories.
    pub fn new() -> Self {
        Self {
            stat_regs: RegSet::all(),
            dyn_regs: RegSet::all(),
        }
    }

    /// Reserve the lowest register still available to `category`.
    ///
    /// A register is eligible only while its bit is set in both pools.
    /// Claiming it clears the bit in the requested pool alone, which
    /// removes the register from the intersection the other category
    /// tests. `None` means the window is exhausted and the caller must
    /// fall back to a stack slot.
    pub fn acquire(&mut self, category: Category) -> Option<u8> {
        let (pool, complement) = match category {
            Category::Static => (&mut self.stat_regs, self.dyn_regs),
            Category::Dynamic => (&mut self.dyn_regs, self.stat_regs),
        };

        for reg in REG_FIRST..=REG_LAST {
            let bit = RegSet::from_bits_truncate(1 << reg);
            if pool.contains(bit) && complement.contains(bit) {
                pool.remove(bit);
                trace!(reg, ?category, "register reserved");
                return Some(reg);
            }
        }

        trace!(?category, "register window exhausted");
        None
    }
}

impl Default for RegBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Downward-growing stack frame for one probe.
///
/// Offsets are displacements from the frame base and are never reused:
/// a monotonic bump allocator, not a push/pop discipline.
#[derive(Clone, Debug, Default)]
pub struct StackFrame {
    sp: isize,
}

impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `size` bytes, returning the new (negative) offset of the
    /// slot.
    pub fn acquire(&mut self, size: usize) -> isize {
        self.sp -= size as isize;
        trace!(size, offset = self.sp, "stack slot reserved");
        self.sp
    }

    /// The most recently returned offset.
    pub fn offset(&self) -> isize {
        self.sp
    }

    /// Total frame size consumed, for validation against the VM's stack
    /// limit.
    pub fn depth(&self) -> usize {
        self.sp.unsigned_abs()
    }
}

/// Reserve a register from the probe's bank. `None` when the bank is
/// exhausted or `probe` carries no allocator state.
pub fn probe_reg(ast: &Ast, probe: NodeId, category: Category) -> Option<u8> {
    let mut annot = ast.annot(probe)?.borrow_mut();
    annot.probe.as_mut()?.regs.acquire(category)
}

/// Reserve a stack slot in the probe's frame, returning its offset.
pub fn probe_stack(ast: &Ast, probe: NodeId, size: usize) -> Option<isize> {
    let mut annot = ast.annot(probe)?.borrow_mut();
    Some(annot.probe.as_mut()?.frame.acquire(size))
}
