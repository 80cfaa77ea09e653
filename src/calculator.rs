//! The storage calculator (`spec.md` §4.2): the stateful per-call allocator
//! of registers and stack slots. One instance is owned by each binding
//! calculator and never outlives a single `getBindings` call — "stateful
//! allocator, stateless arranger" (`spec.md` §9).

use smallvec::SmallVec;

use crate::error::{ArrangerError, ArrangerResult};
use crate::layout::MemoryLayout;
use crate::platform::PlatformPolicy;
use crate::storage::{RegisterId, VMStorage};
use crate::util::align_up_i64;

/// Sanity bound on the accumulated outgoing stack-argument area, matching
/// `cranelift-codegen`'s own 128 MB limit on `compute_arg_locs`'s stack
/// size, which guards downstream 32-bit offset arithmetic from overflowing.
pub const STACK_ARG_RET_SIZE_LIMIT: i64 = 128 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegKind {
    Integer,
    Vector,
}

pub struct StorageCalculator {
    platform: &'static dyn PlatformPolicy,
    for_arguments: bool,
    for_variadic_function: bool,
    n_regs: [usize; 2],
    stack_offset: i64,
    for_var_args: bool,
}

fn kind_index(kind: RegKind) -> usize {
    match kind {
        RegKind::Integer => 0,
        RegKind::Vector => 1,
    }
}

impl StorageCalculator {
    pub fn new(platform: &'static dyn PlatformPolicy, for_arguments: bool, for_variadic_function: bool) -> Self {
        StorageCalculator {
            platform,
            for_arguments,
            for_variadic_function,
            n_regs: [0, 0],
            stack_offset: 0,
            for_var_args: false,
        }
    }

    pub fn for_variadic_function(&self) -> bool {
        self.for_variadic_function
    }

    pub fn in_variadic_section(&self) -> bool {
        self.for_var_args
    }

    pub fn stack_offset(&self) -> i64 {
        self.stack_offset
    }

    fn bank(&self, kind: RegKind) -> &'static [RegisterId; 8] {
        let abi = self.platform.abi_descriptor();
        match (self.for_arguments, kind) {
            (true, RegKind::Integer) => &abi.input_integer,
            (true, RegKind::Vector) => &abi.input_vector,
            (false, RegKind::Integer) => &abi.output_integer,
            (false, RegKind::Vector) => &abi.output_vector,
        }
    }

    fn make_storage(&self, kind: RegKind, reg: RegisterId) -> VMStorage {
        match kind {
            RegKind::Integer => VMStorage::Integer(reg),
            RegKind::Vector => VMStorage::Vector(reg),
        }
    }

    /// Allocate `count` consecutive registers of `kind`. Once a bank
    /// overflows for one argument it saturates closed (`nRegs[kind] = 8`)
    /// and stays closed for every later argument of that kind — no
    /// register-splitting across registers and stack (invariant 1, 2 of
    /// `spec.md` §3).
    pub fn reg_alloc(&mut self, kind: RegKind, count: usize) -> Option<SmallVec<[VMStorage; 4]>> {
        let idx = kind_index(kind);
        if self.n_regs[idx] + count <= 8 {
            let base = self.n_regs[idx];
            self.n_regs[idx] += count;
            let bank = self.bank(kind);
            Some((base..base + count).map(|i| self.make_storage(kind, bank[i])).collect())
        } else {
            self.n_regs[idx] = 8;
            None
        }
    }

    /// Windows-only: allocate as many registers of `kind` as remain (up to
    /// `n_slices`), and report how many bytes they cover. The caller is
    /// responsible for spilling whatever isn't covered.
    pub fn reg_alloc_partial(&mut self, kind: RegKind, n_slices: usize) -> (SmallVec<[VMStorage; 4]>, u32) {
        let idx = kind_index(kind);
        let available = 8usize.saturating_sub(self.n_regs[idx]);
        if available == 0 {
            return (SmallVec::new(), 0);
        }
        let take = n_slices.min(available);
        let base = self.n_regs[idx];
        self.n_regs[idx] += take;
        let bank = self.bank(kind);
        let regs: SmallVec<[VMStorage; 4]> = (base..base + take).map(|i| self.make_storage(kind, bank[i])).collect();
        (regs, (take * 8) as u32)
    }

    pub fn stack_alloc_sized(&mut self, size: u32, alignment: u32) -> ArrangerResult<VMStorage> {
        self.stack_offset = align_up_i64(self.stack_offset, alignment as i64);
        if size > u16::MAX as u32 {
            return Err(ArrangerError::StackSlotTooLarge(size));
        }
        let storage = VMStorage::Stack { offset: self.stack_offset, encoded_size: size as u16 };
        self.stack_offset += size as i64;
        if self.stack_offset > STACK_ARG_RET_SIZE_LIMIT {
            return Err(ArrangerError::StackArgRetSizeExceeded { actual: self.stack_offset, limit: STACK_ARG_RET_SIZE_LIMIT });
        }
        Ok(storage)
    }

    /// Allocate one stack slot sized and aligned for `layout`, per the
    /// platform's sub-slot-packing rule: sub-slot packing only applies
    /// outside the variadic section (so variadic arguments always get
    /// whole 8-byte-minimum slots, even on macOS).
    pub fn stack_alloc_layout(&mut self, layout: &MemoryLayout) -> ArrangerResult<VMStorage> {
        let alignment = if self.platform.requires_sub_slot_stack_packing() && !self.for_var_args {
            layout.byte_alignment()
        } else {
            layout.byte_alignment().max(8)
        };
        self.stack_alloc_sized(layout.byte_size(), alignment)
    }

    pub fn align_stack(&mut self, alignment: u32) {
        self.stack_offset = align_up_i64(self.stack_offset, alignment as i64);
    }

    /// Single-slot convenience: try one register of `kind`, else spill one
    /// slot sized for `layout`. On Windows, a variadic floating-point
    /// argument is rewritten to the integer bank before allocation.
    pub fn next_storage(&mut self, mut kind: RegKind, layout: &MemoryLayout) -> ArrangerResult<VMStorage> {
        if kind == RegKind::Vector
            && self.for_arguments
            && self.for_var_args
            && self.platform.use_int_regs_for_variadic_floating_point_args()
        {
            kind = RegKind::Integer;
        }
        if let Some(regs) = self.reg_alloc(kind, 1) {
            Ok(regs[0])
        } else {
            self.stack_alloc_layout(layout)
        }
    }

    /// Try to allocate `n_fields` vector registers, one per HFA leaf. On
    /// failure, if the platform packs sub-slot stack arguments and we're
    /// not in the variadic section, spill each field to its own tightly
    /// packed stack slot instead of the whole struct to one slot (so a
    /// 4-float HFA occupies 16 bytes, not 32). Otherwise return `None`,
    /// signaling the caller to fall back to the generic whole-struct spill.
    pub fn next_storage_for_hfa(&mut self, n_fields: usize, field_layouts: &[MemoryLayout]) -> ArrangerResult<Option<SmallVec<[VMStorage; 4]>>> {
        if let Some(regs) = self.reg_alloc(RegKind::Vector, n_fields) {
            return Ok(Some(regs));
        }
        if self.platform.requires_sub_slot_stack_packing() && !self.for_var_args {
            let mut out = SmallVec::new();
            for field in field_layouts {
                out.push(self.stack_alloc_layout(field)?);
            }
            return Ok(Some(out));
        }
        Ok(None)
    }

    /// Enter the variadic section: always sticky-sets `for_var_args`, but
    /// only closes both register banks (`nRegs[*] = 8`) when the platform
    /// routes variadic arguments entirely to the stack
    /// (`var_args_on_stack()`, macOS). On Windows, `var_args_on_stack()` is
    /// false: variadic arguments still compete for whatever registers
    /// remain, so the banks must stay open, or a variadic struct could never
    /// partially occupy the last few integer registers. Idempotent: once
    /// called, every later call on the same calculator is a no-op, since a
    /// closed bank stays saturated and `for_var_args` is already set.
    pub fn adjust_for_var_args(&mut self) {
        if !self.for_var_args {
            log::trace!("variadic section entered");
        }
        if self.platform.var_args_on_stack() {
            self.n_regs = [8, 8];
        }
        self.for_var_args = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LINUX_POLICY, MACOS_POLICY, WINDOWS_POLICY};

    fn calc(for_arguments: bool) -> StorageCalculator {
        StorageCalculator::new(&LINUX_POLICY, for_arguments, false)
    }

    #[test]
    fn register_allocation_is_consecutive_and_left_to_right() {
        let mut sc = calc(true);
        let regs = sc.reg_alloc(RegKind::Integer, 3).unwrap();
        assert_eq!(regs[0], VMStorage::Integer(RegisterId(0)));
        assert_eq!(regs[1], VMStorage::Integer(RegisterId(1)));
        assert_eq!(regs[2], VMStorage::Integer(RegisterId(2)));
    }

    #[test]
    fn overflowing_a_bank_closes_it_for_later_arguments() {
        let mut sc = calc(true);
        assert!(sc.reg_alloc(RegKind::Integer, 7).is_some());
        assert!(sc.reg_alloc(RegKind::Integer, 2).is_none());
        // Bank is now saturated even though only 7 were actually consumed.
        assert!(sc.reg_alloc(RegKind::Integer, 1).is_none());
    }

    #[test]
    fn stack_offsets_are_monotonically_non_decreasing() {
        let mut sc = calc(true);
        let s1 = sc.stack_alloc_sized(8, 8).unwrap();
        let s2 = sc.stack_alloc_sized(4, 4).unwrap();
        match (s1, s2) {
            (VMStorage::Stack { offset: o1, .. }, VMStorage::Stack { offset: o2, .. }) => assert!(o2 >= o1),
            _ => panic!("expected stack storages"),
        }
    }

    #[test]
    fn stack_slot_over_16_bits_is_an_error() {
        let mut sc = calc(true);
        let err = sc.stack_alloc_sized(u32::from(u16::MAX) + 1, 8).unwrap_err();
        assert_eq!(err, ArrangerError::StackSlotTooLarge(u32::from(u16::MAX) + 1));
    }

    #[test]
    fn adjust_for_var_args_is_idempotent() {
        let mut sc = StorageCalculator::new(&MACOS_POLICY, true, true);
        sc.reg_alloc(RegKind::Integer, 2).unwrap();
        sc.adjust_for_var_args();
        assert_eq!(sc.n_regs, [8, 8]);
        sc.adjust_for_var_args();
        assert_eq!(sc.n_regs, [8, 8]);
        assert!(sc.in_variadic_section());
    }

    #[test]
    fn adjust_for_var_args_keeps_registers_open_on_windows() {
        let mut sc = StorageCalculator::new(&WINDOWS_POLICY, true, true);
        sc.reg_alloc(RegKind::Integer, 7).unwrap();
        sc.adjust_for_var_args();
        assert_eq!(sc.n_regs, [7, 0], "Windows variadic arguments still compete for remaining registers");
        assert!(sc.in_variadic_section());
    }
}
