//! The unbox binding calculator (`spec.md` §4.4.1): managed value to native
//! slots. Used for arguments on the downcall side and for the return value
//! on the upcall side.

use smallvec::SmallVec;

use crate::binding::{Binding, BindingList, PrimType};
use crate::calculator::{RegKind, StorageCalculator};
use crate::classify::TypeClass;
use crate::descriptor::Carrier;
use crate::error::ArrangerResult;
use crate::layout::{GroupLayout, MemoryLayout};
use crate::platform::PlatformPolicy;
use crate::storage::VMStorage;
use crate::util::ceil_div8;

pub struct UnboxCalculator {
    pub(crate) storage: StorageCalculator,
    platform: &'static dyn PlatformPolicy,
}

impl UnboxCalculator {
    pub fn new(platform: &'static dyn PlatformPolicy, for_arguments: bool, for_variadic_function: bool) -> Self {
        UnboxCalculator {
            storage: StorageCalculator::new(platform, for_arguments, for_variadic_function),
            platform,
        }
    }

    pub fn storage_calculator(&mut self) -> &mut StorageCalculator {
        &mut self.storage
    }

    /// Reserve x8 for the hidden indirect-result pointer: `unboxAddress`
    /// followed by a store to the fixed indirect-result register.
    pub fn get_indirect_bindings(&self) -> BindingList {
        let indirect = VMStorage::Integer(self.platform.abi_descriptor().indirect_result);
        SmallVec::from_vec(vec![Binding::UnboxAddress, Binding::VmStore(indirect, PrimType::I64)])
    }

    pub fn get_bindings(&mut self, carrier: Carrier, layout: &MemoryLayout) -> ArrangerResult<BindingList> {
        let class = self.platform.classify_for_bindings(layout, self.storage.for_variadic_function());
        match class {
            TypeClass::Integer | TypeClass::Float => {
                assert!(!carrier.is_buffer(), "scalar class {class:?} requires a scalar carrier, got {carrier:?}");
                let kind = if class == TypeClass::Float { RegKind::Vector } else { RegKind::Integer };
                let storage = self.storage.next_storage(kind, layout)?;
                Ok(SmallVec::from_vec(vec![Binding::VmStore(storage, carrier.scalar_prim())]))
            }
            TypeClass::Pointer => {
                let storage = self.storage.next_storage(RegKind::Integer, layout)?;
                Ok(SmallVec::from_vec(vec![Binding::UnboxAddress, Binding::VmStore(storage, PrimType::I64)]))
            }
            TypeClass::StructRegister => {
                assert!(carrier.is_buffer(), "STRUCT_REGISTER requires a buffer carrier, got {carrier:?}");
                let group = layout.as_group().expect("STRUCT_REGISTER class implies a group layout");
                self.unbox_struct_register(group)
            }
            TypeClass::StructHfa => {
                assert!(carrier.is_buffer(), "STRUCT_HFA requires a buffer carrier, got {carrier:?}");
                let group = layout.as_group().expect("STRUCT_HFA class implies a group layout");
                self.unbox_struct_hfa(group)
            }
            TypeClass::StructReference => {
                assert!(carrier.is_buffer(), "STRUCT_REFERENCE requires a buffer carrier, got {carrier:?}");
                let storage = self.storage.next_storage(RegKind::Integer, layout)?;
                Ok(SmallVec::from_vec(vec![
                    Binding::Copy(layout.clone()),
                    Binding::UnboxAddress,
                    Binding::VmStore(storage, PrimType::I64),
                ]))
            }
        }
    }

    fn unbox_struct_register(&mut self, group: &GroupLayout) -> ArrangerResult<BindingList> {
        let size = group.byte_size;
        let n_slices = ceil_div8(size);

        if self.platform.spills_variadic_structs_partially() && self.storage.in_variadic_section() {
            let (regs, covered) = self.storage.reg_alloc_partial(RegKind::Integer, n_slices);
            // Combine the register slices and the stack tail into one slot
            // list before emitting: `dup` must precede every slice but the
            // last *overall*, not the last of each sub-range, or the struct
            // reference is consumed before the tail's `bufferLoad` runs.
            let mut slots: SmallVec<[VMStorage; 4]> = regs;
            let mut offset = covered;
            while offset < size {
                let copy = (size - offset).min(8);
                slots.push(self.storage.stack_alloc_sized(copy, 8)?);
                offset += copy;
            }
            let mut out = BindingList::new();
            push_register_slices(&mut out, &slots, size);
            if self.platform.requires_sub_slot_stack_packing() {
                self.storage.align_stack(8);
            }
            return Ok(out);
        }

        match self.storage.reg_alloc(RegKind::Integer, n_slices) {
            Some(regs) => {
                let mut out = BindingList::new();
                push_register_slices(&mut out, &regs, size);
                Ok(out)
            }
            None => self.spill_whole(size),
        }
    }

    fn unbox_struct_hfa(&mut self, group: &GroupLayout) -> ArrangerResult<BindingList> {
        let leaves = group.flatten_scalar_leaves();
        let field_layouts: Vec<MemoryLayout> = leaves.iter().map(|(leaf, _)| MemoryLayout::Scalar(*leaf)).collect();
        match self.storage.next_storage_for_hfa(leaves.len(), &field_layouts)? {
            Some(field_storage) => {
                let mut out = BindingList::new();
                let n = leaves.len();
                for (i, ((leaf, offset), storage)) in leaves.iter().zip(field_storage.iter()).enumerate() {
                    if i + 1 != n {
                        out.push(Binding::Dup);
                    }
                    let prim = PrimType::for_float_byte_count(leaf.byte_size);
                    out.push(Binding::BufferLoad(*offset, prim));
                    out.push(Binding::VmStore(*storage, prim));
                }
                Ok(out)
            }
            None => self.spill_whole(group.byte_size),
        }
    }

    fn spill_whole(&mut self, size: u32) -> ArrangerResult<BindingList> {
        let mut out = BindingList::new();
        self.spill_tail(&mut out, 0, size)?;
        Ok(out)
    }

    /// Spill `[start, size)` of a struct to the stack, 8 bytes at a time.
    /// `dup` precedes every slice but the last; the trailing realignment
    /// matters on macOS so a sub-8-byte struct's tail doesn't leak as
    /// packing space for the following scalar.
    fn spill_tail(&mut self, out: &mut BindingList, start: u32, size: u32) -> ArrangerResult<()> {
        let mut offset = start;
        while offset < size {
            let copy = (size - offset).min(8);
            let slot = self.storage.stack_alloc_sized(copy, 8)?;
            if offset + 8 < size {
                out.push(Binding::Dup);
            }
            let prim = PrimType::for_byte_count(copy);
            out.push(Binding::BufferLoad(offset as i64, prim));
            out.push(Binding::VmStore(slot, prim));
            offset += 8;
        }
        if self.platform.requires_sub_slot_stack_packing() {
            self.storage.align_stack(8);
        }
        Ok(())
    }
}

fn push_register_slices(out: &mut BindingList, regs: &[VMStorage], size: u32) {
    let n = regs.len();
    for (i, reg) in regs.iter().enumerate() {
        let offset = i as i64 * 8;
        let remaining = size as i64 - offset;
        let chunk = remaining.min(8) as u32;
        let is_last = i + 1 == n;
        if !is_last {
            out.push(Binding::Dup);
        }
        let prim = PrimType::for_byte_count(chunk);
        out.push(Binding::BufferLoad(offset, prim));
        out.push(Binding::VmStore(*reg, prim));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LINUX_POLICY, MACOS_POLICY, WINDOWS_POLICY};
    use crate::storage::RegisterId;

    #[test]
    fn integer_scalar_goes_to_x0() {
        let mut u = UnboxCalculator::new(&LINUX_POLICY, true, false);
        let bindings = u.get_bindings(Carrier::Integer, &MemoryLayout::int(4)).unwrap();
        assert_eq!(bindings, SmallVec::from_vec(vec![Binding::VmStore(VMStorage::Integer(RegisterId(0)), PrimType::I64)]));
    }

    #[test]
    fn pointer_is_unboxed_then_stored_as_integer() {
        let mut u = UnboxCalculator::new(&LINUX_POLICY, true, false);
        let bindings = u.get_bindings(Carrier::Address, &MemoryLayout::pointer()).unwrap();
        assert_eq!(
            bindings,
            SmallVec::from_vec(vec![Binding::UnboxAddress, Binding::VmStore(VMStorage::Integer(RegisterId(0)), PrimType::I64)])
        );
    }

    #[test]
    fn sixteen_byte_struct_after_seven_ints_spills_whole_struct_no_splitting() {
        let mut u = UnboxCalculator::new(&LINUX_POLICY, true, false);
        for _ in 0..7 {
            u.get_bindings(Carrier::Integer, &MemoryLayout::int(8)).unwrap();
        }
        let s = GroupLayout::of_struct(vec![MemoryLayout::int(8), MemoryLayout::int(8)]);
        let bindings = u.get_bindings(Carrier::Buffer, &MemoryLayout::Group(s)).unwrap();
        // x7 must not be used: the struct is entirely on the stack.
        for b in &bindings {
            if let Binding::VmStore(storage, _) = b {
                assert_ne!(*storage, VMStorage::Integer(RegisterId(7)));
            }
        }
        assert_eq!(u.storage.stack_offset(), 16);
    }

    #[test]
    fn macos_variadic_struct_tail_realigns_stack() {
        let mut u = UnboxCalculator::new(&MACOS_POLICY, true, true);
        u.storage.adjust_for_var_args();
        let s = GroupLayout::of_struct(vec![MemoryLayout::int(4)]).with_explicit_size(4);
        u.get_bindings(Carrier::Buffer, &MemoryLayout::Group(s)).unwrap();
        assert_eq!(u.storage.stack_offset() % 8, 0);
    }

    #[test]
    fn windows_variadic_twelve_byte_struct_partially_spills() {
        let mut u = UnboxCalculator::new(&WINDOWS_POLICY, true, true);
        for _ in 0..7 {
            u.get_bindings(Carrier::Integer, &MemoryLayout::int(8)).unwrap();
        }
        u.storage.adjust_for_var_args();
        let s = GroupLayout::of_struct(vec![MemoryLayout::int(4), MemoryLayout::int(4), MemoryLayout::int(4)]);
        let bindings = u.get_bindings(Carrier::Buffer, &MemoryLayout::Group(s)).unwrap();
        let has_x7_store = bindings.iter().any(|b| matches!(b, Binding::VmStore(VMStorage::Integer(RegisterId(7)), _)));
        assert!(has_x7_store, "the one remaining register (x7) should be used");
        assert!(u.storage.stack_offset() > 0, "the remainder should spill to the stack");
    }
}
