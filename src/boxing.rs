//! The box binding calculator (`spec.md` §4.4.2): native slots to managed
//! value, the dual of [`crate::unbox::UnboxCalculator`]. Used for the return
//! value on the downcall side and for arguments on the upcall side.
//!
//! `forVariadicFunction` is always false here: upcalls from native code into
//! managed code don't encounter the variadic-specific routing, since the
//! variadic section is a decision the caller makes, not the callee.

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

pub struct BoxCalculator {
    pub(crate) storage: StorageCalculator,
    platform: &'static dyn PlatformPolicy,
}

impl BoxCalculator {
    pub fn new(platform: &'static dyn PlatformPolicy, for_arguments: bool) -> Self {
        BoxCalculator { storage: StorageCalculator::new(platform, for_arguments, false), platform }
    }

    pub fn storage_calculator(&mut self) -> &mut StorageCalculator {
        &mut self.storage
    }

    /// Load x8 and turn it into an unbounded buffer carrier: the caller
    /// owns the return buffer's allocation, so no bounds check on the
    /// pointee size is meaningful here — a deliberate trust boundary, not
    /// an oversight.
    pub fn get_indirect_bindings(&self) -> BindingList {
        let indirect = VMStorage::Integer(self.platform.abi_descriptor().indirect_result);
        SmallVec::from_vec(vec![Binding::VmLoad(indirect, PrimType::I64), Binding::BoxAddressRaw(u64::MAX)])
    }

    pub fn get_bindings(&mut self, carrier: Carrier, layout: &MemoryLayout) -> ArrangerResult<BindingList> {
        // Box never sees a variadic call; forVariadicFunction is always false.
        let class = self.platform.classify_for_bindings(layout, false);
        match class {
            TypeClass::Integer | TypeClass::Float => {
                assert!(!carrier.is_buffer(), "scalar class {class:?} requires a scalar carrier, got {carrier:?}");
                let kind = if class == TypeClass::Float { RegKind::Vector } else { RegKind::Integer };
                let storage = self.storage.next_storage(kind, layout)?;
                Ok(SmallVec::from_vec(vec![Binding::VmLoad(storage, carrier.scalar_prim())]))
            }
            TypeClass::Pointer => {
                let storage = self.storage.next_storage(RegKind::Integer, layout)?;
                let pointee_size = layout.as_scalar().and_then(|s| s.pointee_byte_size).unwrap_or(u64::MAX);
                Ok(SmallVec::from_vec(vec![Binding::VmLoad(storage, PrimType::I64), Binding::BoxAddressRaw(pointee_size)]))
            }
            TypeClass::StructRegister => {
                assert!(carrier.is_buffer(), "STRUCT_REGISTER requires a buffer carrier, got {carrier:?}");
                let group = layout.as_group().expect("STRUCT_REGISTER class implies a group layout");
                self.box_struct_register(group, layout)
            }
            TypeClass::StructHfa => {
                assert!(carrier.is_buffer(), "STRUCT_HFA requires a buffer carrier, got {carrier:?}");
                let group = layout.as_group().expect("STRUCT_HFA class implies a group layout");
                self.box_struct_hfa(group, layout)
            }
            TypeClass::StructReference => {
                assert!(carrier.is_buffer(), "STRUCT_REFERENCE requires a buffer carrier, got {carrier:?}");
                let storage = self.storage.next_storage(RegKind::Integer, layout)?;
                Ok(SmallVec::from_vec(vec![Binding::VmLoad(storage, PrimType::I64), Binding::BoxAddress(layout.clone())]))
            }
        }
    }

    fn box_struct_register(&mut self, group: &GroupLayout, layout: &MemoryLayout) -> ArrangerResult<BindingList> {
        let mut out = BindingList::new();
        out.push(Binding::Allocate(layout.clone()));
        let size = group.byte_size;
        let n_slices = ceil_div8(size);
        match self.storage.reg_alloc(RegKind::Integer, n_slices) {
            Some(regs) => {
                for (i, reg) in regs.iter().enumerate() {
                    let offset = i as i64 * 8;
                    let remaining = size as i64 - offset;
                    let chunk = remaining.min(8) as u32;
                    let prim = PrimType::for_byte_count(chunk);
                    out.push(Binding::Dup);
                    out.push(Binding::VmLoad(*reg, prim));
                    out.push(Binding::BufferStore(offset, prim));
                }
            }
            None => self.spill_tail(&mut out, 0, size)?,
        }
        Ok(out)
    }

    fn box_struct_hfa(&mut self, group: &GroupLayout, layout: &MemoryLayout) -> ArrangerResult<BindingList> {
        let mut out = BindingList::new();
        out.push(Binding::Allocate(layout.clone()));
        let leaves = group.flatten_scalar_leaves();
        let field_layouts: Vec<MemoryLayout> = leaves.iter().map(|(leaf, _)| MemoryLayout::Scalar(*leaf)).collect();
        match self.storage.next_storage_for_hfa(leaves.len(), &field_layouts)? {
            Some(field_storage) => {
                for ((leaf, offset), storage) in leaves.iter().zip(field_storage.iter()) {
                    let prim = PrimType::for_float_byte_count(leaf.byte_size);
                    out.push(Binding::Dup);
                    out.push(Binding::VmLoad(*storage, prim));
                    out.push(Binding::BufferStore(*offset, prim));
                }
            }
            None => self.spill_tail(&mut out, 0, group.byte_size)?,
        }
        Ok(out)
    }

    /// Dual of `UnboxCalculator::spill_tail`: `vmLoad`+`bufferStore` in the
    /// reverse order, and `dup` precedes *every* iteration rather than all
    /// but the last — the buffer reference must survive for the next store
    /// and for the final consumer, not just the next slice.
    fn spill_tail(&mut self, out: &mut BindingList, start: u32, size: u32) -> ArrangerResult<()> {
        let mut offset = start;
        while offset < size {
            let copy = (size - offset).min(8);
            let slot = self.storage.stack_alloc_sized(copy, 8)?;
            let prim = PrimType::for_byte_count(copy);
            out.push(Binding::Dup);
            out.push(Binding::VmLoad(slot, prim));
            out.push(Binding::BufferStore(offset as i64, prim));
            offset += 8;
        }
        if self.platform.requires_sub_slot_stack_packing() {
            self.storage.align_stack(8);
        }
        Ok(())
    }
}
