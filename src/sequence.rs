//! The sealed engine output (`spec.md` §3): `CallingSequence`, built by a
//! `CallingSequenceBuilder` and never mutated again once built — "a calling
//! sequence, once produced, is immutable and referentially self-contained"
//! (invariant 5).

use crate::binding::BindingList;
use crate::descriptor::Carrier;
use crate::layout::MemoryLayout;

/// One argument's recipe, paired with enough of its signature to be useful
/// to a downstream linker without re-deriving it from the original
/// descriptor.
#[derive(Debug, Clone)]
pub struct ArgumentBinding {
    pub carrier: Carrier,
    pub layout: MemoryLayout,
    pub bindings: BindingList,
}

/// The sealed product of one `getBindings` call: one recipe per argument (in
/// declaration order, with the synthetic indirect-result argument prepended
/// when the return is in memory), plus the return recipe when the return is
/// conveyed in registers.
#[derive(Debug, Clone)]
pub struct CallingSequence {
    arguments: Vec<ArgumentBinding>,
    return_binding: Option<ArgumentBinding>,
    has_indirect_result: bool,
}

impl CallingSequence {
    pub fn arguments(&self) -> &[ArgumentBinding] {
        &self.arguments
    }

    pub fn return_binding(&self) -> Option<&ArgumentBinding> {
        self.return_binding.as_ref()
    }

    pub fn has_indirect_result(&self) -> bool {
        self.has_indirect_result
    }
}

/// Accumulates argument and return recipes in declaration order; `build()`
/// seals them into an immutable [`CallingSequence`]. Not reused across
/// calls: a fresh builder is created per `getBindings` invocation
/// (`spec.md` §5, "stateful allocator, stateless arranger").
pub struct CallingSequenceBuilder {
    for_upcall: bool,
    arguments: Vec<ArgumentBinding>,
    return_binding: Option<ArgumentBinding>,
    has_indirect_result: bool,
}

impl CallingSequenceBuilder {
    pub fn new(for_upcall: bool) -> Self {
        CallingSequenceBuilder { for_upcall, arguments: Vec::new(), return_binding: None, has_indirect_result: false }
    }

    pub fn for_upcall(&self) -> bool {
        self.for_upcall
    }

    pub fn add_argument_bindings(&mut self, carrier: Carrier, layout: MemoryLayout, bindings: BindingList) {
        self.arguments.push(ArgumentBinding { carrier, layout, bindings });
    }

    pub fn add_indirect_result_bindings(&mut self, carrier: Carrier, layout: MemoryLayout, bindings: BindingList) {
        self.has_indirect_result = true;
        self.arguments.insert(0, ArgumentBinding { carrier, layout, bindings });
    }

    pub fn set_return_bindings(&mut self, carrier: Carrier, layout: MemoryLayout, bindings: BindingList) {
        self.return_binding = Some(ArgumentBinding { carrier, layout, bindings });
    }

    pub fn build(self) -> CallingSequence {
        CallingSequence {
            arguments: self.arguments,
            return_binding: self.return_binding,
            has_indirect_result: self.has_indirect_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;

    #[test]
    fn indirect_result_is_prepended_ahead_of_ordinary_arguments() {
        let mut b = CallingSequenceBuilder::new(false);
        b.add_argument_bindings(Carrier::Integer, MemoryLayout::int(4), BindingList::new());
        b.add_indirect_result_bindings(Carrier::Address, MemoryLayout::pointer(), BindingList::from_vec(vec![Binding::Dup]));
        let seq = b.build();
        assert!(seq.has_indirect_result());
        assert_eq!(seq.arguments().len(), 2);
        assert_eq!(seq.arguments()[0].carrier, Carrier::Address);
    }

    #[test]
    fn sequence_with_no_return_layout_has_no_return_binding() {
        let b = CallingSequenceBuilder::new(false);
        let seq = b.build();
        assert!(seq.return_binding().is_none());
    }
}
