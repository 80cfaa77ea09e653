//! The call-arranger facade (`spec.md` §4.5): the per-platform entry point
//! that wires the classifier, storage calculator, and binding calculators
//! together and decides return-in-memory vs return-in-registers.

use std::marker::PhantomData;

use crate::binding::BindingList;
use crate::boxing::BoxCalculator;
use crate::classify::{classify_layout, TypeClass};
use crate::descriptor::{Carrier, FunctionDescriptor, LinkerOptions, MethodType};
use crate::error::ArrangerResult;
use crate::layout::MemoryLayout;
use crate::platform::{PlatformPolicy, LINUX_POLICY, MACOS_POLICY, WINDOWS_POLICY};
use crate::sequence::{CallingSequence, CallingSequenceBuilder};
use crate::unbox::UnboxCalculator;

/// `(CallingSequence, isInMemoryReturn)` — the engine's return value
/// (`spec.md` §3, `Bindings`).
#[derive(Debug, Clone)]
pub struct Bindings {
    pub sequence: CallingSequence,
    pub return_in_memory: bool,
}

/// Per-platform facade. Holds nothing but a policy reference, so the three
/// singletons below are trivially `Sync` and reentrant: every `get_bindings`
/// call builds its own builder and calculators from scratch (`spec.md` §5,
/// "stateful allocator, stateless arranger").
pub struct CallArranger {
    platform: &'static dyn PlatformPolicy,
}

impl CallArranger {
    const fn new(platform: &'static dyn PlatformPolicy) -> Self {
        CallArranger { platform }
    }

    pub fn get_bindings(
        &self,
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        for_upcall: bool,
        options: &LinkerOptions,
    ) -> ArrangerResult<Bindings> {
        let mut builder = CallingSequenceBuilder::new(for_upcall);

        // downcall: Unbox for args, Box for return. upcall: Box for args, Unbox for return.
        let mut arg_unbox = if !for_upcall {
            Some(UnboxCalculator::new(self.platform, true, options.is_variadic_function))
        } else {
            None
        };
        let mut arg_box = if for_upcall { Some(BoxCalculator::new(self.platform, true)) } else { None };

        let return_in_memory = descriptor
            .return_layout
            .as_ref()
            .map(|layout| matches!(classify_layout(layout), TypeClass::StructReference))
            .unwrap_or(false);

        if return_in_memory {
            let indirect_bindings = if !for_upcall {
                arg_unbox.as_ref().expect("downcall arguments use Unbox").get_indirect_bindings()
            } else {
                arg_box.as_ref().expect("upcall arguments use Box").get_indirect_bindings()
            };
            builder.add_indirect_result_bindings(Carrier::Address, MemoryLayout::pointer(), indirect_bindings);
        } else if let Some(return_layout) = &descriptor.return_layout {
            let return_carrier = method_type.return_carrier.expect("a return layout implies a return carrier");
            let bindings = if !for_upcall {
                let mut ret_box = BoxCalculator::new(self.platform, false);
                ret_box.get_bindings(return_carrier, return_layout)?
            } else {
                let mut ret_unbox = UnboxCalculator::new(self.platform, false, false);
                ret_unbox.get_bindings(return_carrier, return_layout)?
            };
            builder.set_return_bindings(return_carrier, return_layout.clone(), bindings);
        }

        for (i, layout) in descriptor.args.iter().enumerate() {
            if options.is_variadic_index(i) {
                match (&mut arg_unbox, &mut arg_box) {
                    (Some(u), _) => u.storage_calculator().adjust_for_var_args(),
                    (_, Some(b)) => b.storage_calculator().adjust_for_var_args(),
                    _ => unreachable!("exactly one argument calculator is populated per direction"),
                }
            }
            let carrier = method_type.arg_carriers[i];
            let bindings: BindingList = match (&mut arg_unbox, &mut arg_box) {
                (Some(u), _) => u.get_bindings(carrier, layout)?,
                (_, Some(b)) => b.get_bindings(carrier, layout)?,
                _ => unreachable!("exactly one argument calculator is populated per direction"),
            };
            builder.add_argument_bindings(carrier, layout.clone(), bindings);
        }

        Ok(Bindings { sequence: builder.build(), return_in_memory })
    }

    pub fn arrange_downcall<L: TrampolineLinker>(
        &self,
        linker: &L,
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        options: &LinkerOptions,
    ) -> ArrangerResult<InvocationHandle> {
        let bindings = self.get_bindings(method_type, descriptor, false, options)?;
        Ok(linker.link_downcall(&bindings.sequence, bindings.return_in_memory))
    }

    pub fn arrange_upcall<F: UpcallStubFactory>(
        &self,
        factory: &F,
        target: TargetHandle,
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        scope: &Scope<'_>,
    ) -> ArrangerResult<StubAddress> {
        let bindings = self.get_bindings(method_type, descriptor, true, &LinkerOptions::not_variadic())?;
        Ok(factory.make_stub(target, &bindings.sequence, bindings.return_in_memory, scope))
    }
}

pub static LINUX: CallArranger = CallArranger::new(&LINUX_POLICY);
pub static MACOS: CallArranger = CallArranger::new(&MACOS_POLICY);
pub static WINDOWS: CallArranger = CallArranger::new(&WINDOWS_POLICY);

/// Opaque handle to a materialized downcall invocation. The real allocation
/// and code generation are an external collaborator's job (`spec.md` §1); we
/// only carry enough of an identity to prove the facade drove the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationHandle(pub u64);

/// Opaque handle to the managed-side target of an upcall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHandle(pub u64);

/// Opaque handle to a generated upcall stub's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubAddress(pub u64);

/// Stand-in for the "low-level memory segment primitives and lifetime
/// scopes" collaborator named out-of-scope in `spec.md` §1: a stub's memory
/// lifetime is bound to the caller-supplied scope, but this crate neither
/// allocates nor frees that memory itself.
pub struct Scope<'a>(PhantomData<&'a ()>);

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Scope(PhantomData)
    }
}

impl<'a> Default for Scope<'a> {
    fn default() -> Self {
        Scope::new()
    }
}

/// Consumer of a calling sequence that materializes it into a downcall
/// trampoline. Out of scope per `spec.md` §1; the facade only proves it
/// calls this collaborator with the right arguments.
pub trait TrampolineLinker {
    fn link_downcall(&self, sequence: &CallingSequence, return_in_memory: bool) -> InvocationHandle;
}

/// Consumer of a calling sequence that materializes it into an executable
/// upcall stub tied to `scope`'s lifetime.
pub trait UpcallStubFactory {
    fn make_stub(
        &self,
        target: TargetHandle,
        sequence: &CallingSequence,
        return_in_memory: bool,
        scope: &Scope<'_>,
    ) -> StubAddress;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::GroupLayout;

    struct FakeLinker;
    impl TrampolineLinker for FakeLinker {
        fn link_downcall(&self, sequence: &CallingSequence, return_in_memory: bool) -> InvocationHandle {
            InvocationHandle(sequence.arguments().len() as u64 | if return_in_memory { 1 << 32 } else { 0 })
        }
    }

    struct FakeStubFactory;
    impl UpcallStubFactory for FakeStubFactory {
        fn make_stub(&self, target: TargetHandle, sequence: &CallingSequence, return_in_memory: bool, _scope: &Scope<'_>) -> StubAddress {
            StubAddress(target.0 + sequence.arguments().len() as u64 + if return_in_memory { 100 } else { 0 })
        }
    }

    #[test]
    fn three_int32_args_land_in_x0_x1_x2() {
        let mt = MethodType::new(Some(Carrier::Integer), vec![Carrier::Integer; 3]);
        let desc = FunctionDescriptor::new(Some(MemoryLayout::int(4)), vec![MemoryLayout::int(4); 3]);
        let bindings = LINUX.get_bindings(&mt, &desc, false, &LinkerOptions::not_variadic()).unwrap();
        assert!(!bindings.return_in_memory);
        assert_eq!(bindings.sequence.arguments().len(), 3);
    }

    #[test]
    fn thirty_two_byte_struct_return_reserves_x8_with_no_observable_return_bindings() {
        let big = MemoryLayout::Group(GroupLayout::of_struct(vec![MemoryLayout::int(8); 4]));
        let mt = MethodType::new(Some(Carrier::Buffer), vec![]);
        let desc = FunctionDescriptor::new(Some(big), vec![]);
        let bindings = LINUX.get_bindings(&mt, &desc, false, &LinkerOptions::not_variadic()).unwrap();
        assert!(bindings.return_in_memory);
        assert!(bindings.sequence.has_indirect_result());
        assert_eq!(bindings.sequence.arguments().len(), 1);
        assert!(bindings.sequence.return_binding().is_none());
    }

    #[test]
    fn indirect_result_argument_is_always_first() {
        let big = MemoryLayout::Group(GroupLayout::of_struct(vec![MemoryLayout::int(8); 4]));
        let mt = MethodType::new(Some(Carrier::Buffer), vec![Carrier::Integer]);
        let desc = FunctionDescriptor::new(Some(big), vec![MemoryLayout::int(4)]);
        let bindings = LINUX.get_bindings(&mt, &desc, false, &LinkerOptions::not_variadic()).unwrap();
        assert_eq!(bindings.sequence.arguments().len(), 2);
        assert_eq!(bindings.sequence.arguments()[0].carrier, Carrier::Address);
        assert_eq!(bindings.sequence.arguments()[1].carrier, Carrier::Integer);
    }

    #[test]
    fn arrange_downcall_drives_the_trampoline_linker() {
        let mt = MethodType::new(None, vec![Carrier::Integer]);
        let desc = FunctionDescriptor::new(None, vec![MemoryLayout::int(8)]);
        let handle = LINUX.arrange_downcall(&FakeLinker, &mt, &desc, &LinkerOptions::not_variadic()).unwrap();
        assert_eq!(handle, InvocationHandle(1));
    }

    #[test]
    fn arrange_upcall_drives_the_stub_factory() {
        let mt = MethodType::new(None, vec![Carrier::Integer]);
        let desc = FunctionDescriptor::new(None, vec![MemoryLayout::int(8)]);
        let scope = Scope::new();
        let addr = LINUX.arrange_upcall(&FakeStubFactory, TargetHandle(1000), &mt, &desc, &scope).unwrap();
        assert_eq!(addr, StubAddress(1001));
    }

    #[test]
    fn arrangers_are_shared_safely_across_threads() {
        std::thread::scope(|s| {
            s.spawn(|| {
                let mt = MethodType::new(Some(Carrier::Integer), vec![Carrier::Integer]);
                let desc = FunctionDescriptor::new(Some(MemoryLayout::int(4)), vec![MemoryLayout::int(4)]);
                LINUX.get_bindings(&mt, &desc, false, &LinkerOptions::not_variadic()).unwrap();
            });
            s.spawn(|| {
                let mt = MethodType::new(Some(Carrier::Float), vec![Carrier::Float; 2]);
                let desc = FunctionDescriptor::new(Some(MemoryLayout::float(8)), vec![MemoryLayout::float(8); 2]);
                MACOS.get_bindings(&mt, &desc, false, &LinkerOptions::not_variadic()).unwrap();
            });
        });
    }
}
