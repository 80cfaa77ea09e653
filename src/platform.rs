//! The four boolean policies that parameterize the storage calculator per
//! platform (`spec.md` §4.3), plus the classifier override hook. Each
//! platform is a zero-sized marker type that only ever serves as an
//! implementation point for the trait — directly analogous to
//! `cranelift-codegen`'s `AArch64MachineDeps`, whose own doc comment reads
//! "this struct just serves as an implementation point for the trait; it is
//! never actually instantiated" (it is, exactly once, as a unit value).

use crate::classify::{classify_layout, TypeClass};
use crate::layout::MemoryLayout;
use crate::storage::{ABIDescriptor, AARCH64_ABI};

pub trait PlatformPolicy: Send + Sync {
    /// Variadic arguments are passed entirely on the stack (macOS).
    fn var_args_on_stack(&self) -> bool;

    /// Stack arguments are packed to their own natural alignment, not
    /// rounded up to an 8-byte slot (macOS).
    fn requires_sub_slot_stack_packing(&self) -> bool;

    /// Floating-point values in the variadic section are routed to
    /// general-purpose registers instead of vector registers (Windows).
    fn use_int_regs_for_variadic_floating_point_args(&self) -> bool;

    /// A variadic struct may occupy some registers and spill the rest
    /// (Windows).
    fn spills_variadic_structs_partially(&self) -> bool;

    fn abi_descriptor(&self) -> &'static ABIDescriptor {
        &AARCH64_ABI
    }

    /// Classify `layout` for the purpose of choosing its bindings, given
    /// whether the *call* (not this specific argument) is variadic.
    ///
    /// Open question carried over from the source spec: the default
    /// implementation ignores `for_variadic_function` entirely and just
    /// delegates to the canonical classifier. It isn't clear any platform
    /// needs variadic-aware classification, so the hook is preserved but
    /// left dormant rather than guessed at.
    fn classify_for_bindings(&self, layout: &MemoryLayout, for_variadic_function: bool) -> TypeClass {
        let _ = for_variadic_function;
        classify_layout(layout)
    }
}

pub struct Linux;

impl PlatformPolicy for Linux {
    fn var_args_on_stack(&self) -> bool {
        false
    }
    fn requires_sub_slot_stack_packing(&self) -> bool {
        false
    }
    fn use_int_regs_for_variadic_floating_point_args(&self) -> bool {
        false
    }
    fn spills_variadic_structs_partially(&self) -> bool {
        false
    }
}

pub struct MacOs;

impl PlatformPolicy for MacOs {
    fn var_args_on_stack(&self) -> bool {
        true
    }
    fn requires_sub_slot_stack_packing(&self) -> bool {
        true
    }
    fn use_int_regs_for_variadic_floating_point_args(&self) -> bool {
        false
    }
    fn spills_variadic_structs_partially(&self) -> bool {
        false
    }
}

pub struct Windows;

impl PlatformPolicy for Windows {
    fn var_args_on_stack(&self) -> bool {
        false
    }
    fn requires_sub_slot_stack_packing(&self) -> bool {
        false
    }
    fn use_int_regs_for_variadic_floating_point_args(&self) -> bool {
        true
    }
    fn spills_variadic_structs_partially(&self) -> bool {
        true
    }
}

pub static LINUX_POLICY: Linux = Linux;
pub static MACOS_POLICY: MacOs = MacOs;
pub static WINDOWS_POLICY: Windows = Windows;
