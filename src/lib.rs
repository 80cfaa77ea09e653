//! AArch64 C ABI calling-sequence classifier and allocator.
//!
//! Given an abstract description of a C function's signature, this crate
//! produces a **calling sequence**: a deterministic plan describing how each
//! argument and the return value crosses the AArch64 procedure-call boundary
//! (AAPCS64, plus the macOS and Windows variadic-argument variants). The
//! plan is a list of ordered binding-operation recipes, one per argument
//! plus an optional return recipe; a downstream linker is expected to
//! materialize the plan into an actual machine-code trampoline. That
//! materialization, along with the runtime semantics of individual binding
//! operations, is out of scope here — see [`arranger::TrampolineLinker`] and
//! [`arranger::UpcallStubFactory`] for the seams where it plugs in.
//!
//! Entry points live on [`arranger::CallArranger`]; obtain one of the three
//! platform singletons ([`arranger::LINUX`], [`arranger::MACOS`],
//! [`arranger::WINDOWS`]) and call [`arranger::CallArranger::get_bindings`],
//! [`arranger::CallArranger::arrange_downcall`], or
//! [`arranger::CallArranger::arrange_upcall`].

mod arranger;
mod binding;
mod boxing;
mod calculator;
mod classify;
mod descriptor;
mod error;
mod layout;
mod platform;
mod sequence;
mod storage;
mod unbox;
mod util;

pub use arranger::{
    Bindings, CallArranger, InvocationHandle, Scope, StubAddress, TargetHandle, TrampolineLinker, UpcallStubFactory,
    LINUX, MACOS, WINDOWS,
};
pub use binding::{Binding, BindingList, PrimType};
pub use boxing::BoxCalculator;
pub use calculator::{RegKind, StorageCalculator, STACK_ARG_RET_SIZE_LIMIT};
pub use classify::{classify_layout, TypeClass};
pub use descriptor::{Carrier, FunctionDescriptor, LinkerOptions, MethodType};
pub use error::{ArrangerError, ArrangerResult};
pub use layout::{GroupLayout, MemoryLayout, ScalarKind, ScalarLayout};
pub use platform::{PlatformPolicy, LINUX_POLICY, MACOS_POLICY, WINDOWS_POLICY};
pub use sequence::{ArgumentBinding, CallingSequence, CallingSequenceBuilder};
pub use storage::{ABIDescriptor, RegisterId, StorageKind, VMStorage, AARCH64_ABI};
pub use unbox::UnboxCalculator;
