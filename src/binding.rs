//! The binding recipe alphabet (`spec.md` §3): the ops a recipe composes.
//! Runtime semantics belong to the external binding executor; this crate
//! only ever builds ordered `Binding` lists, never interprets them.

use smallvec::SmallVec;

use crate::layout::MemoryLayout;
use crate::storage::VMStorage;

/// The primitive scalar width used to move one slice of bytes, chosen by
/// byte count (1/2/4/8 for integers, 4/8 for floats) rather than by the
/// argument's original carrier — a `STRUCT_REGISTER`'s slices are always
/// integer-typed regardless of what the struct's fields actually are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl PrimType {
    /// Pick the integer primitive matching a byte count of 1, 2, 4, or 8 —
    /// the widths a struct's 8-byte slices decompose into at its tail.
    pub(crate) fn for_byte_count(byte_count: u32) -> PrimType {
        match byte_count {
            1 => PrimType::I8,
            2 => PrimType::I16,
            4 => PrimType::I32,
            _ => PrimType::I64,
        }
    }

    pub(crate) fn for_float_byte_count(byte_count: u32) -> PrimType {
        if byte_count == 4 {
            PrimType::F32
        } else {
            PrimType::F64
        }
    }

    pub fn byte_size(self) -> u32 {
        match self {
            PrimType::I8 => 1,
            PrimType::I16 => 2,
            PrimType::I32 => 4,
            PrimType::I64 => 8,
            PrimType::F32 => 4,
            PrimType::F64 => 8,
        }
    }
}

/// One step of a binding recipe. The runtime semantics of each op belong to
/// the external binding executor (`spec.md` §1's out-of-scope list); the
/// engine only composes ordered sequences of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Duplicate the top-of-stack reference, so it survives one more
    /// consuming op.
    Dup,
    /// Load a value from native storage into a managed carrier.
    VmLoad(VMStorage, PrimType),
    /// Store a managed carrier's value into native storage.
    VmStore(VMStorage, PrimType),
    /// Read `type`-sized bytes at `offset` from the buffer on top of stack.
    BufferLoad(i64, PrimType),
    /// Write `type`-sized bytes at `offset` into the buffer on top of stack.
    BufferStore(i64, PrimType),
    /// Allocate a fresh, empty buffer of `layout`'s size, for a box
    /// calculator to fill via subsequent `BufferStore`s.
    Allocate(MemoryLayout),
    /// Materialize a caller-owned copy of `layout`'s bytes.
    Copy(MemoryLayout),
    /// Convert a buffer carrier on top of stack into its native address.
    UnboxAddress,
    /// Convert a native address into a buffer carrier of `layout`'s size.
    BoxAddress(MemoryLayout),
    /// Convert a native address into a buffer carrier of an unbounded or
    /// caller-declared size. Used for the indirect-result pointer, where
    /// the pointee size isn't known to the engine — the caller owns the
    /// allocation, so no bounds check is meaningful here; this is a trust
    /// boundary, not an oversight.
    BoxAddressRaw(u64),
}

/// A handful of bindings rarely exceeds four or five ops; inline storage
/// avoids a heap allocation for the common case, mirroring
/// `cranelift-codegen`'s own `SmallInstVec` usage in ABI lowering.
pub type BindingList = SmallVec<[Binding; 8]>;
