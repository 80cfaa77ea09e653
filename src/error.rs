//! The engine's single error type. The only error the engine itself raises,
//! per `spec.md` §7: a finite, closed set of classifications, plus the two
//! arithmetic sanity limits (stack slot size, total stack area) the source
//! spec calls out as composition invariants. Everything else — illegal
//! layouts, mismatched carriers, stub allocation failure — belongs to an
//! upstream or downstream collaborator and is not this crate's concern.

use thiserror::Error;

use crate::classify::TypeClass;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArrangerError {
    /// A layout classified outside the recognized six-way `TypeClass` split.
    /// `TypeClass` is a closed Rust enum, so a correctly constructed
    /// classifier can never actually produce this; the variant is kept for
    /// API parity with the source spec's explicit error site, in case a
    /// future platform override widens what can be classified.
    #[error("layout classified outside the recognized argument classes: {0:?}")]
    UnrepresentableLayout(TypeClass),

    /// A stack slot's encoded size must fit in 16 bits (`VMStorage`'s stack
    /// encoding). No real AAPCS64 aggregate gets close to this, but a
    /// pathological layout could.
    #[error("stack slot of {0} bytes does not fit in the 16-bit encoded size")]
    StackSlotTooLarge(u32),

    /// Sanity bound on the total outgoing stack-argument area, matching
    /// `cranelift-codegen`'s `STACK_ARG_RET_SIZE_LIMIT` for its own
    /// `compute_arg_locs`: guards 32-bit offset arithmetic downstream from
    /// overflowing on a signature with enormous by-value arguments.
    #[error("stack argument/return area of {actual} bytes exceeds the {limit} byte limit")]
    StackArgRetSizeExceeded { actual: i64, limit: i64 },
}

pub type ArrangerResult<T> = Result<T, ArrangerError>;
