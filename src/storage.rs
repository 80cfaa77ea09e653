//! Register and stack storage handles, and the static AAPCS64 register
//! layout (`spec.md` §3, `ABIDescriptor`). Register identities are opaque
//! handles — the engine never synthesizes a register number out of thin
//! air, only ever hands out entries from these fixed tables, mirroring how
//! `cranelift-codegen` treats `RealReg` as a handle obtained from a
//! register-bank table rather than a raw integer the caller invents.

/// An opaque AArch64 physical register handle (x- or v-register number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(pub u8);

/// Which bank a [`VMStorage`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Integer,
    Vector,
    Stack,
}

/// Where one argument slice lives: a general-purpose register, a SIMD/FP
/// register, or an offset into the outgoing stack argument area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMStorage {
    Integer(RegisterId),
    Vector(RegisterId),
    Stack { offset: i64, encoded_size: u16 },
}

impl VMStorage {
    pub fn kind(&self) -> StorageKind {
        match self {
            VMStorage::Integer(_) => StorageKind::Integer,
            VMStorage::Vector(_) => StorageKind::Vector,
            VMStorage::Stack { .. } => StorageKind::Stack,
        }
    }

    pub fn is_register(&self, id: RegisterId) -> bool {
        matches!(self, VMStorage::Integer(r) | VMStorage::Vector(r) if *r == id)
    }
}

/// Static register-bank layout for the AArch64 procedure-call boundary:
/// x0-x7 for integer arguments/returns, v0-v7 for vector arguments/returns,
/// x8 reserved for the indirect result pointer, x9/x10 as scratch, 16-byte
/// stack alignment, and no shadow space (unlike the x64 Windows ABI).
#[derive(Debug, Clone, Copy)]
pub struct ABIDescriptor {
    pub input_integer: [RegisterId; 8],
    pub input_vector: [RegisterId; 8],
    pub output_integer: [RegisterId; 8],
    pub output_vector: [RegisterId; 8],
    pub volatile_integer: &'static [RegisterId],
    pub volatile_vector: &'static [RegisterId],
    pub stack_alignment: u32,
    pub shadow_space: u32,
    pub scratch1: RegisterId,
    pub scratch2: RegisterId,
    pub indirect_result: RegisterId,
}

const fn x(n: u8) -> RegisterId {
    RegisterId(n)
}

const INPUT_INTEGER: [RegisterId; 8] = [x(0), x(1), x(2), x(3), x(4), x(5), x(6), x(7)];
const INPUT_VECTOR: [RegisterId; 8] = [x(0), x(1), x(2), x(3), x(4), x(5), x(6), x(7)];
const OUTPUT_INTEGER: [RegisterId; 8] = INPUT_INTEGER;
const OUTPUT_VECTOR: [RegisterId; 8] = INPUT_VECTOR;

// x0-x18 are caller-saved on AAPCS64; x19-x28 (and the FP/LR pair) are
// callee-saved. We only track the subset relevant to argument registers.
static VOLATILE_INTEGER: &[RegisterId] = &[
    x(0), x(1), x(2), x(3), x(4), x(5), x(6), x(7), x(8), x(9), x(10), x(11), x(12), x(13), x(14), x(15),
];
static VOLATILE_VECTOR: &[RegisterId] = &[x(0), x(1), x(2), x(3), x(4), x(5), x(6), x(7)];

/// The single AArch64 ABI descriptor shared by all three platform policies:
/// Linux, macOS, and Windows place arguments in the same physical registers
/// and differ only in the allocation *policy* layered on top (`spec.md` §4.3).
pub static AARCH64_ABI: ABIDescriptor = ABIDescriptor {
    input_integer: INPUT_INTEGER,
    input_vector: INPUT_VECTOR,
    output_integer: OUTPUT_INTEGER,
    output_vector: OUTPUT_VECTOR,
    volatile_integer: VOLATILE_INTEGER,
    volatile_vector: VOLATILE_VECTOR,
    stack_alignment: 16,
    shadow_space: 0,
    scratch1: x(9),
    scratch2: x(10),
    indirect_result: x(8),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_result_register_is_x8() {
        assert_eq!(AARCH64_ABI.indirect_result, RegisterId(8));
    }

    #[test]
    fn stack_alignment_is_sixteen() {
        assert_eq!(AARCH64_ABI.stack_alignment, 16);
    }

    #[test]
    fn shadow_space_is_zero_on_aarch64() {
        assert_eq!(AARCH64_ABI.shadow_space, 0);
    }
}
