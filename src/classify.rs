//! The type classifier (`spec.md` §4.1): a pure mapping from a [`MemoryLayout`]
//! to one of a fixed set of argument classes. Because [`TypeClass`] is a
//! closed Rust enum, any `match` over it is exhaustive at compile time — the
//! "any layout classifying outside the recognized six is a fatal programmer
//! error" case from the source spec is therefore unrepresentable rather than
//! merely checked, the strongest form of the "statically enforced where
//! possible" requirement.

use crate::layout::{GroupLayout, MemoryLayout, ScalarKind};

/// The six argument classes the AAPCS64 family of ABIs distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Float,
    Pointer,
    StructRegister,
    StructHfa,
    StructReference,
}

/// Classify `layout` with no knowledge of where it sits in a variadic
/// argument list. Platform-specific call sites may wrap this with their own
/// variadic-aware classification (see `PlatformPolicy::classify_for_bindings`);
/// the canonical classifier here is deliberately platform-independent.
pub fn classify_layout(layout: &MemoryLayout) -> TypeClass {
    match layout {
        MemoryLayout::Scalar(s) => match s.kind {
            ScalarKind::Integer => TypeClass::Integer,
            ScalarKind::Pointer => TypeClass::Pointer,
            ScalarKind::Float => TypeClass::Float,
        },
        MemoryLayout::Group(g) => classify_group(g),
    }
}

fn classify_group(group: &GroupLayout) -> TypeClass {
    if hfa_leaf_count(group).is_some() {
        TypeClass::StructHfa
    } else if group.byte_size <= 16 {
        TypeClass::StructRegister
    } else {
        TypeClass::StructReference
    }
}

/// Number of leaves in `group` if it is a homogeneous floating aggregate:
/// its flattened leaf members are all the same floating-point type, and
/// there are between 1 and 4 of them.
fn hfa_leaf_count(group: &GroupLayout) -> Option<usize> {
    let leaves = group.flatten_scalar_leaves();
    if leaves.is_empty() || leaves.len() > 4 {
        return None;
    }
    let (first, _) = leaves[0];
    if first.kind != ScalarKind::Float {
        return None;
    }
    if leaves.iter().any(|(leaf, _)| leaf.kind != ScalarKind::Float || leaf.byte_size != first.byte_size) {
        return None;
    }
    Some(leaves.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ScalarLayout;

    #[test]
    fn scalar_int_classifies_integer() {
        assert_eq!(classify_layout(&MemoryLayout::int(4)), TypeClass::Integer);
    }

    #[test]
    fn scalar_pointer_classifies_pointer() {
        assert_eq!(classify_layout(&MemoryLayout::pointer()), TypeClass::Pointer);
    }

    #[test]
    fn scalar_float_classifies_float() {
        assert_eq!(classify_layout(&MemoryLayout::float(8)), TypeClass::Float);
    }

    #[test]
    fn hfa_of_one_to_four_doubles() {
        for n in 1..=4 {
            let members = (0..n).map(|_| MemoryLayout::float(8)).collect();
            let g = MemoryLayout::Group(GroupLayout::of_struct(members));
            assert_eq!(classify_layout(&g), TypeClass::StructHfa, "n={n}");
        }
    }

    #[test]
    fn five_leaves_is_not_an_hfa() {
        let members = (0..5).map(|_| MemoryLayout::float(8)).collect();
        let g = GroupLayout::of_struct(members).with_explicit_size(16);
        assert_eq!(classify_layout(&MemoryLayout::Group(g)), TypeClass::StructReference);
    }

    #[test]
    fn mixed_float_widths_are_not_hfa() {
        let g = GroupLayout::of_struct(vec![MemoryLayout::float(4), MemoryLayout::float(8)]);
        assert_eq!(classify_layout(&MemoryLayout::Group(g)), TypeClass::StructRegister);
    }

    #[test]
    fn nested_hfa_of_hfa_is_still_an_hfa() {
        let inner = MemoryLayout::Group(GroupLayout::of_struct(vec![MemoryLayout::float(4), MemoryLayout::float(4)]));
        let outer = GroupLayout::of_struct(vec![inner, MemoryLayout::float(4)]);
        assert_eq!(classify_layout(&MemoryLayout::Group(outer)), TypeClass::StructHfa);
    }

    #[test]
    fn sixteen_byte_non_hfa_struct_is_struct_register() {
        let g = GroupLayout::of_struct(vec![MemoryLayout::int(8), MemoryLayout::int(8)]);
        assert_eq!(classify_layout(&MemoryLayout::Group(g)), TypeClass::StructRegister);
    }

    #[test]
    fn over_sixteen_byte_non_hfa_struct_is_struct_reference() {
        let g = GroupLayout::of_struct(vec![MemoryLayout::int(8), MemoryLayout::int(8), MemoryLayout::int(8)]);
        assert_eq!(classify_layout(&MemoryLayout::Group(g)), TypeClass::StructReference);
    }

    #[test]
    fn zero_sized_group_classifies_struct_register() {
        let g = GroupLayout::of_struct(vec![]).with_explicit_size(0);
        assert_eq!(classify_layout(&MemoryLayout::Group(g)), TypeClass::StructRegister);
    }

    #[test]
    fn integer_pointee_size_does_not_affect_classification() {
        let ptr = MemoryLayout::Scalar(ScalarLayout::pointer_to(16));
        assert_eq!(classify_layout(&ptr), TypeClass::Pointer);
    }
}
