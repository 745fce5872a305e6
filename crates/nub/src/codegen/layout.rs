use std::ops::Index;

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;

use crate::semantics::typed_ast::{MemberRef, TypedStruct};

/// Every heap slot (struct field, array element, array header) is one word.
pub(crate) const WORD_SIZE: u32 = 8;
/// The length of an array lives in the first word of its allocation.
pub(crate) const ARRAY_HEADER_SIZE: u32 = WORD_SIZE;

pub(crate) struct FieldOffsets<'arena>(&'arena [u32]);

impl Index<MemberRef> for FieldOffsets<'_> {
    type Output = u32;

    fn index(&self, index: MemberRef) -> &Self::Output {
        &self.0[index.index()]
    }
}

pub(crate) struct StructLayout<'arena> {
    pub(crate) name: &'arena str,
    pub(crate) size: u32,
    pub(crate) field_offsets: FieldOffsets<'arena>,
}

pub(crate) struct Layouts<'arena> {
    struct_layouts: BumpVec<'arena, StructLayout<'arena>>,
}

impl<'arena> Layouts<'arena> {
    /// Panics on a struct the resolver never accepted.
    pub(crate) fn struct_layout(&self, name: &str) -> &StructLayout<'arena> {
        self.struct_layouts
            .iter()
            .find(|layout| layout.name == name)
            .unwrap_or_else(|| panic!("no layout computed for struct `{name}`"))
    }

    pub(crate) fn member_offset(&self, struct_name: &str, member: MemberRef) -> u32 {
        self.struct_layout(struct_name).field_offsets[member]
    }
}

// Struct values live on the heap and are referenced through a pointer, so a
// nested struct field is still a single word.
pub(crate) fn compute_layouts<'arena>(arena: &'arena Bump, structs: &[TypedStruct]) -> Layouts<'arena> {
    let mut struct_layouts: BumpVec<'arena, StructLayout> = BumpVec::with_capacity_in(structs.len(), arena);

    for typed_struct in structs {
        let field_offsets: &'arena mut [u32] = arena.alloc_slice_fill_copy(typed_struct.fields.len(), 0);
        for (i, offset) in field_offsets.iter_mut().enumerate() {
            *offset = i as u32 * WORD_SIZE;
        }

        struct_layouts.push(StructLayout {
            name: arena.alloc_str(&typed_struct.name),
            size: typed_struct.fields.len() as u32 * WORD_SIZE,
            field_offsets: FieldOffsets(field_offsets),
        });
    }

    Layouts { struct_layouts }
}
