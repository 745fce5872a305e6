/// Declares a `u32` newtype used to address one arena `Vec`, together with
/// `Index`/`IndexMut` impls so the arena can be indexed by it directly.
///
/// ```ignore
/// make_type_idx!(pub ExprRef, TypedExpr);
/// let expr_ref = ExprRef::from_push(&mut exprs, expr);
/// let expr = &exprs[expr_ref];
/// ```
#[macro_export]
macro_rules! make_type_idx {
    ($vis:vis $type_idx_name:ident, $type_name:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $type_idx_name(u32);

        impl $type_idx_name {
            $vis fn from_push(vec: &mut Vec<$type_name>, val: $type_name) -> $type_idx_name {
                let idx = $type_idx_name(vec.len() as u32);
                vec.push(val);
                idx
            }

            $vis fn from_index(index: usize) -> $type_idx_name {
                $type_idx_name(index as u32)
            }
        }

        impl std::ops::Index<$type_idx_name> for [$type_name] {
            type Output = $type_name;

            fn index(&self, index: $type_idx_name) -> &Self::Output {
                &self[index.0 as usize]
            }
        }

        impl std::ops::IndexMut<$type_idx_name> for [$type_name] {
            fn index_mut(&mut self, index: $type_idx_name) -> &mut Self::Output {
                &mut self[index.0 as usize]
            }
        }

        impl std::ops::Index<$type_idx_name> for Vec<$type_name> {
            type Output = $type_name;

            fn index(&self, index: $type_idx_name) -> &Self::Output {
                &self.as_slice()[index]
            }
        }

        impl std::ops::IndexMut<$type_idx_name> for Vec<$type_name> {
            fn index_mut(&mut self, index: $type_idx_name) -> &mut Self::Output {
                &mut self.as_mut_slice()[index]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug, PartialEq)]
    struct Node(&'static str);

    make_type_idx!(NodeIdx, Node);

    #[test]
    fn push_and_index() {
        let mut nodes = Vec::new();
        let a = NodeIdx::from_push(&mut nodes, Node("a"));
        let b = NodeIdx::from_push(&mut nodes, Node("b"));

        assert_eq!(nodes[a], Node("a"));
        assert_eq!(nodes[b], Node("b"));

        nodes[a] = Node("c");
        assert_eq!(nodes.as_slice()[a], Node("c"));
        assert_eq!(NodeIdx::from_index(1), b);
    }
}
