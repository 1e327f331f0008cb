//! Property tests of the nested-set invariants
//!
//! Random sequences of inserts, moves and removals are applied to an arena.
//! After every step each interval must nest strictly inside its parent and
//! stay disjoint from its siblings.

use pagetree_core::hierarchy::{HierarchyError, NestedSet, Position};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Root,
    Child(usize),
    Before(usize),
    Move(usize, Option<usize>, u8),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Root),
        4 => any::<usize>().prop_map(Op::Child),
        2 => any::<usize>().prop_map(Op::Before),
        3 => (any::<usize>(), proptest::option::of(any::<usize>()), 0u8..4)
            .prop_map(|(a, b, p)| Op::Move(a, b, p)),
        1 => any::<usize>().prop_map(Op::Remove),
    ]
}

fn pick(ids: &[i64], index: usize) -> Option<i64> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

fn assert_strictly_nested(set: &NestedSet) {
    let nodes: Vec<_> = set.iter().collect();

    for (id, interval) in &nodes {
        assert!(interval.left < interval.right, "node {} is inverted", id);

        if let Some(parent) = interval.parent_id {
            let p = set.get(parent).expect("parent exists");
            assert!(p.left < interval.left && interval.right < p.right);
            assert_eq!(interval.depth, p.depth + 1);
        } else {
            assert_eq!(interval.depth, 0);
        }
    }

    for (a, ia) in &nodes {
        for (b, ib) in &nodes {
            if a != b && ia.parent_id == ib.parent_id {
                assert!(
                    ia.right < ib.left || ib.right < ia.left,
                    "siblings {} and {} overlap",
                    a,
                    b
                );
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_operations_keep_intervals_nested(ops in proptest::collection::vec(op(), 1..40)) {
        let mut set = NestedSet::new();
        let mut next_id = 1i64;

        for op in ops {
            let mut ids: Vec<i64> = set.iter().map(|(id, _)| id).collect();
            ids.sort_unstable();

            let result = match op {
                Op::Root => {
                    next_id += 1;
                    set.create_root(next_id).map(|_| ())
                }
                Op::Child(i) => match pick(&ids, i) {
                    Some(parent) => {
                        next_id += 1;
                        set.append_child(next_id, parent).map(|_| ())
                    }
                    None => Ok(()),
                },
                Op::Before(i) => match pick(&ids, i) {
                    Some(sibling) => {
                        next_id += 1;
                        set.insert_before(next_id, sibling).map(|_| ())
                    }
                    None => Ok(()),
                },
                Op::Move(i, parent, p) => match pick(&ids, i) {
                    Some(id) => {
                        let parent = parent.and_then(|j| pick(&ids, j));
                        let position = match p {
                            0 => Position::First,
                            1 => Position::Last,
                            _ => {
                                let mut siblings: Vec<i64> = set
                                    .iter()
                                    .filter(|(_, iv)| iv.parent_id == parent)
                                    .map(|(sid, _)| sid)
                                    .collect();
                                siblings.sort_unstable();
                                match pick(&siblings, i) {
                                    Some(s) if p == 2 => Position::Before(s),
                                    Some(s) => Position::After(s),
                                    None => Position::Last,
                                }
                            }
                        };
                        set.move_subtree(id, parent, position).map(|_| ())
                    }
                    None => Ok(()),
                },
                Op::Remove(i) => match pick(&ids, i) {
                    Some(id) => set.remove_subtree(id).map(|_| ()),
                    None => Ok(()),
                },
            };

            match result {
                Ok(()) | Err(HierarchyError::Cycle { .. }) => {}
                Err(e) => prop_assert!(false, "unexpected error {:?}", e),
            }

            prop_assert!(set.validate().is_ok());
            assert_strictly_nested(&set);
        }
    }

    #[test]
    fn prop_moving_into_own_subtree_is_rejected(depth in 1usize..8) {
        let mut set = NestedSet::new();
        set.create_root(1).unwrap();
        for id in 2..=(depth as i64 + 1) {
            set.append_child(id, id - 1).unwrap();
        }

        let before = set.clone();
        let deepest = depth as i64 + 1;
        let err = set.move_subtree(1, Some(deepest), Position::Last).unwrap_err();

        prop_assert!(matches!(err, HierarchyError::Cycle { node: 1, .. }), "unexpected error: {:?}", err);
        prop_assert_eq!(before, set);
    }
}
