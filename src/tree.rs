use std::collections::HashSet;
use std::fmt::Write as _;
use std::hash::Hash;

use crate::error::CleanupError;

/// Sets `child`'s parent to `parent` and appends `child` to `parent`'s
/// children unless already present. Idempotent when re-linking the same
/// pair; rejects self-links and conflicting re-parenting.
pub fn link<K>(
    parent: &K,
    child: &K,
    parent_of: &mut impl FnMut(&K) -> Option<K>,
    set_parent: &mut impl FnMut(&K, Option<K>),
    children_of: &mut impl FnMut(&K) -> Vec<K>,
    push_child: &mut impl FnMut(&K, &K),
) -> Result<(), CleanupError>
where
    K: Clone + PartialEq,
{
    if parent == child {
        return Err(CleanupError::SelfLink);
    }

    if let Some(existing) = parent_of(child)
        && &existing != parent
    {
        return Err(CleanupError::ConflictingParent);
    }

    if !children_of(parent).iter().any(|c| c == child) {
        push_child(parent, child);
    }
    set_parent(child, Some(parent.clone()));

    Ok(())
}

/// Pre-order traversal, tolerant of cycles: each node is visited at most
/// once regardless of how many distinct paths reach it.
pub fn visit<K>(roots: &[K], mut children_of: impl FnMut(&K) -> Vec<K>, mut emit: impl FnMut(&K))
where
    K: Clone + Eq + Hash,
{
    let mut visited: HashSet<K> = HashSet::new();
    let mut stack: Vec<K> = roots.iter().rev().cloned().collect();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        emit(&node);
        let mut children = children_of(&node);
        children.reverse();
        stack.extend(children);
    }
}

/// Renders an ASCII tree using the exact prefixes ` ├─`, ` └─`, ` │ `, `   `.
/// `label` maps a node to its display text; `children_of` must return
/// children in discovery order. Cycle-safe like `visit`.
pub fn render<K>(
    roots: &[K],
    mut children_of: impl FnMut(&K) -> Vec<K>,
    mut label: impl FnMut(&K) -> String,
) -> String
where
    K: Clone + Eq + Hash,
{
    let mut out = String::new();
    let mut visited: HashSet<K> = HashSet::new();

    for root in roots {
        if !visited.insert(root.clone()) {
            continue;
        }
        let _ = writeln!(out, "- {}", label(root));
        render_children(root, "", &mut children_of, &mut label, &mut visited, &mut out);
    }

    out
}

fn render_children<K>(
    node: &K,
    prefix: &str,
    children_of: &mut impl FnMut(&K) -> Vec<K>,
    label: &mut impl FnMut(&K) -> String,
    visited: &mut HashSet<K>,
    out: &mut String,
) where
    K: Clone + Eq + Hash,
{
    let children = children_of(node);
    let count = children.len();

    for (i, child) in children.into_iter().enumerate() {
        if !visited.insert(child.clone()) {
            continue;
        }

        let is_last = i + 1 == count;
        let connector = if is_last { " └─" } else { " ├─" };
        let _ = writeln!(out, "{prefix}{connector} {}", label(&child));

        let child_prefix = if is_last {
            format!("{prefix}   ")
        } else {
            format!("{prefix} │ ")
        };
        render_children(&child, &child_prefix, children_of, label, visited, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Graph {
        parent: HashMap<u32, u32>,
        children: HashMap<u32, Vec<u32>>,
    }

    #[test]
    fn link_is_idempotent() {
        let graph = RefCell::new(Graph::default());

        let mut parent_of = |k: &u32| graph.borrow().parent.get(k).copied();
        let mut set_parent = |k: &u32, p: Option<u32>| {
            if let Some(p) = p {
                graph.borrow_mut().parent.insert(*k, p);
            }
        };
        let mut children_of = |k: &u32| graph.borrow().children.get(k).cloned().unwrap_or_default();
        let mut push_child = |p: &u32, c: &u32| {
            graph.borrow_mut().children.entry(*p).or_default().push(*c);
        };

        link(&1, &2, &mut parent_of, &mut set_parent, &mut children_of, &mut push_child).unwrap();
        link(&1, &2, &mut parent_of, &mut set_parent, &mut children_of, &mut push_child).unwrap();

        assert_eq!(graph.borrow().children.get(&1).unwrap(), &vec![2]);
        assert_eq!(graph.borrow().parent.get(&2), Some(&1));
    }

    #[test]
    fn self_link_rejected() {
        let graph = RefCell::new(Graph::default());
        let mut parent_of = |k: &u32| graph.borrow().parent.get(k).copied();
        let mut set_parent = |k: &u32, p: Option<u32>| {
            if let Some(p) = p {
                graph.borrow_mut().parent.insert(*k, p);
            }
        };
        let mut children_of = |k: &u32| graph.borrow().children.get(k).cloned().unwrap_or_default();
        let mut push_child = |p: &u32, c: &u32| {
            graph.borrow_mut().children.entry(*p).or_default().push(*c);
        };

        let err = link(&1, &1, &mut parent_of, &mut set_parent, &mut children_of, &mut push_child)
            .unwrap_err();
        assert!(matches!(err, CleanupError::SelfLink));
    }

    #[test]
    fn visit_tolerates_cycles() {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        children.insert(1, vec![2]);
        children.insert(2, vec![1]);

        let mut seen = Vec::new();
        visit(&[1], |k| children.get(k).cloned().unwrap_or_default(), |k| seen.push(*k));

        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn render_matches_expected_prefixes() {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        children.insert(1, vec![2, 3]);
        children.insert(3, vec![4]);

        let out = render(&[1], |k| children.get(k).cloned().unwrap_or_default(), |k| k.to_string());

        assert_eq!(out, "- 1\n ├─ 2\n └─ 3\n    └─ 4\n");
    }
}
