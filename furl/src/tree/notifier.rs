// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owner lookup and notifier repair around splices.
//!
//! Notifiers map displayed objects to box ranges. Any structural edit of
//! a child chain must repair the notifiers that reference the affected
//! boxes before the edit becomes visible: property starts and last-box
//! references are retargeted onto surviving or replacement boxes, and
//! notifiers whose boxes are all going away are either excised (when the
//! object's display is deleted) or demoted to missing (so stale lookups
//! fail soft instead of reading freed slots).

use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::host::{ObjectId, PropertyTag};
use crate::tree::data::{BoxHandle, BoxKind, BoxTree, NotifierHandle};

/// Where a box sits in the displayed object graph: the most local
/// notifier/property pair whose chain contains it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PropLocation {
    /// The owning notifier.
    pub notifier: NotifierHandle,
    /// Index of the property entry within the notifier.
    pub prop_index: usize,
    /// The object whose property is displayed, from the notifier.
    pub object: ObjectId,
    /// The property tag.
    pub tag: PropertyTag,
}

/// Finds the most deeply nested notifier/property pair displaying
/// `target`.
///
/// Candidates are the notifiers registered against the target's
/// container; each locatable property's box chain is walked from its
/// start box to the start of the next non-empty property (or the
/// notifier's last box). Among properties containing the target, the
/// greatest nesting level wins.
///
/// Panics when no notifier owns the box. Every box spliced onto a
/// property chain has an owner; lacking one means the tree is corrupt.
pub(crate) fn locate_owner(tree: &BoxTree, target: BoxHandle) -> PropLocation {
    let container = tree
        .data(target)
        .parent
        .expect("cannot locate an owner for the root box");
    let mut best: Option<(u32, NotifierHandle, usize)> = None;
    for &nh in tree.watchers(container) {
        let n = tree.notifier(nh);
        if n.missing {
            continue;
        }
        for (i, prop) in n.props.iter().enumerate() {
            if !prop.kind.locatable() {
                continue;
            }
            let Some(first) = prop.first else {
                continue;
            };
            if tree.data(first).parent != Some(container) {
                // The chain runs in some other container; this box cannot
                // be on it.
                continue;
            }
            let next_start = n.props[i + 1..].iter().find_map(|p| p.first);
            if chain_contains(tree, first, next_start, n.last, target) {
                let better = best.is_none_or(|(lvl, _, _)| n.level > lvl);
                if better {
                    best = Some((n.level, nh, i));
                }
            }
        }
    }
    let Some((_, notifier, prop_index)) = best else {
        panic!("no notifier owns box {target:?}");
    };
    let n = tree.notifier(notifier);
    PropLocation {
        notifier,
        prop_index,
        object: n.object,
        tag: n.props[prop_index].tag,
    }
}

/// Walks the sibling chain from `first`, bounded exclusively by
/// `next_start` and inclusively by `last`, looking for `target`.
fn chain_contains(
    tree: &BoxTree,
    first: BoxHandle,
    next_start: Option<BoxHandle>,
    last: Option<BoxHandle>,
    target: BoxHandle,
) -> bool {
    let mut cur = Some(first);
    while let Some(b) = cur {
        if Some(b) == next_start {
            return false;
        }
        if b == target {
            return true;
        }
        if Some(b) == last {
            return false;
        }
        cur = tree.next_sibling(b);
    }
    false
}

/// Everything notifier repair needs to know about one splice.
#[derive(Debug, Default)]
pub(crate) struct RepairPlan<'a> {
    /// Boxes that are about to be deleted.
    pub(crate) removed: &'a [BoxHandle],
    /// Boxes taking the place of `removed` in the chain.
    pub(crate) replacement: &'a [BoxHandle],
    /// Surviving box just after the replaced range, if any.
    pub(crate) next_survivor: Option<BoxHandle>,
    /// Surviving box just before the replaced range, if any.
    pub(crate) prev_survivor: Option<BoxHandle>,
    /// A surviving box the replacement is inserted in front of. Property
    /// starts pointing at it move to the replacement, which now holds the
    /// chain's earlier content.
    pub(crate) insert_before: Option<BoxHandle>,
    /// A surviving box the replacement is inserted after. Last-box
    /// references pointing at it move to the replacement's tail.
    pub(crate) insert_after: Option<BoxHandle>,
}

/// Retargets every notifier registered against `container` according to
/// `plan`. Must run before the children are spliced and before any new
/// notifier is registered, so no caller can observe a half-repaired tree.
pub(crate) fn repair_notifiers(tree: &mut BoxTree, container: BoxHandle, plan: &RepairPlan<'_>) {
    let watchers: Vec<NotifierHandle> = tree.watchers(container).to_vec();
    let removed: HashSet<BoxHandle> = plan.removed.iter().copied().collect();
    let first_new = plan.replacement.first().copied();
    let last_new = plan.replacement.last().copied();

    let mut demoted = Vec::new();
    for nh in watchers {
        let n = tree.notifier_mut(nh);
        if n.missing {
            continue;
        }
        for prop in &mut n.props {
            let Some(first) = prop.first else { continue };
            if removed.contains(&first) {
                // The chain now starts at the replacement, or extends to
                // the next survivor, or dies with the content.
                prop.first = first_new.or(plan.next_survivor);
            } else if plan.insert_before == Some(first) {
                if let Some(new_first) = first_new {
                    prop.first = Some(new_first);
                }
            }
        }
        if let Some(last) = n.last {
            if removed.contains(&last) {
                n.last = last_new.or(plan.prev_survivor);
            } else if plan.insert_after == Some(last) {
                if let Some(new_last) = last_new {
                    n.last = Some(new_last);
                }
            }
        }
        if n.last.is_none() && n.props.iter().all(|p| p.first.is_none()) {
            n.missing = true;
            demoted.push(nh);
        }
    }
    for nh in demoted {
        tree.unregister_watcher(container, nh);
    }
}

/// Collects `h` and every box in its subtree.
pub(crate) fn collect_subtree(tree: &BoxTree, h: BoxHandle, out: &mut Vec<BoxHandle>) {
    out.push(h);
    if let BoxKind::Pile(_) = &tree.data(h).kind {
        let children: Vec<BoxHandle> = tree.children(h).to_vec();
        for child in children {
            collect_subtree(tree, child, out);
        }
    }
}

/// Frees every notifier all of whose box references lie in `doomed`, and
/// unregisters it everywhere. Must run before the doomed boxes are freed
/// and before repair, so repair never retargets a dead notifier's
/// references. `protected` notifiers survive even when fully covered;
/// contraction protects the anchor whose property is being contracted,
/// since repair will retarget it onto the replacement placeholder.
///
/// Returns the freed notifier handles.
pub(crate) fn excise_notifiers_within(
    tree: &mut BoxTree,
    doomed: &HashSet<BoxHandle>,
    protected: &[NotifierHandle],
) -> Vec<NotifierHandle> {
    // Candidates watch either a doomed container or the container of a
    // doomed box.
    let mut candidates: Vec<NotifierHandle> = Vec::new();
    let mut seen: HashSet<NotifierHandle> = HashSet::new();
    for &b in doomed {
        let mut containers: Vec<BoxHandle> = Vec::new();
        containers.push(b);
        if let Some(parent) = tree.data(b).parent {
            containers.push(parent);
        }
        for c in containers {
            for &nh in tree.watchers(c) {
                if seen.insert(nh) {
                    candidates.push(nh);
                }
            }
        }
    }

    let mut freed = Vec::new();
    for nh in candidates {
        if protected.contains(&nh) {
            continue;
        }
        let n = tree.notifier(nh);
        if n.missing {
            continue;
        }
        let all_doomed = n
            .props
            .iter()
            .filter_map(|p| p.first)
            .all(|b| doomed.contains(&b))
            && n.last.is_none_or(|b| doomed.contains(&b))
            && (n.last.is_some() || n.props.iter().any(|p| p.first.is_some()));
        if !all_doomed {
            continue;
        }
        let containers: Vec<BoxHandle> = n
            .props
            .iter()
            .filter_map(|p| p.first)
            .chain(n.last)
            .filter_map(|b| tree.data(b).parent)
            .collect();
        for c in containers {
            tree.unregister_watcher(c, nh);
        }
        tree.free_notifier(nh);
        freed.push(nh);
    }
    freed
}

/// Registers `nh` against the container of every box it references.
pub(crate) fn register_notifier_boxes(tree: &mut BoxTree, nh: NotifierHandle) {
    let n = tree.notifier(nh);
    let containers: Vec<BoxHandle> = n
        .props
        .iter()
        .filter_map(|p| p.first)
        .chain(n.last)
        .filter_map(|b| tree.data(b).parent)
        .collect();
    for c in containers {
        tree.register_watcher(c, nh);
    }
}
