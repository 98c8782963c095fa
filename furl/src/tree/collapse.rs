// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contraction of displayed content back into lazy boxes.
//!
//! The inverse of expansion: runs of displayed items whose boxes sit far
//! enough offscreen are replaced by a placeholder again, freeing their
//! boxes and notifiers. The viewport decides what is far enough; a box it
//! refuses once is remembered for the rest of the sweep so nothing gets
//! asked about twice. Item ids are re-read from the host when a
//! placeholder is built, never taken from the outgoing display, and the
//! measured heights become the placeholder's estimates so contraction
//! moves nothing on screen.

use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::host::{FactoryId, FragmentId, Viewport};
use crate::tree::data::{
    BoxData, BoxHandle, BoxKind, BoxStyle, BoxTree, LazyBox, LazyItems, NotifierHandle, PropKind,
    Uniformity,
};
use crate::tree::expand::{propagate_height_delta, reflow_container};
use crate::tree::notifier::{
    collect_subtree, excise_notifiers_within, repair_notifiers, RepairPlan,
};
use crate::tree::TreeCx;

/// Scratch for one contraction sweep.
#[derive(Debug, Default)]
struct Collapser {
    /// Boxes the viewport refused to let go.
    keep: HashSet<BoxHandle>,
    /// Ancestors of kept boxes; a container on the way to something kept
    /// cannot leave either.
    keep_ancestors: HashSet<BoxHandle>,
}

impl Collapser {
    fn mark_keep(&mut self, tree: &BoxTree, h: BoxHandle) {
        if !self.keep.insert(h) {
            return;
        }
        let mut cur = tree.data(h).parent;
        while let Some(p) = cur {
            if !self.keep_ancestors.insert(p) {
                break;
            }
            cur = tree.data(p).parent;
        }
    }

    fn is_kept(&self, h: BoxHandle) -> bool {
        self.keep.contains(&h) || self.keep_ancestors.contains(&h)
    }

    /// Whether `h`, with everything under it, may leave the tree.
    fn ok_to_convert_box(&mut self, tree: &BoxTree, viewport: &dyn Viewport, h: BoxHandle) -> bool {
        if self.is_kept(h) {
            return false;
        }
        // A box that draws against its neighbors stays; replacing it would
        // change how the survivors draw.
        if tree.data(h).style.cares_about_neighbors() {
            return false;
        }
        let top = tree.absolute_top(h);
        let bottom = top + tree.data(h).height;
        if !viewport.is_ok_to_make_lazy(top, bottom) {
            self.mark_keep(tree, h);
            return false;
        }
        true
    }
}

/// One piece of a property's box chain: either an existing placeholder or
/// the boxes of one displayed item.
enum Seg {
    Lazy,
    Object { index: usize, boxes: Vec<BoxHandle> },
}

/// A contiguous run of displayed items that may become one placeholder.
struct Candidate {
    anchor: NotifierHandle,
    prop_index: usize,
    factory: FactoryId,
    fragment: FragmentId,
    /// Item index of the first converted object.
    index_min: usize,
    /// Top-level boxes of each converted object, in chain order.
    object_boxes: Vec<Vec<BoxHandle>>,
}

/// Splits the chain of `anchor`'s property `prop_index` into segments,
/// assigning item indices by position.
///
/// Returns `None` when the chain cannot be accounted for item by item: a
/// box belongs to no item display, a display runs off the chain, or an
/// item displayed nothing at all (its index would silently shift every
/// later one). Such properties are left alone.
fn segment_chain(tree: &BoxTree, anchor: NotifierHandle, prop_index: usize) -> Option<Vec<Seg>> {
    let n = tree.notifier(anchor);
    let prop = &n.props[prop_index];
    let first = prop.first?;
    let next_start = n.props[prop_index + 1..].iter().find_map(|p| p.first);
    let last = n.last;

    let mut starts: HashMap<BoxHandle, NotifierHandle> = HashMap::new();
    for ch in tree.live_notifiers().collect::<Vec<_>>() {
        let c = tree.notifier(ch);
        if c.parent != Some(anchor) {
            continue;
        }
        if c.missing {
            log::warn!(
                "item display {ch:?} under {anchor:?} has lost its boxes; leaving the property as it is"
            );
            return None;
        }
        if let Some(fb) = c.first_box() {
            starts.insert(fb, ch);
        }
    }

    let mut segs = Vec::new();
    let mut index = 0;
    let mut cur = Some(first);
    while let Some(b) = cur {
        if Some(b) == next_start {
            break;
        }
        if let Some(lazy) = tree.data(b).as_lazy() {
            debug_assert_eq!(
                lazy.index_min, index,
                "placeholder drifted from its chain position"
            );
            index = lazy.index_min + lazy.items.len();
            segs.push(Seg::Lazy);
            if Some(b) == last {
                break;
            }
            cur = tree.next_sibling(b);
        } else if let Some(&child) = starts.get(&b) {
            let child_last = tree.notifier(child).last;
            let mut boxes = Vec::new();
            let mut walk = b;
            loop {
                boxes.push(walk);
                if Some(walk) == child_last {
                    break;
                }
                walk = tree.next_sibling(walk)?;
            }
            let end_box = walk;
            segs.push(Seg::Object { index, boxes });
            index += 1;
            if Some(end_box) == last {
                break;
            }
            cur = tree.next_sibling(end_box);
        } else {
            log::warn!(
                "box {b:?} in the chain of {anchor:?} belongs to no item display; leaving the property as it is"
            );
            return None;
        }
    }
    Some(segs)
}

/// Finds the first maximal run of convertible items anywhere in the tree.
fn find_something_to_convert(
    tree: &BoxTree,
    viewport: &dyn Viewport,
    collapser: &mut Collapser,
) -> Option<Candidate> {
    let all: Vec<NotifierHandle> = tree.live_notifiers().collect();
    for nh in all {
        let n = tree.notifier(nh);
        if n.missing {
            continue;
        }
        for (prop_index, prop) in n.props.iter().enumerate() {
            if prop.kind != PropKind::ObjectSequence {
                continue;
            }
            let Some((factory, fragment)) = prop.item_display else {
                continue;
            };
            let Some(segs) = segment_chain(tree, nh, prop_index) else {
                continue;
            };
            let mut s = 0;
            while s < segs.len() {
                let Seg::Object { index, boxes } = &segs[s] else {
                    s += 1;
                    continue;
                };
                if !boxes
                    .iter()
                    .all(|&b| collapser.ok_to_convert_box(tree, viewport, b))
                {
                    s += 1;
                    continue;
                }
                let mut object_boxes = alloc::vec![boxes.clone()];
                let mut e = s + 1;
                while e < segs.len() {
                    let Seg::Object { boxes, .. } = &segs[e] else {
                        break;
                    };
                    if !boxes
                        .iter()
                        .all(|&b| collapser.ok_to_convert_box(tree, viewport, b))
                    {
                        break;
                    }
                    object_boxes.push(boxes.clone());
                    e += 1;
                }
                return Some(Candidate {
                    anchor: nh,
                    prop_index,
                    factory,
                    fragment,
                    index_min: *index,
                    object_boxes,
                });
            }
        }
    }
    None
}

/// Replaces one candidate run with a placeholder.
fn convert_it(tree: &mut BoxTree, cx: &mut TreeCx<'_>, cand: &Candidate) -> BoxHandle {
    let (context, tag) = {
        let n = tree.notifier(cand.anchor);
        (n.object, n.props[cand.prop_index].tag)
    };
    let count = cand.object_boxes.len();
    let range = cand.index_min..cand.index_min + count;

    // Other views adjust first; then the item ids come back from the
    // model, never from the outgoing display.
    if let Some(sync) = cx.sync.as_deref_mut() {
        sync.contract_lazy_items(context, tag, range.clone());
    }
    let scale = tree.scale;
    let mut items = LazyItems::default();
    items.reserve(count);
    for (offset, boxes) in cand.object_boxes.iter().enumerate() {
        let id = cx.host.object_at(context, tag, cand.index_min + offset);
        let measured: f32 = boxes.iter().map(|&b| tree.data(b).height).sum();
        items.push(id, measured / scale);
    }

    let flat: Vec<BoxHandle> = cand.object_boxes.iter().flatten().copied().collect();
    let first = flat[0];
    let last_box = *flat.last().expect("converted an empty run");
    let container = tree.data(first).parent.expect("converted a parentless box");
    let idx = tree.child_index(first);
    let end_idx = tree.child_index(last_box) + 1;
    debug_assert_eq!(end_idx - idx, flat.len(), "converted run is not contiguous");

    // Notifiers living wholly inside the outgoing subtrees die now; the
    // anchor chain instead gets repaired onto the placeholder.
    let mut doomed_list = Vec::new();
    for &b in &flat {
        collect_subtree(tree, b, &mut doomed_list);
    }
    let doomed: HashSet<BoxHandle> = doomed_list.iter().copied().collect();
    let mut protected = Vec::new();
    let mut p = Some(cand.anchor);
    while let Some(nh) = p {
        protected.push(nh);
        p = tree.notifier(nh).parent;
    }
    excise_notifiers_within(tree, &doomed, &protected);

    let style = BoxStyle::inherited(&tree.data(container).style);
    let total = items.total_height() * scale;
    let mut lazy = LazyBox::new(items, cand.index_min, cand.factory, cand.fragment, context);
    // Measured heights are current at the width everything was laid out
    // at, so no re-estimate is due until the width changes.
    lazy.last_width = Some(cx.width);
    let new_box = tree.alloc_box(BoxData::new(style, BoxKind::Lazy(lazy)));
    tree.data_mut(new_box).height = total;

    let replacement = [new_box];
    let plan = RepairPlan {
        removed: &flat,
        replacement: &replacement,
        next_survivor: tree.next_sibling(last_box),
        prev_survivor: tree.prev_sibling(first),
        ..RepairPlan::default()
    };
    repair_notifiers(tree, container, &plan);
    tree.splice_children(container, idx..end_idx, &[new_box]);
    for b in doomed_list {
        tree.free_box(b);
    }

    let survivor = merge_adjacent(tree, new_box);
    let delta = reflow_container(tree, container, 0);
    propagate_height_delta(tree, container, delta);
    survivor
}

/// Folds `h` into adjacent placeholders that continue the same property
/// run. Returns the surviving handle.
fn merge_adjacent(tree: &mut BoxTree, h: BoxHandle) -> BoxHandle {
    let mut survivor = h;
    if let Some(prev) = tree.prev_sibling(survivor) {
        if mergeable(tree, prev, survivor) {
            survivor = merge_pair(tree, prev, survivor);
        }
    }
    if let Some(next) = tree.next_sibling(survivor) {
        if mergeable(tree, survivor, next) {
            survivor = merge_pair(tree, survivor, next);
        }
    }
    survivor
}

/// Whether `a` and its next sibling `b` are placeholders for adjacent
/// ranges of the same property, displayed the same way.
fn mergeable(tree: &BoxTree, a: BoxHandle, b: BoxHandle) -> bool {
    let (Some(la), Some(lb)) = (tree.data(a).as_lazy(), tree.data(b).as_lazy()) else {
        return false;
    };
    la.factory == lb.factory
        && la.fragment == lb.fragment
        && la.context == lb.context
        && la.index_min + la.items.len() == lb.index_min
}

/// Folds `b` into `a`, which precedes it, and deletes `b`.
fn merge_pair(tree: &mut BoxTree, a: BoxHandle, b: BoxHandle) -> BoxHandle {
    let container = tree.data(a).parent.expect("merged a parentless box");
    let (mut moved, b_width) = {
        let lazy_b = tree.data_mut(b).as_lazy_mut().expect("merged a non-lazy box");
        (core::mem::take(&mut lazy_b.items), lazy_b.last_width)
    };
    let b_height = tree.data(b).height;
    {
        let lazy_a = tree.data_mut(a).as_lazy_mut().expect("merged a non-lazy box");
        lazy_a.items.append(&mut moved);
        if lazy_a.last_width == b_width {
            // Both halves were measured at the same width; only the
            // uniformity claim is stale.
            lazy_a.uniform = Uniformity::Unknown;
        } else {
            lazy_a.invalidate_estimates();
        }
    }
    tree.data_mut(a).height += b_height;

    let idx = tree.child_index(b);
    let removed = [b];
    let replacement = [a];
    let plan = RepairPlan {
        removed: &removed,
        replacement: &replacement,
        ..RepairPlan::default()
    };
    repair_notifiers(tree, container, &plan);
    tree.splice_children(container, idx..idx + 1, &[]);
    tree.free_box(b);
    a
}

/// Contracts everything the viewport lets go of, run after run, until a
/// full pass finds nothing more. Returns how many placeholders were made
/// (merges not counted).
pub(crate) fn convert_as_much_as_possible(
    tree: &mut BoxTree,
    cx: &mut TreeCx<'_>,
    viewport: &dyn Viewport,
) -> usize {
    let mut collapser = Collapser::default();
    let mut converted = 0;
    while let Some(cand) = find_something_to_convert(tree, viewport, &mut collapser) {
        convert_it(tree, cx, &cand);
        converted += 1;
    }
    converted
}
