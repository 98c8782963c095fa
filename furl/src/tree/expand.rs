// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expansion of lazy boxes into real content.
//!
//! A lazy box stands in for a run of property items that have never been
//! displayed. Expansion picks a sub-range of those items, asks the host
//! to display them through a [`BoxBuilder`], and splices the built boxes
//! into the container in place of (or alongside) the placeholder. The
//! placeholder shrinks to whatever items were not expanded; an interior
//! expansion splits it in two.
//!
//! Order matters throughout: the synchronizer hears about the state
//! change first, notifiers are repaired before the child chain changes,
//! new notifiers register after the splice, and layout runs last.

use alloc::vec::Vec;
use core::ops::Range;

use crate::error::{BreakError, ExpandError};
use crate::host::ObjectId;
use crate::tree::builder::{BoxBuilder, BuiltFragment, StagedKind, StagedNotifier};
use crate::tree::data::{
    BoxData, BoxHandle, BoxKind, BoxTree, LazyBox, LayoutPhase, NotifierData, NotifierHandle,
    ParaBox, PileBox, PropEntry, Uniformity,
};
use crate::tree::notifier::{locate_owner, register_notifier_boxes, repair_notifiers, RepairPlan};
use crate::tree::para;
use crate::tree::TreeCx;

/// What an expansion left behind, in document order.
#[derive(Clone, Debug)]
pub struct Expansion {
    /// Lazy box still holding the items before the expanded range.
    pub prefix_lazy: Option<BoxHandle>,
    /// Boxes built for the expanded items, at splice level.
    pub expanded: Vec<BoxHandle>,
    /// Lazy box holding the items after the expanded range.
    pub suffix_lazy: Option<BoxHandle>,
}

/// Marks `h` as in layout for the duration of `f`, clearing the mark on
/// the way out even when `f` fails or deletes the box.
///
/// Panics if `h` is already in layout: a host callback has called back
/// into an operation on the box it is being asked about, which has no
/// sane answer.
fn with_layout_guard<T>(tree: &mut BoxTree, h: BoxHandle, f: impl FnOnce(&mut BoxTree) -> T) -> T {
    {
        let lazy = tree
            .data_mut(h)
            .as_lazy_mut()
            .expect("layout guard on a non-lazy box");
        assert!(
            lazy.phase == LayoutPhase::Idle,
            "reentered layout of lazy box {h:?}"
        );
        lazy.phase = LayoutPhase::InLayout;
    }
    let out = f(tree);
    if tree.is_live(h) {
        if let Some(lazy) = tree.data_mut(h).as_lazy_mut() {
            lazy.phase = LayoutPhase::Idle;
        }
    }
    out
}

/// Brings `h`'s item height estimates up to date for the context width
/// and returns the box's new total height in device units.
///
/// The host is probed at the first, middle, and last items; when all
/// three agree the whole box is assumed uniform and no further items are
/// asked about. Estimates are clamped to at least one layout unit so
/// every item stays reachable by a height walk.
pub(crate) fn refresh_lazy_height(tree: &mut BoxTree, cx: &mut TreeCx<'_>, h: BoxHandle) -> f32 {
    let width = cx.width;
    let scale = tree.scale;
    let (fresh, count) = {
        let lazy = tree.data(h).as_lazy().expect("refreshed a non-lazy box");
        (lazy.last_width == Some(width), lazy.items.len())
    };
    if !fresh && count > 0 {
        with_layout_guard(tree, h, |tree| {
            let (ids, fragment) = {
                let lazy = tree.data(h).as_lazy().expect("refreshed a non-lazy box");
                (lazy.items.ids().to_vec(), lazy.fragment)
            };
            let first = cx.host.estimate_height(ids[0], fragment, width).max(1.0);
            let mut uniform = true;
            let mut probed = 0;
            for i in [count / 2, count - 1] {
                if i == probed {
                    continue;
                }
                probed = i;
                let e = cx.host.estimate_height(ids[i], fragment, width).max(1.0);
                if e != first {
                    uniform = false;
                    break;
                }
            }
            if uniform {
                let lazy = tree.data_mut(h).as_lazy_mut().expect("refreshed a non-lazy box");
                for i in 0..count {
                    lazy.items.set_height(i, first);
                }
                lazy.uniform = Uniformity::Uniform(first);
                lazy.last_width = Some(width);
            } else {
                let mut heights = Vec::with_capacity(count);
                heights.push(first);
                for &id in &ids[1..] {
                    heights.push(cx.host.estimate_height(id, fragment, width).max(1.0));
                }
                let lazy = tree.data_mut(h).as_lazy_mut().expect("refreshed a non-lazy box");
                for (i, height) in heights.into_iter().enumerate() {
                    lazy.items.set_height(i, height);
                }
                lazy.uniform = Uniformity::Mixed;
                lazy.last_width = Some(width);
            }
        });
    }
    let total = {
        let lazy = tree.data(h).as_lazy().expect("refreshed a non-lazy box");
        lazy.items.total_height() * scale
    };
    tree.data_mut(h).height = total;
    total
}

/// The item range of lazy box `h` that must expand so the absolute
/// device-unit band `top..bottom` is covered by real boxes.
///
/// Always returns a non-empty range when the box has items, even for a
/// zero-height band or zero-height estimates; callers rely on expansion
/// making progress.
pub(crate) fn items_to_expand(
    tree: &BoxTree,
    h: BoxHandle,
    top: f32,
    bottom: f32,
) -> Range<usize> {
    let lazy = tree.data(h).as_lazy().expect("ranged a non-lazy box");
    let count = lazy.items.len();
    if count == 0 {
        return 0..0;
    }
    let box_top = tree.absolute_top(h);
    let local_top = (top - box_top) / tree.scale;
    let local_bottom = (bottom - box_top) / tree.scale;

    let mut min = None;
    let mut lim = None;
    let mut cum = 0.0;
    for i in 0..count {
        let next = cum + lazy.items.height(i);
        if min.is_none() && (next > local_top || cum >= local_top) {
            min = Some(i);
        }
        if let Some(m) = min {
            if i > m && cum >= local_bottom {
                lim = Some(i);
                break;
            }
        }
        cum = next;
    }
    // A band entirely below the estimates still expands the last item.
    let min = min.unwrap_or(count - 1);
    let lim = lim.unwrap_or(count).max(min + 1);
    min..lim
}

/// Expands items `range` of lazy box `h`.
///
/// The synchronizer (if any) is told first, then the host loads data and
/// displays each item into a staged build. Only a successful build
/// touches the tree: notifiers are repaired, the content is spliced in
/// around or in place of the placeholder, fresh notifiers register, and
/// layout brings heights and offsets up to date. A failed display leaves
/// the tree exactly as it was.
pub(crate) fn expand_items(
    tree: &mut BoxTree,
    cx: &mut TreeCx<'_>,
    h: BoxHandle,
    range: Range<usize>,
) -> Result<Expansion, ExpandError> {
    let (count, index_min, factory, fragment, context, style, prior_width, prior_uniform) = {
        let data = tree.data(h);
        let lazy = data.as_lazy().expect("expanded a non-lazy box");
        (
            lazy.items.len(),
            lazy.index_min,
            lazy.factory,
            lazy.fragment,
            lazy.context,
            data.style,
            lazy.last_width,
            lazy.uniform,
        )
    };
    let min = range.start.min(count);
    let lim = range.end.min(count);
    if lim <= min {
        log::warn!(
            "expansion request {}..{} names none of the {} items of {h:?}; nothing to expand",
            range.start,
            range.end,
            count,
        );
        return Ok(Expansion {
            prefix_lazy: Some(h),
            expanded: Vec::new(),
            suffix_lazy: None,
        });
    }
    let container = tree.data(h).parent.expect("expanded a parentless lazy box");

    with_layout_guard(tree, h, |tree| {
        let loc = locate_owner(tree, h);
        let anchor_level = tree.notifier(loc.notifier).level;

        // The synchronizer hears about the state change before the host
        // is asked for anything, so the host reads consistent state.
        let abs = (index_min + min)..(index_min + lim);
        if let Some(sync) = cx.sync.as_deref_mut() {
            sync.expand_lazy_items(context, loc.tag, abs.clone());
        }
        let ids: Vec<ObjectId> = {
            let lazy = tree.data(h).as_lazy().expect("expanded a non-lazy box");
            lazy.items.ids()[min..lim].to_vec()
        };
        cx.host.load_data_for(&ids, context, loc.tag, fragment, abs);

        let mut env = BoxBuilder::new(&style);
        for &id in &ids {
            env.open_object(id)?;
            cx.host.display(&mut env, factory, id, fragment)?;
            env.close_object()?;
        }
        let built = env.finish()?;

        let (map, roots, staged) = materialize_boxes(tree, built);
        let nmap = materialize_notifiers(tree, &staged, &map, loc.notifier, anchor_level);

        let idx = tree.child_index(h);
        let expansion = if min == 0 && lim == count {
            // The whole box goes away.
            let plan = RepairPlan {
                removed: &[h],
                replacement: &roots,
                next_survivor: tree.next_sibling(h),
                prev_survivor: tree.prev_sibling(h),
                ..RepairPlan::default()
            };
            repair_notifiers(tree, container, &plan);
            tree.splice_children(container, idx..idx + 1, &roots);
            tree.free_box(h);
            Expansion {
                prefix_lazy: None,
                expanded: roots.clone(),
                suffix_lazy: None,
            }
        } else if min == 0 {
            // A leading run expanded; the box keeps the tail.
            {
                let lazy = tree.data_mut(h).as_lazy_mut().expect("expanded a non-lazy box");
                lazy.items.drop_front(lim);
                lazy.index_min += lim;
            }
            let plan = RepairPlan {
                replacement: &roots,
                insert_before: Some(h),
                ..RepairPlan::default()
            };
            repair_notifiers(tree, container, &plan);
            tree.splice_children(container, idx..idx, &roots);
            Expansion {
                prefix_lazy: None,
                expanded: roots.clone(),
                suffix_lazy: Some(h),
            }
        } else if lim == count {
            // A trailing run expanded; the box keeps the head.
            {
                let lazy = tree.data_mut(h).as_lazy_mut().expect("expanded a non-lazy box");
                let _ = lazy.items.split_off(min);
            }
            let plan = RepairPlan {
                replacement: &roots,
                insert_after: Some(h),
                ..RepairPlan::default()
            };
            repair_notifiers(tree, container, &plan);
            tree.splice_children(container, idx + 1..idx + 1, &roots);
            Expansion {
                prefix_lazy: Some(h),
                expanded: roots.clone(),
                suffix_lazy: None,
            }
        } else {
            // An interior run expanded; the box splits around it.
            let trailing = {
                let lazy = tree.data_mut(h).as_lazy_mut().expect("expanded a non-lazy box");
                let tail = lazy.items.split_off(lim);
                let _ = lazy.items.split_off(min);
                let mut t = LazyBox::new(tail, index_min + lim, factory, fragment, context);
                // The tail's estimates are the ones it already carried.
                t.last_width = prior_width;
                t.uniform = prior_uniform;
                t
            };
            let t = tree.alloc_box(BoxData::new(style, BoxKind::Lazy(trailing)));
            let mut replacement = roots.clone();
            replacement.push(t);
            let plan = RepairPlan {
                replacement: &replacement,
                insert_after: Some(h),
                ..RepairPlan::default()
            };
            repair_notifiers(tree, container, &plan);
            tree.splice_children(container, idx + 1..idx + 1, &replacement);
            Expansion {
                prefix_lazy: Some(h),
                expanded: roots.clone(),
                suffix_lazy: Some(t),
            }
        };

        for &nh in &nmap {
            register_notifier_boxes(tree, nh);
        }

        for &b in &expansion.expanded {
            layout_box(tree, cx, b)?;
        }
        if let Some(t) = expansion.suffix_lazy {
            if t != h {
                layout_box(tree, cx, t)?;
            }
        }
        if tree.is_live(h) {
            let total = {
                let lazy = tree.data(h).as_lazy().expect("expanded a non-lazy box");
                lazy.items.total_height() * tree.scale
            };
            tree.data_mut(h).height = total;
        }
        let delta = reflow_container(tree, container, idx);
        propagate_height_delta(tree, container, delta);
        Ok(expansion)
    })
}

/// Expands every item of `h`. An empty placeholder simply dissolves.
pub(crate) fn expand_fully(
    tree: &mut BoxTree,
    cx: &mut TreeCx<'_>,
    h: BoxHandle,
) -> Result<Expansion, ExpandError> {
    let count = tree.data(h).as_lazy().expect("expanded a non-lazy box").items.len();
    if count == 0 {
        return Ok(dissolve_empty(tree, h));
    }
    expand_items(tree, cx, h, 0..count)
}

/// Expands just the first item of `h`.
pub(crate) fn expand_next(
    tree: &mut BoxTree,
    cx: &mut TreeCx<'_>,
    h: BoxHandle,
) -> Result<Expansion, ExpandError> {
    expand_items(tree, cx, h, 0..1)
}

/// Splices an itemless lazy box out of the tree.
fn dissolve_empty(tree: &mut BoxTree, h: BoxHandle) -> Expansion {
    let container = tree.data(h).parent.expect("dissolved a parentless box");
    let idx = tree.child_index(h);
    let plan = RepairPlan {
        removed: &[h],
        next_survivor: tree.next_sibling(h),
        prev_survivor: tree.prev_sibling(h),
        ..RepairPlan::default()
    };
    repair_notifiers(tree, container, &plan);
    tree.splice_children(container, idx..idx + 1, &[]);
    tree.free_box(h);
    let delta = reflow_container(tree, container, idx);
    propagate_height_delta(tree, container, delta);
    Expansion {
        prefix_lazy: None,
        expanded: Vec::new(),
        suffix_lazy: None,
    }
}

/// Moves a finished build's boxes into the arena.
///
/// Staged indices order parents before their children, so allocating in
/// reverse lets every pile resolve its children as it lands; parent links
/// for nested children are set here, splice-level parents by the splice.
/// Returns the staged-index-to-handle map, the splice-level handles, and
/// the staged notifiers still to be materialized.
fn materialize_boxes(
    tree: &mut BoxTree,
    built: BuiltFragment,
) -> (Vec<BoxHandle>, Vec<BoxHandle>, Vec<StagedNotifier>) {
    let BuiltFragment {
        boxes: mut staged_boxes,
        roots,
        notifiers,
    } = built;
    let mut map = alloc::vec![BoxHandle(0); staged_boxes.len()];
    while let Some(staged) = staged_boxes.pop() {
        let i = staged_boxes.len();
        let handle = match staged.kind {
            StagedKind::Pile { children } => {
                let mapped: Vec<BoxHandle> = children.into_iter().map(|c| map[c]).collect();
                let handle = tree.alloc_box(BoxData::new(
                    staged.style,
                    BoxKind::Pile(PileBox {
                        children: mapped.clone(),
                    }),
                ));
                for &c in &mapped {
                    tree.data_mut(c).parent = Some(handle);
                }
                handle
            }
            StagedKind::Para { text, spans } => tree.alloc_box(BoxData::new(
                staged.style,
                BoxKind::Para(ParaBox {
                    text,
                    spans,
                    lines: Vec::new(),
                    last_width: None,
                }),
            )),
            StagedKind::Lazy {
                items,
                index_min,
                factory,
                fragment,
                context,
            } => tree.alloc_box(BoxData::new(
                staged.style,
                BoxKind::Lazy(LazyBox::new(items, index_min, factory, fragment, context)),
            )),
        };
        map[i] = handle;
    }
    let root_handles = roots.iter().map(|&r| map[r]).collect();
    (map, root_handles, notifiers)
}

/// Moves staged notifiers into the arena, hanging top-level ones off
/// `anchor`.
fn materialize_notifiers(
    tree: &mut BoxTree,
    staged: &[StagedNotifier],
    map: &[BoxHandle],
    anchor: NotifierHandle,
    anchor_level: u32,
) -> Vec<NotifierHandle> {
    let mut nmap: Vec<NotifierHandle> = Vec::with_capacity(staged.len());
    for s in staged {
        let (parent, level) = match s.parent {
            None => (Some(anchor), anchor_level + 1),
            Some(p) => {
                let ph = nmap[p];
                (Some(ph), tree.notifier(ph).level + 1)
            }
        };
        let props: smallvec::SmallVec<[PropEntry; 4]> = s
            .props
            .iter()
            .map(|p| PropEntry {
                tag: p.tag,
                kind: p.kind,
                first: p.first.map(|b| map[b]),
                item_display: p.item_display,
            })
            .collect();
        let last = s.last.map(|b| map[b]);
        // An object that displayed nothing starts out missing.
        let missing = last.is_none() && props.iter().all(|p| p.first.is_none());
        let nh = tree.alloc_notifier(NotifierData {
            object: s.object,
            level,
            parent,
            props,
            last,
            missing,
        });
        nmap.push(nh);
    }
    nmap
}

/// Lays out `h` and everything under it at the context width, returning
/// its height in device units. Paragraphs already laid out at this width
/// are left alone.
pub(crate) fn layout_box(
    tree: &mut BoxTree,
    cx: &mut TreeCx<'_>,
    h: BoxHandle,
) -> Result<f32, BreakError> {
    enum Plan {
        Pile(Vec<BoxHandle>),
        Para,
        ParaClean(f32),
        Lazy,
    }
    let plan = match &tree.data(h).kind {
        BoxKind::Pile(pile) => Plan::Pile(pile.children.clone()),
        BoxKind::Para(p) if p.last_width == Some(cx.width) => Plan::ParaClean(tree.data(h).height),
        BoxKind::Para(_) => Plan::Para,
        BoxKind::Lazy(_) => Plan::Lazy,
    };
    match plan {
        Plan::Pile(children) => {
            let mut top = 0.0;
            for child in children {
                let height = layout_box(tree, cx, child)?;
                tree.data_mut(child).top = top;
                top += height;
            }
            tree.data_mut(h).height = top;
            Ok(top)
        }
        Plan::ParaClean(height) => Ok(height),
        Plan::Para => {
            let mut para = {
                let BoxKind::Para(p) = &mut tree.data_mut(h).kind else {
                    unreachable!("paragraph plan for a non-paragraph box");
                };
                core::mem::replace(
                    p,
                    ParaBox {
                        text: alloc::string::String::new(),
                        spans: smallvec::SmallVec::new(),
                        lines: Vec::new(),
                        last_width: None,
                    },
                )
            };
            let result = para::layout_paragraph(&mut para, cx.lcx, cx.shaper, cx.width);
            para.last_width = Some(cx.width);
            let BoxKind::Para(p) = &mut tree.data_mut(h).kind else {
                unreachable!("paragraph plan for a non-paragraph box");
            };
            *p = para;
            let height = result?;
            tree.data_mut(h).height = height;
            Ok(height)
        }
        Plan::Lazy => Ok(refresh_lazy_height(tree, cx, h)),
    }
}

/// Restacks `container`'s children from child index `from` on and
/// returns the change in the container's height.
pub(crate) fn reflow_container(tree: &mut BoxTree, container: BoxHandle, from: usize) -> f32 {
    let children: Vec<BoxHandle> = tree.children(container).to_vec();
    let mut top = match from.checked_sub(1).and_then(|i| children.get(i)) {
        Some(&prev) => tree.data(prev).top + tree.data(prev).height,
        None => 0.0,
    };
    for &child in children.get(from..).unwrap_or(&[]) {
        tree.data_mut(child).top = top;
        top += tree.data(child).height;
    }
    let old = tree.data(container).height;
    tree.data_mut(container).height = top;
    top - old
}

/// Pushes a height change of `changed` up the tree: later siblings at
/// every level shift, ancestors grow.
pub(crate) fn propagate_height_delta(tree: &mut BoxTree, changed: BoxHandle, delta: f32) {
    if delta == 0.0 {
        return;
    }
    let mut cur = changed;
    while let Some(parent) = tree.data(cur).parent {
        let idx = tree.child_index(cur);
        let siblings: Vec<BoxHandle> = tree.children(parent).to_vec();
        for &sib in &siblings[idx + 1..] {
            tree.data_mut(sib).top += delta;
        }
        tree.data_mut(parent).height += delta;
        cur = parent;
    }
}

/// Depth-first search for a lazy box whose current extent touches the
/// absolute band `top..=bottom`. Boundary contact counts, so degenerate
/// bands still find something to expand.
pub(crate) fn find_lazy_in_band(tree: &BoxTree, top: f32, bottom: f32) -> Option<BoxHandle> {
    fn walk(tree: &BoxTree, h: BoxHandle, base: f32, top: f32, bottom: f32) -> Option<BoxHandle> {
        let data = tree.data(h);
        let box_top = base + data.top;
        if box_top > bottom || box_top + data.height < top {
            return None;
        }
        match &data.kind {
            BoxKind::Lazy(_) => Some(h),
            BoxKind::Para(_) => None,
            BoxKind::Pile(pile) => {
                for &child in &pile.children {
                    if let Some(found) = walk(tree, child, box_top, top, bottom) {
                        return Some(found);
                    }
                }
                None
            }
        }
    }
    walk(tree, tree.root, 0.0, top, bottom)
}
