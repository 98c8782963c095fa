// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for boxes and notifiers.
//!
//! Boxes and notifiers form a graph with back references in both
//! directions (parent links, property start boxes, notifier parents).
//! Everything lives in two arenas indexed by stable integer handles;
//! references between records are plain handles, never owning. Deleting a
//! record goes through the repair logic in [`notifier`](super::notifier)
//! first, so no live record ever holds a handle to a freed slot.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::analysis::WsSpan;
use crate::host::{FactoryId, FragmentId, ObjectId, PropertyTag, WsId};
use crate::tree::para::LineInfo;

/// Stable handle of a box in the tree arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoxHandle(pub(crate) u32);

/// Stable handle of a notifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotifierHandle(pub(crate) u32);

/// Tag recorded for content that is not a real attribute of the open
/// object (labels and separators the host adds between properties).
pub(crate) const NOT_AN_ATTR: PropertyTag = PropertyTag(u32::MAX);

/// Display properties a box carries.
///
/// Only the writing system inherits into boxes created on an object's
/// behalf; the flags are per-box and reset on inheritance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoxStyle {
    /// Default writing system for text in this box.
    pub ws: WsId,
    /// Border on the leading edge.
    pub border_leading: bool,
    /// Border on the trailing edge.
    pub border_trailing: bool,
    /// Border above.
    pub border_top: bool,
    /// Border below.
    pub border_bottom: bool,
    /// Painted background.
    pub background: bool,
    /// Bullet or number decoration.
    pub bullet: bool,
}

impl BoxStyle {
    /// Style for a box that inherits from `container`: the writing system
    /// carries over, everything non-inheritable resets.
    pub fn inherited(container: &Self) -> Self {
        Self {
            ws: container.ws,
            ..Self::default()
        }
    }

    /// Whether replacing a neighbor of this box could change how it draws
    /// (borders merge with neighbors, backgrounds and bullets align to
    /// them).
    pub fn cares_about_neighbors(&self) -> bool {
        self.border_leading
            || self.border_trailing
            || self.border_top
            || self.border_bottom
            || self.background
            || self.bullet
    }
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            ws: WsId(0),
            border_leading: false,
            border_trailing: false,
            border_top: false,
            border_bottom: false,
            background: false,
            bullet: false,
        }
    }
}

/// The item ids and estimated heights a lazy box stands in for.
///
/// Ids and heights are parallel arrays; every operation keeps them the
/// same length. Heights are in layout units, not yet scaled to device
/// units.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LazyItems {
    ids: Vec<ObjectId>,
    heights: Vec<f32>,
}

impl LazyItems {
    /// Items with the given ids and a zero height estimate for each.
    pub fn from_ids(ids: Vec<ObjectId>) -> Self {
        let heights = alloc::vec![0.0; ids.len()];
        Self { ids, heights }
    }

    /// Items from parallel id and height arrays.
    ///
    /// Panics if the arrays differ in length; that is a caller bug that
    /// would corrupt every later height walk.
    pub fn new(ids: Vec<ObjectId>, heights: Vec<f32>) -> Self {
        assert_eq!(
            ids.len(),
            heights.len(),
            "lazy item ids and heights must stay parallel"
        );
        Self { ids, heights }
    }

    /// Number of represented items.
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.ids.len(), self.heights.len());
        self.ids.len()
    }

    /// Whether no items remain.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The represented object ids, in order.
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    /// The estimated height of item `i`, layout units.
    pub fn height(&self, i: usize) -> f32 {
        self.heights[i]
    }

    /// Replaces the estimated height of item `i`.
    pub fn set_height(&mut self, i: usize, height: f32) {
        self.heights[i] = height;
    }

    /// Sum of all estimated heights, layout units.
    pub fn total_height(&self) -> f32 {
        self.heights.iter().sum()
    }

    /// Grows capacity for `additional` more items in both arrays.
    pub fn reserve(&mut self, additional: usize) {
        self.ids.reserve(additional);
        self.heights.reserve(additional);
    }

    /// Appends one item.
    pub fn push(&mut self, id: ObjectId, height: f32) {
        self.ids.push(id);
        self.heights.push(height);
    }

    /// Splits off and returns the items from `at` onward.
    pub fn split_off(&mut self, at: usize) -> Self {
        Self {
            ids: self.ids.split_off(at),
            heights: self.heights.split_off(at),
        }
    }

    /// Drops the first `n` items.
    pub fn drop_front(&mut self, n: usize) {
        self.ids.drain(..n);
        self.heights.drain(..n);
    }

    /// Appends all items of `other`.
    pub fn append(&mut self, other: &mut Self) {
        self.ids.append(&mut other.ids);
        self.heights.append(&mut other.heights);
    }
}

/// Whether the estimates in a lazy box are known to be all equal.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum Uniformity {
    /// Not yet measured at the current width.
    #[default]
    Unknown,
    /// Every item estimate equals this height (layout units).
    Uniform(f32),
    /// Estimates differ.
    Mixed,
}

/// Reentrancy state of a lazy box.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum LayoutPhase {
    /// No layout pass is touching the box.
    #[default]
    Idle,
    /// A layout or expansion pass is running on the box. Entering again
    /// is a fatal programming error.
    InLayout,
}

/// Placeholder for a not-yet-displayed sub-range of a property.
#[derive(Clone, Debug)]
pub(crate) struct LazyBox {
    /// The deferred items.
    pub(crate) items: LazyItems,
    /// Property index of the first item.
    pub(crate) index_min: usize,
    /// Display factory that will build the items.
    pub(crate) factory: FactoryId,
    /// Fragment the factory displays the items with.
    pub(crate) fragment: FragmentId,
    /// Object whose property the items belong to.
    pub(crate) context: ObjectId,
    /// Width the current estimates were computed at, device units.
    pub(crate) last_width: Option<f32>,
    pub(crate) uniform: Uniformity,
    pub(crate) phase: LayoutPhase,
}

impl LazyBox {
    pub(crate) fn new(
        items: LazyItems,
        index_min: usize,
        factory: FactoryId,
        fragment: FragmentId,
        context: ObjectId,
    ) -> Self {
        Self {
            items,
            index_min,
            factory,
            fragment,
            context,
            last_width: None,
            uniform: Uniformity::Unknown,
            phase: LayoutPhase::Idle,
        }
    }

    /// Forgets cached estimate state after the item set changed.
    pub(crate) fn invalidate_estimates(&mut self) {
        self.last_width = None;
        self.uniform = Uniformity::Unknown;
    }
}

/// A vertical stack of child boxes.
#[derive(Clone, Debug, Default)]
pub(crate) struct PileBox {
    pub(crate) children: Vec<BoxHandle>,
}

/// A paragraph of text with its laid-out lines.
#[derive(Clone, Debug)]
pub(crate) struct ParaBox {
    pub(crate) text: String,
    /// Writing system spans tiling `text`.
    pub(crate) spans: SmallVec<[WsSpan; 2]>,
    /// Lines from the most recent layout, top to bottom.
    pub(crate) lines: Vec<LineInfo>,
    /// Width the lines were laid out at; `None` until first laid out.
    pub(crate) last_width: Option<f32>,
}

#[derive(Clone, Debug)]
pub(crate) enum BoxKind {
    Pile(PileBox),
    Para(ParaBox),
    Lazy(LazyBox),
}

/// One box record.
#[derive(Clone, Debug)]
pub(crate) struct BoxData {
    pub(crate) parent: Option<BoxHandle>,
    /// Offset from the parent's content top, device units.
    pub(crate) top: f32,
    /// Height, device units. For lazy boxes this is the estimated total.
    pub(crate) height: f32,
    pub(crate) style: BoxStyle,
    pub(crate) kind: BoxKind,
}

impl BoxData {
    pub(crate) fn new(style: BoxStyle, kind: BoxKind) -> Self {
        Self {
            parent: None,
            top: 0.0,
            height: 0.0,
            style,
            kind,
        }
    }

    pub(crate) fn as_lazy(&self) -> Option<&LazyBox> {
        match &self.kind {
            BoxKind::Lazy(lazy) => Some(lazy),
            _ => None,
        }
    }

    pub(crate) fn as_lazy_mut(&mut self) -> Option<&mut LazyBox> {
        match &mut self.kind {
            BoxKind::Lazy(lazy) => Some(lazy),
            _ => None,
        }
    }
}

/// What a notifier records about one displayed property.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct PropEntry {
    pub(crate) tag: PropertyTag,
    pub(crate) kind: PropKind,
    /// First box displaying this property, if any content was built.
    pub(crate) first: Option<BoxHandle>,
    /// How the property's items are displayed, when known. Contraction
    /// can only rebuild a placeholder for a property that remembers this.
    pub(crate) item_display: Option<(FactoryId, FragmentId)>,
}

/// How a property entry participates in lookup and contraction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PropKind {
    /// A sequence of objects, each with its own display. Eligible for
    /// contraction back into a lazy box.
    ObjectSequence,
    /// A regenerable single-value property.
    Inner,
    /// Content that is not an attribute of the object (labels,
    /// separators). Skipped by owner lookup.
    Literal,
    /// Spacing with no regenerable content. Skipped by owner lookup.
    Gap,
}

impl PropKind {
    /// Whether owner lookup may attribute boxes to this entry.
    pub(crate) fn locatable(self) -> bool {
        matches!(self, Self::ObjectSequence | Self::Inner)
    }
}

/// Records how one object's display maps onto boxes.
#[derive(Clone, Debug)]
pub(crate) struct NotifierData {
    /// The displayed object.
    pub(crate) object: ObjectId,
    /// Nesting depth; the root content notifier is level 0.
    pub(crate) level: u32,
    pub(crate) parent: Option<NotifierHandle>,
    pub(crate) props: SmallVec<[PropEntry; 4]>,
    /// Last box of the whole display.
    pub(crate) last: Option<BoxHandle>,
    /// Set when every box of the display has been deleted; the notifier
    /// stays allocated so stale references fail soft, but it no longer
    /// answers lookups.
    pub(crate) missing: bool,
}

impl NotifierData {
    /// Whether `h` appears as a property start or as the last box.
    pub(crate) fn references(&self, h: BoxHandle) -> bool {
        self.last == Some(h) || self.props.iter().any(|p| p.first == Some(h))
    }

    /// First box of the whole display. Properties are recorded in display
    /// order, so the first one with content starts the display.
    pub(crate) fn first_box(&self) -> Option<BoxHandle> {
        self.props.iter().find_map(|p| p.first)
    }
}

/// The box tree: arenas, the registry, and the root box.
pub struct BoxTree {
    pub(crate) boxes: Vec<Option<BoxData>>,
    pub(crate) notifiers: Vec<Option<NotifierData>>,
    /// For each container box, the notifiers whose property chains run
    /// through its children. Owner lookup starts here.
    pub(crate) registry: HashMap<BoxHandle, Vec<NotifierHandle>>,
    pub(crate) root: BoxHandle,
    /// Device units per layout unit. Host estimates are multiplied by
    /// this before entering box geometry.
    pub(crate) scale: f32,
}

impl core::fmt::Debug for BoxTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoxTree")
            .field("boxes", &self.boxes.len())
            .field("notifiers", &self.notifiers.len())
            .field("registry", &self.registry.len())
            .field("root", &self.root)
            .field("scale", &self.scale)
            .finish()
    }
}

impl BoxTree {
    pub(crate) fn empty(scale: f32) -> Self {
        let mut tree = Self {
            boxes: Vec::new(),
            notifiers: Vec::new(),
            registry: HashMap::new(),
            root: BoxHandle(0),
            scale,
        };
        let root = tree.alloc_box(BoxData::new(
            BoxStyle::default(),
            BoxKind::Pile(PileBox::default()),
        ));
        tree.root = root;
        tree
    }

    pub(crate) fn alloc_box(&mut self, data: BoxData) -> BoxHandle {
        let h = BoxHandle(u32::try_from(self.boxes.len()).expect("box arena overflow"));
        self.boxes.push(Some(data));
        h
    }

    /// Frees a box slot. All references to it must already have been
    /// repaired away; the registry entry for a freed container must be
    /// empty.
    pub(crate) fn free_box(&mut self, h: BoxHandle) {
        if let Some(watchers) = self.registry.remove(&h) {
            debug_assert!(
                watchers.is_empty(),
                "freed container {h:?} still had registered notifiers"
            );
        }
        let slot = self.boxes.get_mut(h.0 as usize).expect("stale box handle");
        assert!(slot.is_some(), "double free of box {h:?}");
        *slot = None;
    }

    pub(crate) fn data(&self, h: BoxHandle) -> &BoxData {
        self.boxes
            .get(h.0 as usize)
            .and_then(Option::as_ref)
            .expect("stale box handle")
    }

    pub(crate) fn data_mut(&mut self, h: BoxHandle) -> &mut BoxData {
        self.boxes
            .get_mut(h.0 as usize)
            .and_then(Option::as_mut)
            .expect("stale box handle")
    }

    /// Whether `h` currently names a live box.
    pub(crate) fn is_live(&self, h: BoxHandle) -> bool {
        self.boxes
            .get(h.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    pub(crate) fn children(&self, h: BoxHandle) -> &[BoxHandle] {
        match &self.data(h).kind {
            BoxKind::Pile(pile) => &pile.children,
            _ => &[],
        }
    }

    /// Position of `h` among its parent's children.
    pub(crate) fn child_index(&self, h: BoxHandle) -> usize {
        let parent = self.data(h).parent.expect("box has no container");
        self.children(parent)
            .iter()
            .position(|&c| c == h)
            .expect("box missing from its container")
    }

    pub(crate) fn next_sibling(&self, h: BoxHandle) -> Option<BoxHandle> {
        let parent = self.data(h).parent?;
        let idx = self.child_index(h);
        self.children(parent).get(idx + 1).copied()
    }

    pub(crate) fn prev_sibling(&self, h: BoxHandle) -> Option<BoxHandle> {
        let parent = self.data(h).parent?;
        let idx = self.child_index(h);
        idx.checked_sub(1)
            .map(|i| self.children(parent)[i])
    }

    /// Replaces children `range` of `parent` with `replacement`, returning
    /// the boxes removed. Parents of inserted boxes are set; removed boxes
    /// keep their (now dangling) parent link and must be freed or
    /// re-spliced by the caller.
    pub(crate) fn splice_children(
        &mut self,
        parent: BoxHandle,
        range: core::ops::Range<usize>,
        replacement: &[BoxHandle],
    ) -> Vec<BoxHandle> {
        let BoxKind::Pile(pile) = &mut self.data_mut(parent).kind else {
            panic!("spliced into a non-container box");
        };
        let removed: Vec<BoxHandle> = pile
            .children
            .splice(range, replacement.iter().copied())
            .collect();
        for &child in replacement {
            self.data_mut(child).parent = Some(parent);
        }
        removed
    }

    /// Absolute top of `h` in device units, measured from the root.
    pub(crate) fn absolute_top(&self, h: BoxHandle) -> f32 {
        let mut top = self.data(h).top;
        let mut cur = self.data(h).parent;
        while let Some(p) = cur {
            top += self.data(p).top;
            cur = self.data(p).parent;
        }
        top
    }

    pub(crate) fn alloc_notifier(&mut self, data: NotifierData) -> NotifierHandle {
        let h = NotifierHandle(
            u32::try_from(self.notifiers.len()).expect("notifier arena overflow"),
        );
        self.notifiers.push(Some(data));
        h
    }

    pub(crate) fn free_notifier(&mut self, h: NotifierHandle) {
        let slot = self
            .notifiers
            .get_mut(h.0 as usize)
            .expect("stale notifier handle");
        assert!(slot.is_some(), "double free of notifier {h:?}");
        *slot = None;
    }

    pub(crate) fn notifier(&self, h: NotifierHandle) -> &NotifierData {
        self.notifiers
            .get(h.0 as usize)
            .and_then(Option::as_ref)
            .expect("stale notifier handle")
    }

    pub(crate) fn notifier_mut(&mut self, h: NotifierHandle) -> &mut NotifierData {
        self.notifiers
            .get_mut(h.0 as usize)
            .and_then(Option::as_mut)
            .expect("stale notifier handle")
    }

    /// Notifiers whose property chains run through `container`'s children.
    pub(crate) fn watchers(&self, container: BoxHandle) -> &[NotifierHandle] {
        self.registry.get(&container).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn register_watcher(&mut self, container: BoxHandle, n: NotifierHandle) {
        let watchers = self.registry.entry(container).or_default();
        if !watchers.contains(&n) {
            watchers.push(n);
        }
    }

    pub(crate) fn unregister_watcher(&mut self, container: BoxHandle, n: NotifierHandle) {
        if let Some(watchers) = self.registry.get_mut(&container) {
            watchers.retain(|&w| w != n);
            if watchers.is_empty() {
                self.registry.remove(&container);
            }
        }
    }

    /// All live notifier handles, in allocation order.
    pub(crate) fn live_notifiers(&self) -> impl Iterator<Item = NotifierHandle> + '_ {
        self.notifiers.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|_| NotifierHandle(u32::try_from(i).expect("notifier arena overflow")))
        })
    }
}
