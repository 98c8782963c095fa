// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The demand-driven box tree.
//!
//! A freshly loaded view is a single lazy box: a placeholder carrying the
//! item ids of a property and a height estimate per item, but no real
//! content. [`BoxTree::prepare_range`] expands exactly enough of it for a
//! band of the document to be displayable; scrolling far away lets
//! [`BoxTree::increase_laziness`] fold offscreen content back into
//! placeholders. Either direction goes through the host callbacks in a
//! fixed order, so parallel views and the backing model never observe a
//! half-adjusted tree.

pub(crate) mod builder;
pub(crate) mod collapse;
pub(crate) mod data;
pub(crate) mod expand;
pub(crate) mod notifier;
pub(crate) mod para;

pub use builder::BoxBuilder;
pub use data::{BoxHandle, BoxStyle, BoxTree, LazyItems, NotifierHandle, PropKind};
pub use expand::Expansion;
pub use notifier::PropLocation;
pub use para::LineInfo;

use alloc::vec::Vec;
use core::ops::Range;

use smallvec::smallvec;

use crate::context::LayoutContext;
use crate::error::{BreakError, ExpandError};
use crate::host::{FactoryId, FragmentId, ObjectId, PropertyTag, Synchronizer, ViewHost, Viewport};
use crate::shape::Shaper;
use crate::tree::data::{BoxData, BoxKind, LazyBox, NotifierData, PropEntry};

/// Everything a tree operation needs from outside the tree.
pub struct TreeCx<'a> {
    /// Shared text analysis state (segmenters, normalizer, bidi tables).
    pub lcx: &'a mut LayoutContext,
    /// Shapes text runs into cluster advances.
    pub shaper: &'a mut dyn Shaper,
    /// The embedding application.
    pub host: &'a mut dyn ViewHost,
    /// Keeps other views of the same data in step, when there are any.
    pub sync: Option<&'a mut dyn Synchronizer>,
    /// Available layout width, device units.
    pub width: f32,
}

impl core::fmt::Debug for TreeCx<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeCx")
            .field("sync", &self.sync.is_some())
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

impl BoxTree {
    /// An empty tree. `scale` is the number of device units per layout
    /// unit and applies to every host height estimate.
    ///
    /// Panics unless `scale` is positive.
    pub fn new(scale: f32) -> Self {
        assert!(scale > 0.0, "scale must be positive");
        Self::empty(scale)
    }

    /// The root container.
    pub fn root(&self) -> BoxHandle {
        self.root
    }

    /// Device units per layout unit.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Replaces the whole tree with one placeholder for items `ids` of
    /// property `tag` on `context`, displayed on demand by `factory` with
    /// `fragment`. Estimates are refreshed at the context width.
    pub fn set_root_contents(
        &mut self,
        cx: &mut TreeCx<'_>,
        factory: FactoryId,
        fragment: FragmentId,
        context: ObjectId,
        tag: PropertyTag,
        ids: Vec<ObjectId>,
    ) {
        *self = Self::empty(self.scale);
        let root = self.root;
        let lazy = self.alloc_box(BoxData::new(
            BoxStyle::default(),
            BoxKind::Lazy(LazyBox::new(
                data::LazyItems::from_ids(ids),
                0,
                factory,
                fragment,
                context,
            )),
        ));
        self.splice_children(root, 0..0, &[lazy]);
        let notifier = self.alloc_notifier(NotifierData {
            object: context,
            level: 0,
            parent: None,
            props: smallvec![PropEntry {
                tag,
                kind: PropKind::ObjectSequence,
                first: Some(lazy),
                item_display: Some((factory, fragment)),
            }],
            last: Some(lazy),
            missing: false,
        });
        self.register_watcher(root, notifier);
        let _ = expand::refresh_lazy_height(self, cx, lazy);
        let _ = expand::reflow_container(self, root, 0);
    }

    /// Expands placeholders until the absolute device-unit band
    /// `top..bottom` is covered by real content.
    ///
    /// Runs a layout pass first, so the band is interpreted against
    /// up-to-date geometry even when the width just changed. Each
    /// expansion makes progress, so the loop ends once nothing lazy
    /// touches the band.
    pub fn prepare_range(
        &mut self,
        cx: &mut TreeCx<'_>,
        top: f32,
        bottom: f32,
    ) -> Result<(), ExpandError> {
        let root = self.root;
        expand::layout_box(self, cx, root)?;
        loop {
            let Some(h) = expand::find_lazy_in_band(self, top, bottom) else {
                return Ok(());
            };
            let range = expand::items_to_expand(self, h, top, bottom);
            expand::expand_items(self, cx, h, range)?;
        }
    }

    /// Expands items `range` of the lazy box `h`. See
    /// [`Expansion`] for what is left behind.
    pub fn expand_items(
        &mut self,
        cx: &mut TreeCx<'_>,
        h: BoxHandle,
        range: Range<usize>,
    ) -> Result<Expansion, ExpandError> {
        expand::expand_items(self, cx, h, range)
    }

    /// Expands every item of the lazy box `h`. An itemless placeholder
    /// dissolves without host involvement.
    pub fn expand_fully(
        &mut self,
        cx: &mut TreeCx<'_>,
        h: BoxHandle,
    ) -> Result<Expansion, ExpandError> {
        expand::expand_fully(self, cx, h)
    }

    /// Expands just the first item of the lazy box `h`.
    pub fn expand_next(
        &mut self,
        cx: &mut TreeCx<'_>,
        h: BoxHandle,
    ) -> Result<Expansion, ExpandError> {
        expand::expand_next(self, cx, h)
    }

    /// Expands placeholders everywhere until none remain. A second call
    /// finds nothing to do.
    pub fn expand_all(&mut self, cx: &mut TreeCx<'_>) -> Result<(), ExpandError> {
        loop {
            let Some(h) = self.first_lazy() else {
                return Ok(());
            };
            expand::expand_fully(self, cx, h)?;
        }
    }

    /// The item range of lazy box `h` that [`prepare_range`] would expand
    /// for the band `top..bottom`. Non-empty whenever the box has items.
    ///
    /// [`prepare_range`]: Self::prepare_range
    pub fn items_to_expand(&self, h: BoxHandle, top: f32, bottom: f32) -> Range<usize> {
        expand::items_to_expand(self, h, top, bottom)
    }

    /// Contracts displayed content the viewport no longer needs back into
    /// placeholders. Returns how many placeholders were made.
    pub fn increase_laziness(&mut self, cx: &mut TreeCx<'_>, viewport: &dyn Viewport) -> usize {
        collapse::convert_as_much_as_possible(self, cx, viewport)
    }

    /// The most local notifier/property pair displaying `h`.
    ///
    /// Panics when nothing owns the box; every box spliced onto a
    /// property chain has an owner, so that is a corrupt tree.
    pub fn locate_owner(&self, h: BoxHandle) -> PropLocation {
        notifier::locate_owner(self, h)
    }

    /// Lays the tree out at the context width. Cheap when nothing
    /// changed: clean paragraphs and fresh estimates are skipped.
    pub fn relayout(&mut self, cx: &mut TreeCx<'_>) -> Result<(), BreakError> {
        let root = self.root;
        expand::layout_box(self, cx, root)?;
        Ok(())
    }

    /// Total document height, device units.
    pub fn total_height(&self) -> f32 {
        self.data(self.root).height
    }

    /// Whether `h` still names a live box.
    pub fn contains(&self, h: BoxHandle) -> bool {
        self.is_live(h)
    }

    /// Whether `h` is a placeholder.
    pub fn is_lazy(&self, h: BoxHandle) -> bool {
        self.data(h).as_lazy().is_some()
    }

    /// The items of lazy box `h`, if it is one.
    pub fn lazy_items(&self, h: BoxHandle) -> Option<&LazyItems> {
        self.data(h).as_lazy().map(|lazy| &lazy.items)
    }

    /// Property index of the first item of lazy box `h`, if it is one.
    pub fn lazy_index_min(&self, h: BoxHandle) -> Option<usize> {
        self.data(h).as_lazy().map(|lazy| lazy.index_min)
    }

    /// Child boxes of `h`, top to bottom. Empty unless `h` is a pile.
    pub fn children_of(&self, h: BoxHandle) -> &[BoxHandle] {
        self.children(h)
    }

    /// Absolute top of `h`, device units.
    pub fn box_top(&self, h: BoxHandle) -> f32 {
        self.absolute_top(h)
    }

    /// Height of `h`, device units.
    pub fn box_height(&self, h: BoxHandle) -> f32 {
        self.data(h).height
    }

    /// The laid-out lines of paragraph `h`, if it is one.
    pub fn para_lines(&self, h: BoxHandle) -> Option<&[LineInfo]> {
        match &self.data(h).kind {
            BoxKind::Para(p) => Some(&p.lines),
            _ => None,
        }
    }

    /// The text of paragraph `h`, if it is one.
    pub fn para_text(&self, h: BoxHandle) -> Option<&str> {
        match &self.data(h).kind {
            BoxKind::Para(p) => Some(&p.text),
            _ => None,
        }
    }

    fn first_lazy(&self) -> Option<BoxHandle> {
        self.boxes.iter().enumerate().find_map(|(i, slot)| {
            slot.as_ref().and_then(|data| match &data.kind {
                BoxKind::Lazy(_) => Some(BoxHandle(
                    u32::try_from(i).expect("box arena overflow"),
                )),
                _ => None,
            })
        })
    }
}
