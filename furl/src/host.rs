// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Traits and identifiers supplied by the embedding application.
//!
//! The tree never touches the backing data model directly. Everything it
//! needs (object contents, height estimates, display callbacks) comes
//! through [`ViewHost`], and everything it wants to know about the screen
//! comes through [`Viewport`].

use crate::error::BuildError;
use crate::tree::BoxBuilder;
use core::ops::Range;

/// Identifier of an object in the backing data model.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

/// Identifier of a property (attribute) of an object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyTag(pub u32);

/// Selects which display variant of an object a host builds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentId(pub u32);

/// Identifier of a display factory registered with the host.
///
/// A view can mix content produced by several factories; each lazy box
/// remembers which one builds its items.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactoryId(pub u32);

/// Identifier of a writing system.
///
/// A writing system selects the shaping path for a span of text. The tree
/// treats it as opaque; the [`Shaper`](crate::Shaper) gives it meaning.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WsId(pub u32);

/// Callbacks into the embedding application's data and display logic.
///
/// Heights returned by [`estimate_height`](Self::estimate_height) and the
/// widths passed to it are in layout units; the tree converts to device
/// units with its own scale factor.
pub trait ViewHost {
    /// Returns a cheap estimated height for displaying `object` with
    /// `fragment` at the given available width.
    ///
    /// Estimates do not have to be accurate. They are replaced by real
    /// heights when the object is expanded. A non-positive estimate is
    /// clamped to a small positive height so expansion always makes
    /// progress.
    fn estimate_height(&mut self, object: ObjectId, fragment: FragmentId, width: f32) -> f32;

    /// Invoked once before a batch of objects is displayed, so the host can
    /// prefetch their data in bulk.
    ///
    /// `objects` are items `range` of property `tag` on `context`. The
    /// default does nothing.
    fn load_data_for(
        &mut self,
        objects: &[ObjectId],
        context: ObjectId,
        tag: PropertyTag,
        fragment: FragmentId,
        range: Range<usize>,
    ) {
        let _ = (objects, context, tag, fragment, range);
    }

    /// Builds the display of one object into the staging environment.
    ///
    /// An object scope for `object` is already open in `env`; the host adds
    /// paragraphs, nested piles, properties and text. Returning an error
    /// abandons the whole build; the live tree is left untouched.
    fn display(
        &mut self,
        env: &mut BoxBuilder,
        factory: FactoryId,
        object: ObjectId,
        fragment: FragmentId,
    ) -> Result<(), BuildError>;

    /// Reads the current item at `index` of property `tag` on `context`
    /// from the backing model.
    ///
    /// Contraction uses this instead of trusting ids cached in boxes, so a
    /// lazy box never resurrects stale data.
    fn object_at(&mut self, context: ObjectId, tag: PropertyTag, index: usize) -> ObjectId;
}

/// What the tree may ask about the screen.
pub trait Viewport {
    /// Whether the vertical band `top..bottom` (absolute device units) is
    /// far enough offscreen that its boxes may be replaced by a lazy
    /// placeholder.
    fn is_ok_to_make_lazy(&self, top: f32, bottom: f32) -> bool;
}

/// Keeps parallel views of the same data model in step.
///
/// When several views display one property, a lazy range must expand or
/// contract in all of them together, otherwise object-level change
/// notifications would fan out to views that have no boxes for the
/// affected items.
pub trait Synchronizer {
    /// Expand items `range` of `tag` on `context` in the other views.
    ///
    /// Called before the originating view splices its own replacement
    /// boxes in.
    fn expand_lazy_items(&mut self, context: ObjectId, tag: PropertyTag, range: Range<usize>);

    /// Contract items `range` of `tag` on `context` in the other views.
    ///
    /// Called before the originating view adjusts its own layout.
    fn contract_lazy_items(&mut self, context: ObjectId, tag: PropertyTag, range: Range<usize>);
}
