// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Demand-driven box-tree layout for very large texts.
//!
//! Furl keeps the layout of a long document bounded by materializing only the
//! parts of it that are near the viewport. A displayed object sequence starts
//! life as a single [lazy box](tree) holding object ids and estimated heights;
//! scrolling expands the visible slice into real paragraph boxes, and a
//! contraction pass converts far-offscreen boxes back into lazy placeholders.
//! Paragraph content is measured through a caller-supplied [`Shaper`] and
//! broken into lines one segment at a time by [`find_break_point`].
//!
//! The crate does not render. It produces box geometry (tops and heights) and
//! line segments; drawing, hit testing and selection belong to the embedder.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

mod analysis;
mod context;
mod error;
mod host;
mod shape;

pub mod linebreak;
pub mod tree;

#[cfg(test)]
mod tests;

pub use analysis::{Analyzer, BidiLevel, BreakCursor, ParaAnalysis, RunSpan, WsSpan};
pub use context::LayoutContext;
pub use error::{BreakError, BuildError, BuildErrorKind, ExpandError};
pub use host::{
    FactoryId, FragmentId, ObjectId, PropertyTag, Synchronizer, ViewHost, Viewport, WsId,
};
pub use linebreak::{
    find_break_point, BreakOutcome, BreakPolicy, BreakRequest, Segment, SegmentEnd, StretchClass,
    WhitespaceMode,
};
pub use shape::{RunMetrics, ShapeError, ShapedCluster, ShapedRun, Shaper};
pub use tree::{
    BoxBuilder, BoxHandle, BoxStyle, BoxTree, Expansion, LazyItems, LineInfo, NotifierHandle,
    PropKind, PropLocation, TreeCx,
};
