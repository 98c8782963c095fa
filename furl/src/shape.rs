// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The measurement boundary between the tree and a real text stack.
//!
//! Line breaking needs advance widths and cluster structure but has no
//! opinion about fonts or glyphs. Embedders supply a [`Shaper`]; the tests
//! use a fixed-advance implementation.

use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use crate::analysis::{is_soft_whitespace, ParaAnalysis};
use crate::host::WsId;

/// Why a run could not be shaped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ShapeError {
    /// Glyphs were produced but could not be placed. The breaker recovers
    /// from this by estimating advances; it is not propagated.
    PlacementFailed,
    /// No shaping path exists for the writing system. Fatal for the
    /// segment being built.
    UnknownWritingSystem(WsId),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlacementFailed => write!(f, "glyph placement failed"),
            Self::UnknownWritingSystem(ws) => {
                write!(f, "no shaping path for writing system {}", ws.0)
            }
        }
    }
}

impl core::error::Error for ShapeError {}

/// One shaped cluster: the smallest unit a forced break may fall between.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapedCluster {
    /// Source byte range the cluster maps to.
    pub range: Range<usize>,
    /// Total advance of the cluster's glyphs, device units.
    pub advance: f32,
    /// Whether the cluster is whitespace for trailing-strip purposes.
    pub whitespace: bool,
}

/// The shaped form of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapedRun {
    /// Clusters in source order, covering the run range exactly.
    pub clusters: Vec<ShapedCluster>,
}

impl ShapedRun {
    /// Sum of all cluster advances.
    pub fn advance(&self) -> f32 {
        self.clusters.iter().map(|c| c.advance).sum()
    }
}

/// Vertical metrics for text in one writing system.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RunMetrics {
    /// Distance from baseline to line top, device units.
    pub ascent: f32,
    /// Distance from baseline to line bottom, device units.
    pub descent: f32,
}

impl RunMetrics {
    /// Line height contribution of this writing system.
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Shapes and measures runs of text.
///
/// Implementations are stateful (font caches and the like) and are handed
/// to the tree by mutable reference per operation, never stored.
pub trait Shaper {
    /// Shapes `text[range]`, which is a single writing-system, single
    /// direction run.
    fn shape_run(
        &mut self,
        text: &str,
        range: Range<usize>,
        ws: WsId,
        rtl: bool,
    ) -> Result<ShapedRun, ShapeError>;

    /// Average advance to assume per character when placement fails.
    fn fallback_advance(&self, ws: WsId) -> f32;

    /// Vertical metrics for a line of the writing system.
    fn line_metrics(&self, ws: WsId) -> RunMetrics;
}

/// Builds estimated clusters for a run whose placement failed.
///
/// Each grapheme cluster becomes one cluster with a uniform advance per
/// character, whitespace flagged from character properties. Keeps segment
/// construction going when a shaping engine falls over on one run.
pub(crate) fn estimated_clusters(
    text: &str,
    range: Range<usize>,
    analysis: &ParaAnalysis,
    advance_per_char: f32,
) -> ShapedRun {
    let mut clusters = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = analysis
            .cluster_boundary_after(start)
            .unwrap_or(range.end)
            .min(range.end);
        let slice = &text[start..end];
        let chars = slice.chars().count();
        clusters.push(ShapedCluster {
            range: start..end,
            advance: advance_per_char * chars as f32,
            whitespace: slice.chars().all(is_soft_whitespace) && !slice.is_empty(),
        });
        start = end;
    }
    ShapedRun { clusters }
}
