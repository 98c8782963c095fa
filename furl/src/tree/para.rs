// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paragraph layout: drives segment construction line by line.

use alloc::vec::Vec;

use crate::analysis::WsSpan;
use crate::context::LayoutContext;
use crate::error::BreakError;
use crate::linebreak::{
    find_break_point, BreakOutcome, BreakPolicy, BreakRequest, Segment, SegmentEnd, WhitespaceMode,
};
use crate::shape::Shaper;
use crate::tree::data::ParaBox;

/// One laid-out line of a paragraph.
#[derive(Clone, Debug, Default)]
pub struct LineInfo {
    /// The line's segments in logical order. Empty for the line after a
    /// trailing hard break.
    pub segments: Vec<Segment>,
    /// Offset from the paragraph top, device units.
    pub top: f32,
    /// Line height, device units.
    pub height: f32,
}

impl LineInfo {
    /// Total advance width of the line.
    pub fn width(&self) -> f32 {
        self.segments.iter().map(|s| s.width).sum()
    }

    /// Byte range of visible content, if the line has any.
    pub fn text_range(&self) -> Option<core::ops::Range<usize>> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some(first.range.start..last.range.end)
    }
}

/// Lays the paragraph out against `max_width` and returns its height.
///
/// A line is grown segment by segment. Whitespace-stripping segments come
/// first; when one reports pending whitespace the driver switches to
/// whitespace-only requests so trailing spaces land in their own hanging
/// segments. [`NoBreak`](BreakOutcome::NoBreak) closes the line and
/// retries the same position at the start of the next one.
pub(crate) fn layout_paragraph(
    para: &mut ParaBox,
    lcx: &mut LayoutContext,
    shaper: &mut dyn Shaper,
    max_width: f32,
) -> Result<f32, BreakError> {
    let analysis = lcx.analyzer.analyze(&para.text, &para.spans);
    para.lines.clear();
    let text = para.text.as_str();
    let len = text.len();
    if len == 0 {
        return Ok(0.0);
    }

    let mut pos = 0;
    let mut top = 0.0_f32;
    let mut para_done = false;
    let mut last_end = None;

    while pos < len {
        let line_start = pos;
        let mut segments: Vec<Segment> = Vec::new();
        let mut used = 0.0_f32;
        let mut mode = WhitespaceMode::NoTrailing;
        let mut first = true;

        loop {
            let request = BreakRequest {
                range: pos..len,
                backtrack_limit: None,
                max_width: (max_width - used).max(0.0),
                policy: BreakPolicy::WordOrClip,
                whitespace: mode,
                first_on_line: first,
            };
            match find_break_point(text, &analysis, shaper, &request)? {
                BreakOutcome::Segment(seg) => {
                    used += seg.width;
                    pos = seg.next_pos();
                    let end = seg.end;
                    last_end = Some(end);
                    segments.push(seg);
                    match end {
                        SegmentEnd::WsBreak => first = false,
                        SegmentEnd::MoreWhitespace => {
                            first = false;
                            mode = WhitespaceMode::OnlyWhitespace;
                        }
                        SegmentEnd::NoMore => {
                            para_done = true;
                            break;
                        }
                        _ => break,
                    }
                }
                BreakOutcome::Empty => {
                    if matches!(mode, WhitespaceMode::NoTrailing) {
                        // Everything that fit was whitespace; collect it
                        // into its own segment instead.
                        mode = WhitespaceMode::OnlyWhitespace;
                        first = false;
                        continue;
                    }
                    break;
                }
                BreakOutcome::NoBreak => break,
            }
        }

        if segments.is_empty() && pos == line_start {
            // A degenerate position that produced nothing; step over one
            // cluster rather than spin.
            debug_assert!(false, "paragraph layout made no progress at {pos}");
            pos = analysis.cluster_boundary_after(pos).unwrap_or(len);
            continue;
        }

        let height = line_height(shaper, &para.spans, line_start, pos.max(line_start));
        para.lines.push(LineInfo {
            segments,
            top,
            height,
        });
        top += height;
        if para_done {
            break;
        }
    }

    // A paragraph ending in a hard break gets one empty line after it.
    if pos >= len && matches!(last_end, Some(SegmentEnd::HardBreak)) {
        let height = line_height(shaper, &para.spans, len, len);
        para.lines.push(LineInfo {
            segments: Vec::new(),
            top,
            height,
        });
    }

    Ok(para
        .lines
        .last()
        .map_or(0.0, |line| line.top + line.height))
}

/// Height of the line covering `start..end`: the tallest writing system
/// metrics among the spans it overlaps, or the span containing `start`
/// when the line is empty.
fn line_height(shaper: &mut dyn Shaper, spans: &[WsSpan], start: usize, end: usize) -> f32 {
    let mut height = 0.0_f32;
    for span in spans {
        if span.range.start < end && span.range.end > start {
            height = height.max(shaper.line_metrics(span.ws).height());
        }
    }
    if height == 0.0 {
        let span = spans
            .iter()
            .find(|s| s.range.contains(&start))
            .or(spans.last());
        if let Some(span) = span {
            height = shaper.line_metrics(span.ws).height();
        }
    }
    height
}
