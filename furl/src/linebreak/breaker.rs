// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The segment construction state machine.

use alloc::vec::Vec;
use core::ops::Range;

use smallvec::SmallVec;

use crate::analysis::{is_soft_whitespace, BidiLevel, ParaAnalysis, RunSpan};
use crate::error::BreakError;
use crate::host::WsId;
use crate::linebreak::{
    BreakOutcome, BreakPolicy, BreakRequest, Segment, SegmentEnd, StretchClass, WhitespaceMode,
};
use crate::shape::{estimated_clusters, ShapeError, ShapedCluster, ShapedRun, Shaper};

/// A run (or run prefix) accepted into the segment so far.
#[derive(Debug)]
struct Committed {
    clusters: Vec<ShapedCluster>,
    /// Byte position just past the last kept cluster.
    end: usize,
}

/// Why the consumption loop stopped.
#[derive(Copy, Clone, Debug)]
enum Stop {
    /// Consumed the whole requested range.
    Exhausted,
    /// Consumed up to the backtrack limit.
    Limit,
    /// Reached a hard break character consuming `skip` bytes.
    Hard { skip: usize },
    /// The next run has a different writing system or direction, or a
    /// right-to-left run closed the segment.
    NextRun,
    /// Broke at a valid line-break opportunity.
    ValidBreak,
    /// Cut at a cluster boundary with no valid opportunity available.
    Clip,
}

/// Builds one segment starting at `request.range.start`.
///
/// Runs are consumed whole while they fit the width budget. On overflow
/// the breaker finds the widest fitting cluster prefix, then the latest
/// valid break opportunity at or before it, backtracking through already
/// committed runs if the opportunity lies behind the current run. Break
/// opportunities come from a monotonic cursor, so total work stays linear
/// in the text length regardless of backtracking.
///
/// Shaping placement failures degrade to estimated advances and do not
/// fail the call; only a writing system with no shaping path at all is an
/// error.
pub fn find_break_point(
    text: &str,
    analysis: &ParaAnalysis,
    shaper: &mut dyn Shaper,
    request: &BreakRequest,
) -> Result<BreakOutcome, BreakError> {
    let start = request.range.start;
    let range_end = request.range.end.min(text.len());
    let limit = request
        .backtrack_limit
        .map_or(range_end, |l| l.min(range_end));
    if limit <= start {
        // Forced-empty segment: a valid terminal outcome, not an error.
        return Ok(BreakOutcome::Empty);
    }

    if matches!(request.whitespace, WhitespaceMode::OnlyWhitespace) {
        return whitespace_only(text, analysis, shaper, request, limit);
    }

    let mut committed: SmallVec<[Committed; 2]> = SmallVec::new();
    let mut width = 0.0_f32;
    let mut cursor = analysis.break_cursor();
    let mut seg_run: Option<(WsId, BidiLevel)> = None;
    let mut pos = start;
    let mut stop = None;

    'runs: for run in analysis.runs() {
        if run.range.end <= pos {
            continue;
        }
        if pos >= limit {
            break;
        }
        let run_start = pos;
        let mut run_end = run.range.end.min(limit);

        match seg_run {
            None => seg_run = Some((run.ws, run.level)),
            Some((ws, level)) if ws != run.ws || level != run.level => {
                stop = Some(Stop::NextRun);
                break 'runs;
            }
            Some(_) => {}
        }

        // A hard break caps how far this run can reach.
        let mut hard = None;
        if let Some((hpos, hskip)) = analysis.next_hard_in(run_start..run_end) {
            run_end = hpos;
            hard = Some(hskip);
        }

        if run_end > run_start {
            let shaped = shape_or_estimate(text, analysis, shaper, run_start..run_end, run)?;
            let run_width = shaped.advance();
            cursor.advance_through(run_end);

            if width + run_width <= request.max_width {
                committed.push(Committed {
                    clusters: shaped.clusters,
                    end: run_end,
                });
                width += run_width;
                pos = run_end;
            } else {
                // Overflow: widest fitting cluster prefix of this run.
                let budget = request.max_width - width;
                let mut acc = 0.0_f32;
                let mut prefix_end = run_start;
                for cluster in &shaped.clusters {
                    if acc + cluster.advance > budget {
                        break;
                    }
                    acc += cluster.advance;
                    prefix_end = cluster.range.end;
                }

                committed.push(Committed {
                    clusters: shaped.clusters,
                    end: run_end,
                });
                width += run_width;

                match cursor.latest_at_or_before(prefix_end).filter(|&b| b > start) {
                    Some(b) => {
                        // The latest valid opportunity may sit behind runs
                        // committed earlier; truncation walks back through
                        // them.
                        width -= truncate_committed(&mut committed, b);
                        if committed.is_empty() {
                            return Ok(BreakOutcome::Empty);
                        }
                        stop = Some(Stop::ValidBreak);
                    }
                    None => {
                        if !request.first_on_line {
                            // Let the caller retry on a fresh line.
                            return Ok(BreakOutcome::NoBreak);
                        }
                        match request.policy {
                            BreakPolicy::WordOnly => return Ok(BreakOutcome::NoBreak),
                            BreakPolicy::WordOrClip => {
                                let first_cluster_end = committed
                                    .first()
                                    .and_then(|c| c.clusters.first())
                                    .map_or(limit, |c| c.range.end);
                                let cut = analysis
                                    .safe_break_floor(text, prefix_end, start)
                                    // Always keep at least one whole cluster.
                                    .max(first_cluster_end)
                                    .min(limit);
                                width -= truncate_committed(&mut committed, cut);
                                stop = Some(Stop::Clip);
                            }
                        }
                    }
                }
                break 'runs;
            }
        }

        if let Some(skip) = hard {
            stop = Some(Stop::Hard { skip });
            break 'runs;
        }
        if pos >= limit {
            break;
        }
        if run.is_rtl() {
            // Right-to-left segments are single-run; the paragraph driver
            // reorders whole segments rather than glyphs within one.
            stop = Some(Stop::NextRun);
            break 'runs;
        }
    }

    let stop = stop.unwrap_or(if limit < request.range.end {
        Stop::Limit
    } else {
        Stop::Exhausted
    });

    Ok(finalize(request, committed, width, stop))
}

/// Shapes a run piece, degrading placement failures to estimated advances.
fn shape_or_estimate(
    text: &str,
    analysis: &ParaAnalysis,
    shaper: &mut dyn Shaper,
    range: Range<usize>,
    run: &RunSpan,
) -> Result<ShapedRun, BreakError> {
    match shaper.shape_run(text, range.clone(), run.ws, run.is_rtl()) {
        Ok(shaped) => Ok(shaped),
        Err(ShapeError::PlacementFailed) => {
            log::warn!(
                "glyph placement failed for writing system {} at {}..{}; estimating advances",
                run.ws.0,
                range.start,
                range.end,
            );
            let advance = shaper.fallback_advance(run.ws);
            Ok(estimated_clusters(text, range, analysis, advance))
        }
        Err(ShapeError::UnknownWritingSystem(ws)) => Err(BreakError::unknown_writing_system(ws)),
    }
}

/// Drops every cluster ending past `cut`, cascading through whole runs.
/// Returns the advance width removed.
fn truncate_committed(committed: &mut SmallVec<[Committed; 2]>, cut: usize) -> f32 {
    let mut removed = 0.0_f32;
    while let Some(run) = committed.last_mut() {
        while let Some(cluster) = run.clusters.last() {
            if cluster.range.end <= cut {
                break;
            }
            removed += cluster.advance;
            run.end = cluster.range.start;
            run.clusters.pop();
        }
        if run.clusters.is_empty() {
            committed.pop();
        } else {
            break;
        }
    }
    removed
}

/// Applies whitespace policy and packages the result.
fn finalize(
    request: &BreakRequest,
    mut committed: SmallVec<[Committed; 2]>,
    mut width: f32,
    stop: Stop,
) -> BreakOutcome {
    let start = request.range.start;
    let mut reason = match stop {
        Stop::Exhausted => SegmentEnd::NoMore,
        Stop::Limit => SegmentEnd::MoreLines,
        Stop::Hard { .. } => SegmentEnd::HardBreak,
        Stop::NextRun => SegmentEnd::WsBreak,
        Stop::ValidBreak => SegmentEnd::OkayBreak,
        Stop::Clip => SegmentEnd::BadBreak,
    };
    let mut skip = match stop {
        Stop::Hard { skip } => skip,
        _ => 0,
    };

    if matches!(request.whitespace, WhitespaceMode::NoTrailing) {
        let mut stripped = false;
        'strip: while let Some(run) = committed.last_mut() {
            while let Some(cluster) = run.clusters.last() {
                if !cluster.whitespace {
                    break 'strip;
                }
                width -= cluster.advance;
                run.end = cluster.range.start;
                run.clusters.pop();
                stripped = true;
            }
            committed.pop();
        }
        if stripped {
            if committed.is_empty() {
                // Everything was whitespace; the caller collects it with a
                // whitespace-only request instead.
                return BreakOutcome::Empty;
            }
            // The stripped characters stay unconsumed, including any hard
            // break beyond them.
            reason = SegmentEnd::MoreWhitespace;
            skip = 0;
        }
    }

    let end_pos = committed.last().map_or(start, |run| run.end);
    let stretch = committed
        .iter()
        .flat_map(|run| run.clusters.iter())
        .map(|cluster| {
            if cluster.whitespace {
                StretchClass::Whitespace
            } else if cluster.advance == 0.0 {
                StretchClass::None
            } else {
                StretchClass::Letter
            }
        })
        .collect();

    BreakOutcome::Segment(Segment {
        range: start..end_pos,
        skip,
        width,
        end: reason,
        stretch,
    })
}

/// Collects a single run's worth of whitespace.
///
/// Width is measured but never limits the segment: trailing whitespace
/// hangs past the margin rather than wrapping on its own.
fn whitespace_only(
    text: &str,
    analysis: &ParaAnalysis,
    shaper: &mut dyn Shaper,
    request: &BreakRequest,
    limit: usize,
) -> Result<BreakOutcome, BreakError> {
    let start = request.range.start;
    let Some(run) = analysis.runs().iter().find(|r| r.range.end > start) else {
        return Ok(BreakOutcome::Empty);
    };
    let run_cap = run.range.end.min(limit);

    let hard = analysis.next_hard_in(start..run_cap);
    if let Some((hpos, hskip)) = hard {
        if hpos == start {
            // A hard break with no whitespace before it still terminates
            // the line here.
            return Ok(BreakOutcome::Segment(Segment {
                range: start..start,
                skip: hskip,
                width: 0.0,
                end: SegmentEnd::HardBreak,
                stretch: Vec::new(),
            }));
        }
    }
    let scan_end = hard.map_or(run_cap, |(hpos, _)| hpos);

    let mut ws_end = start;
    let mut blocked = false;
    for (i, c) in text[start..scan_end].char_indices() {
        if !is_soft_whitespace(c) {
            blocked = true;
            break;
        }
        ws_end = start + i + c.len_utf8();
    }
    if ws_end == start {
        return Ok(BreakOutcome::Empty);
    }

    let shaped = shape_or_estimate(text, analysis, shaper, start..ws_end, run)?;
    let width = shaped.advance();
    let stretch = shaped
        .clusters
        .iter()
        .map(|_| StretchClass::Whitespace)
        .collect();

    let (end, skip) = if blocked {
        // Ordinary content follows; the line must break before it.
        (SegmentEnd::OkayBreak, 0)
    } else if let Some((hpos, hskip)) = hard {
        debug_assert!(hpos == ws_end, "whitespace scan stopped short of hard break");
        (SegmentEnd::HardBreak, hskip)
    } else if ws_end == limit {
        if limit < request.range.end {
            (SegmentEnd::MoreLines, 0)
        } else {
            (SegmentEnd::NoMore, 0)
        }
    } else {
        // The run ended with whitespace continuing beyond it; stay within
        // a single run and let the caller ask again.
        (SegmentEnd::MoreWhitespace, 0)
    };

    Ok(BreakOutcome::Segment(Segment {
        range: start..ws_end,
        skip,
        width,
        end,
        stretch,
    }))
}
