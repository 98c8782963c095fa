// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Segment construction.
//!
//! A line is built one segment at a time. Each call to [`find_break_point`]
//! consumes characters from the start of the requested range, one
//! writing-system run at a time, and stops at the first of: the range end,
//! a hard break character, a change of writing system or direction, or the
//! width budget running out. The result says how far it got and why it
//! stopped, which is everything the paragraph driver needs to decide
//! whether the line is finished.
//!
//! Segments are cheap values, built fresh per call; nothing here persists
//! between calls except the text analysis the caller passes in.

mod breaker;

pub use breaker::find_break_point;

use alloc::vec::Vec;
use core::ops::Range;

/// How eagerly a segment may be cut when no valid break opportunity fits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BreakPolicy {
    /// Break only at valid line-break opportunities. If none fits, report
    /// [`BreakOutcome::NoBreak`] and let the caller decide.
    WordOnly,
    /// Prefer valid opportunities; when the first segment of a line has
    /// none, cut at the widest fitting cluster boundary instead.
    #[default]
    WordOrClip,
}

/// How a segment treats whitespace.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WhitespaceMode {
    /// Whitespace is ordinary content.
    #[default]
    All,
    /// Trailing whitespace is stripped from the segment; the stripped
    /// characters stay unconsumed and the segment ends
    /// [`MoreWhitespace`](SegmentEnd::MoreWhitespace).
    NoTrailing,
    /// Collect only whitespace, a single run's worth at most. Width is
    /// measured but never limits the segment; trailing whitespace hangs
    /// past the margin.
    OnlyWhitespace,
}

/// Why segment construction stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The whole requested range was consumed.
    NoMore,
    /// Stopped at a change of writing system or direction, or after a
    /// single right-to-left run. The line continues with another segment.
    WsBreak,
    /// Stopped with strippable whitespace pending at the segment end.
    MoreWhitespace,
    /// Stopped at the backtrack limit with text still remaining.
    MoreLines,
    /// Broke at a valid line-break opportunity.
    OkayBreak,
    /// Broke at a cluster boundary that is not a valid opportunity.
    BadBreak,
    /// Stopped just before a hard break character.
    HardBreak,
}

impl SegmentEnd {
    /// Whether the line this segment sits on is complete.
    ///
    /// [`WsBreak`](Self::WsBreak) and
    /// [`MoreWhitespace`](Self::MoreWhitespace) leave the line open for
    /// further segments; everything else closes it.
    pub fn ends_line(self) -> bool {
        !matches!(self, Self::WsBreak | Self::MoreWhitespace)
    }
}

/// Justification class of one cluster in a finished segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StretchClass {
    /// Does not stretch (zero-advance marks and the like).
    None,
    /// Stretches as whitespace.
    Whitespace,
    /// Stretches as letter spacing.
    Letter,
}

/// One laid-out piece of a line.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Byte range of the visible content.
    pub range: Range<usize>,
    /// Bytes consumed beyond `range.end` that produce no content: a hard
    /// break character, or two for a CR LF pair.
    pub skip: usize,
    /// Advance width of the visible content, device units.
    pub width: f32,
    /// Why construction stopped.
    pub end: SegmentEnd,
    /// Per-cluster stretch classes, in source order.
    pub stretch: Vec<StretchClass>,
}

impl Segment {
    /// First position not consumed by this segment.
    pub fn next_pos(&self) -> usize {
        self.range.end + self.skip
    }
}

/// Inputs to one [`find_break_point`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct BreakRequest {
    /// Byte range to consume from; the segment starts at `range.start`.
    pub range: Range<usize>,
    /// Hard cap on how far the segment may extend, used when re-breaking
    /// up to a previously committed point. `None` means `range.end`.
    pub backtrack_limit: Option<usize>,
    /// Width budget in device units.
    pub max_width: f32,
    /// Cut policy when no valid opportunity fits.
    pub policy: BreakPolicy,
    /// Whitespace treatment.
    pub whitespace: WhitespaceMode,
    /// Whether this would be the first segment on its line. Only the first
    /// segment may be clipped; later segments report
    /// [`BreakOutcome::NoBreak`] and move to the next line instead.
    pub first_on_line: bool,
}

impl BreakRequest {
    /// A request with default policies: word-or-clip breaking, whitespace
    /// as ordinary content, first on its line.
    pub fn new(range: Range<usize>, max_width: f32) -> Self {
        Self {
            range,
            backtrack_limit: None,
            max_width,
            policy: BreakPolicy::default(),
            whitespace: WhitespaceMode::default(),
            first_on_line: true,
        }
    }
}

/// Result of one [`find_break_point`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum BreakOutcome {
    /// A segment was produced.
    Segment(Segment),
    /// Nothing to produce at this position: the effective range was empty,
    /// or stripping removed everything. Not an error.
    Empty,
    /// The policy forbids breaking here; nothing fits whole. The caller
    /// typically moves to a fresh line and retries.
    NoBreak,
}

impl BreakOutcome {
    /// The segment, if one was produced.
    pub fn segment(&self) -> Option<&Segment> {
        match self {
            Self::Segment(seg) => Some(seg),
            _ => None,
        }
    }
}
