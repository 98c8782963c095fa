// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-paragraph character analysis.
//!
//! One [`ParaAnalysis`] is computed per paragraph before any segment is
//! built. It bundles everything the breaker asks about characters: valid
//! line-break opportunities, grapheme cluster boundaries, hard break
//! positions, bidi embedding levels and the writing-system runs derived
//! from them. The shaping-sensitive parts (advance widths, whitespace
//! flags) are deliberately not here; those come from the [`Shaper`].
//!
//! [`Shaper`]: crate::Shaper

use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;

use icu_normalizer::{ComposingNormalizer, ComposingNormalizerBorrowed};
use icu_properties::props::BidiClass;
use icu_properties::{CodePointMapData, CodePointMapDataBorrowed};
use icu_segmenter::options::LineBreakOptions;
use icu_segmenter::{
    GraphemeClusterSegmenter, GraphemeClusterSegmenterBorrowed, LineSegmenter,
    LineSegmenterBorrowed,
};

use crate::host::WsId;

/// Bidi embedding level. Odd levels run right to left.
pub type BidiLevel = u8;

/// A span of paragraph text rendered in a single writing system.
///
/// Spans are byte ranges, must be sorted and contiguous, and must cover
/// the paragraph text exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsSpan {
    /// Byte range of the span.
    pub range: Range<usize>,
    /// Writing system of the span.
    pub ws: WsId,
}

/// A maximal range sharing one writing system and one bidi level.
///
/// Segments are built run by run; a segment never spans two runs with
/// different writing systems or levels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSpan {
    /// Byte range of the run.
    pub range: Range<usize>,
    /// Writing system of the run.
    pub ws: WsId,
    /// Bidi embedding level of the run.
    pub level: BidiLevel,
}

impl RunSpan {
    /// Whether the run lays out right to left.
    pub fn is_rtl(&self) -> bool {
        self.level & 1 != 0
    }
}

/// Whether `c` unconditionally terminates a segment at its own position.
pub(crate) fn is_hard_break(c: char) -> bool {
    matches!(c, '\n' | '\t' | '\r' | '\u{000C}' | '\u{2028}' | '\u{FFFC}')
}

/// Whitespace that may be stripped from a segment tail or collected into a
/// whitespace-only segment. Hard break characters are not whitespace here;
/// they end segments instead. The no-break spaces are glue and stay with
/// the text around them.
pub(crate) fn is_soft_whitespace(c: char) -> bool {
    c.is_whitespace() && !is_hard_break(c) && !matches!(c, '\u{00A0}' | '\u{2007}' | '\u{202F}')
}

/// Character analysis results for one paragraph.
#[derive(Clone, Debug)]
pub struct ParaAnalysis {
    len: usize,
    runs: Vec<RunSpan>,
    /// Valid line-break positions, ascending, exclusive of 0 and `len`.
    breaks: Vec<usize>,
    /// Grapheme cluster boundaries, ascending, inclusive of 0 and `len`.
    graphemes: Vec<usize>,
    /// Hard break positions with the byte count consumed by each (2 for a
    /// CR immediately followed by LF, otherwise the character length).
    hard: Vec<(usize, usize)>,
    base_level: BidiLevel,
    nfc: ComposingNormalizerBorrowed<'static>,
}

impl ParaAnalysis {
    /// Byte length of the analyzed text.
    pub fn text_len(&self) -> usize {
        self.len
    }

    /// The writing-system by bidi-level runs covering the text, in order.
    pub fn runs(&self) -> &[RunSpan] {
        &self.runs
    }

    /// Paragraph base bidi level.
    pub fn base_level(&self) -> BidiLevel {
        self.base_level
    }

    /// A fresh monotonic cursor over the valid line-break positions.
    pub fn break_cursor(&self) -> BreakCursor<'_> {
        BreakCursor {
            breaks: &self.breaks,
            next: 0,
        }
    }

    /// If a hard break character starts at `pos`, the byte count it (and a
    /// directly following LF, for CR) consumes.
    pub fn hard_break_at(&self, pos: usize) -> Option<usize> {
        self.hard
            .binary_search_by_key(&pos, |&(p, _)| p)
            .ok()
            .map(|i| self.hard[i].1)
    }

    /// First hard break position in `range`, with its consumed byte count.
    pub(crate) fn next_hard_in(&self, range: Range<usize>) -> Option<(usize, usize)> {
        let i = self.hard.partition_point(|&(p, _)| p < range.start);
        self.hard.get(i).copied().filter(|&(p, _)| p < range.end)
    }

    /// Whether `pos` lies on a grapheme cluster boundary.
    pub fn is_cluster_boundary(&self, pos: usize) -> bool {
        self.graphemes.binary_search(&pos).is_ok()
    }

    /// Greatest grapheme cluster boundary at or before `pos`.
    pub fn floor_to_cluster(&self, pos: usize) -> usize {
        match self.graphemes.binary_search(&pos) {
            Ok(_) => pos,
            Err(0) => 0,
            Err(i) => self.graphemes[i - 1],
        }
    }

    /// Greatest grapheme cluster boundary strictly before `pos`.
    pub(crate) fn cluster_boundary_before(&self, pos: usize) -> Option<usize> {
        let i = self.graphemes.partition_point(|&b| b < pos);
        i.checked_sub(1).map(|i| self.graphemes[i])
    }

    /// Smallest grapheme cluster boundary strictly after `pos`.
    pub(crate) fn cluster_boundary_after(&self, pos: usize) -> Option<usize> {
        let i = self.graphemes.partition_point(|&b| b <= pos);
        self.graphemes.get(i).copied()
    }

    /// Whether ending a segment at `pos` would split a composition: the
    /// characters on either side compose to fewer characters under NFC.
    ///
    /// Grapheme boundaries already keep combining sequences together, so
    /// this only moves a candidate in pathological normalization cases,
    /// but it is cheap and only runs at forced breaks.
    pub(crate) fn composes_across(&self, text: &str, pos: usize) -> bool {
        let Some(prev) = text[..pos].chars().next_back() else {
            return false;
        };
        let Some(next) = text[pos..].chars().next() else {
            return false;
        };
        let mut window = String::new();
        window.push(prev);
        window.push(next);
        self.nfc.normalize(&window).chars().count() < 2
    }

    /// Greatest position at or before `pos` that is safe to force a break
    /// at: a grapheme boundary that does not split an NFC composition.
    /// Never retreats past `min`.
    pub(crate) fn safe_break_floor(&self, text: &str, pos: usize, min: usize) -> usize {
        let mut b = self.floor_to_cluster(pos);
        while b > min && self.composes_across(text, b) {
            match self.cluster_boundary_before(b) {
                Some(prev) if prev > min => b = prev,
                _ => return min,
            }
        }
        b.max(min)
    }
}

/// Monotonic cursor over a paragraph's valid line-break positions.
///
/// The cursor only ever moves forward over the underlying break sequence;
/// total work across a whole segment is linear in the text length no
/// matter how many times the breaker backtracks.
#[derive(Debug)]
pub struct BreakCursor<'a> {
    breaks: &'a [usize],
    next: usize,
}

impl BreakCursor<'_> {
    /// Consumes every break position at or before `offset`.
    pub fn advance_through(&mut self, offset: usize) {
        while self.next < self.breaks.len() && self.breaks[self.next] <= offset {
            self.next += 1;
        }
    }

    /// Latest already-consumed break position at or before `offset`.
    pub fn latest_at_or_before(&self, offset: usize) -> Option<usize> {
        let seen = &self.breaks[..self.next];
        let i = seen.partition_point(|&b| b <= offset);
        i.checked_sub(1).map(|i| seen[i])
    }

    /// Next break position strictly after `offset`, without consuming it.
    pub fn next_after(&mut self, offset: usize) -> Option<usize> {
        self.advance_through(offset);
        self.breaks.get(self.next).copied()
    }
}

/// Shared handles to the Unicode data a paragraph analysis needs.
///
/// Construction resolves segmenter models, so one `Analyzer` should be
/// reused across paragraphs; [`LayoutContext`](crate::LayoutContext) holds
/// one for the lifetime of the view.
#[derive(Clone, Debug)]
pub struct Analyzer {
    line: LineSegmenterBorrowed<'static>,
    grapheme: GraphemeClusterSegmenterBorrowed<'static>,
    nfc: ComposingNormalizerBorrowed<'static>,
    bidi: CodePointMapDataBorrowed<'static, BidiClass>,
}

impl Analyzer {
    /// Creates an analyzer backed by compiled Unicode data.
    pub fn new() -> Self {
        Self {
            line: LineSegmenter::new_auto(LineBreakOptions::default()),
            grapheme: GraphemeClusterSegmenter::new(),
            nfc: ComposingNormalizer::new_nfc(),
            bidi: CodePointMapData::<BidiClass>::new(),
        }
    }

    /// Analyzes one paragraph of text.
    ///
    /// `spans` assigns a writing system to every byte of `text`; they must
    /// be sorted, contiguous and cover the text exactly.
    pub fn analyze(&self, text: &str, spans: &[WsSpan]) -> ParaAnalysis {
        debug_assert!(
            spans_cover(spans, text.len()),
            "writing system spans must tile the paragraph text"
        );

        let mut breaks = Vec::new();
        for pos in self.line.segment_str(text) {
            if pos > 0 && pos < text.len() {
                breaks.push(pos);
            }
        }

        let graphemes: Vec<usize> = self.grapheme.segment_str(text).collect();

        let mut hard = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if is_hard_break(c) {
                let mut skip = c.len_utf8();
                if c == '\r' {
                    if let Some((_, '\n')) = chars.peek() {
                        skip += 1;
                    }
                }
                hard.push((i, skip));
            }
        }

        let (levels, base_level) = self.resolve_levels(text);

        let mut runs = Vec::new();
        for span in spans {
            let mut start = span.range.start;
            for (i, _) in text[span.range.clone()].char_indices() {
                let pos = span.range.start + i;
                if pos > start && levels[pos] != levels[start] {
                    runs.push(RunSpan {
                        range: start..pos,
                        ws: span.ws,
                        level: levels[start],
                    });
                    start = pos;
                }
            }
            if start < span.range.end {
                runs.push(RunSpan {
                    range: start..span.range.end,
                    ws: span.ws,
                    level: levels[start],
                });
            }
        }

        ParaAnalysis {
            len: text.len(),
            runs,
            breaks,
            graphemes,
            hard,
            base_level,
            nfc: self.nfc,
        }
    }

    /// Per-byte embedding levels plus the paragraph base level.
    fn resolve_levels(&self, text: &str) -> (Vec<BidiLevel>, BidiLevel) {
        if text.is_ascii() {
            // ASCII text cannot change direction.
            return (alloc::vec![0; text.len()], 0);
        }
        let info = unicode_bidi::BidiInfo::new_with_data_source(&self.bidi, text, None);
        let base = info.paragraphs.first().map_or(0, |p| p.level.number());
        let levels = info.levels.iter().map(|l| l.number()).collect();
        (levels, base)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn spans_cover(spans: &[WsSpan], len: usize) -> bool {
    let mut at = 0;
    for span in spans {
        if span.range.start != at || span.range.end < span.range.start {
            return false;
        }
        at = span.range.end;
    }
    at == len
}
