// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scripted hosts, a fixed-metrics shaper and shared event recording.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::rc::Rc;

use icu_segmenter::{GraphemeClusterSegmenter, GraphemeClusterSegmenterBorrowed};

use crate::analysis::is_soft_whitespace;
use crate::{
    BoxBuilder, BoxHandle, BoxStyle, BoxTree, BuildError, FactoryId, FragmentId, LayoutContext,
    ObjectId, ParaAnalysis, PropKind, PropertyTag, RunMetrics, ShapeError, ShapedCluster,
    ShapedRun, Shaper, Synchronizer, TreeCx, ViewHost, Viewport, WsId, WsSpan,
};

pub(crate) const FACTORY: FactoryId = FactoryId(1);
pub(crate) const FRAG: FragmentId = FragmentId(0);
pub(crate) const CONTEXT: ObjectId = ObjectId(900);
pub(crate) const ITEMS_TAG: PropertyTag = PropertyTag(10);
pub(crate) const SUB_TAG: PropertyTag = PropertyTag(11);
/// Property a scripted section opens but never fills.
pub(crate) const EMPTY_TAG: PropertyTag = PropertyTag(12);

/// Writing system of ordinary test text.
pub(crate) const WS: WsId = WsId(1);
/// Writing system with doubled line metrics.
pub(crate) const TALL_WS: WsId = WsId(2);
/// Writing system whose placement fails; the breaker falls back to
/// estimated advances.
pub(crate) const BROKEN_WS: WsId = WsId(77);
/// Writing system with no shaping path at all.
pub(crate) const UNKNOWN_WS: WsId = WsId(99);

/// Advance of one character under [`FixedShaper`], device units.
pub(crate) const ADVANCE: f32 = 10.0;

pub(crate) fn id(n: u64) -> ObjectId {
    ObjectId(n)
}

pub(crate) fn assert_near(got: f32, want: f32) {
    assert!((got - want).abs() < 1e-4, "expected {want}, got {got}");
}

/// Analyzes `text` as a single span of writing system `ws`.
pub(crate) fn analyze(lcx: &LayoutContext, text: &str, ws: WsId) -> ParaAnalysis {
    let spans = [WsSpan {
        range: 0..text.len(),
        ws,
    }];
    lcx.analyzer().analyze(text, &spans)
}

/// One host or synchronizer callback, in observed order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
    SyncExpand(ObjectId, PropertyTag, Range<usize>),
    SyncContract(ObjectId, PropertyTag, Range<usize>),
    Load(Vec<ObjectId>, Range<usize>),
    Display(ObjectId),
    Estimate(ObjectId),
    ObjectAt(ObjectId, PropertyTag, usize),
}

pub(crate) type EventLog = Rc<RefCell<Vec<Event>>>;

/// Shaper with a fixed advance per character.
///
/// Clusters are emitted per grapheme, so multi-char graphemes keep their
/// characters together the way a real shaper would.
pub(crate) struct FixedShaper {
    graphemes: GraphemeClusterSegmenterBorrowed<'static>,
    tall: Option<WsId>,
}

impl FixedShaper {
    pub(crate) fn new() -> Self {
        Self {
            graphemes: GraphemeClusterSegmenter::new(),
            tall: None,
        }
    }

    /// Doubles the line metrics reported for `ws`.
    pub(crate) fn with_tall(ws: WsId) -> Self {
        Self {
            tall: Some(ws),
            ..Self::new()
        }
    }
}

impl Shaper for FixedShaper {
    fn shape_run(
        &mut self,
        text: &str,
        range: Range<usize>,
        ws: WsId,
        _rtl: bool,
    ) -> Result<ShapedRun, ShapeError> {
        if ws == UNKNOWN_WS {
            return Err(ShapeError::UnknownWritingSystem(ws));
        }
        if ws == BROKEN_WS {
            return Err(ShapeError::PlacementFailed);
        }
        let slice = &text[range.clone()];
        let bounds: Vec<usize> = self.graphemes.segment_str(slice).collect();
        let mut clusters = Vec::new();
        for pair in bounds.windows(2) {
            let start = range.start + pair[0];
            let end = range.start + pair[1];
            let piece = &text[start..end];
            let chars = piece.chars().count();
            clusters.push(ShapedCluster {
                range: start..end,
                advance: ADVANCE * chars as f32,
                whitespace: piece.chars().all(is_soft_whitespace),
            });
        }
        Ok(ShapedRun { clusters })
    }

    fn fallback_advance(&self, _ws: WsId) -> f32 {
        ADVANCE
    }

    fn line_metrics(&self, ws: WsId) -> RunMetrics {
        if self.tall == Some(ws) {
            RunMetrics {
                ascent: 16.0,
                descent: 4.0,
            }
        } else {
            RunMetrics {
                ascent: 8.0,
                descent: 2.0,
            }
        }
    }
}

/// Scripted flat data model: one property whose items each display as a
/// single paragraph.
pub(crate) struct TestHost {
    log: EventLog,
    /// Items of the displayed property, in model order.
    pub(crate) items: Vec<ObjectId>,
    /// Paragraph text per object.
    pub(crate) texts: HashMap<ObjectId, String>,
    /// Estimated height handed back per object, layout units.
    pub(crate) estimate: f32,
    pub(crate) estimates: HashMap<ObjectId, f32>,
    /// Objects whose display fails.
    pub(crate) poisoned: HashSet<ObjectId>,
    /// Paragraph style per object, where the default will not do.
    pub(crate) styles: HashMap<ObjectId, BoxStyle>,
}

impl TestHost {
    pub(crate) fn new(log: &EventLog) -> Self {
        Self {
            log: Rc::clone(log),
            items: Vec::new(),
            texts: HashMap::new(),
            estimate: ADVANCE,
            estimates: HashMap::new(),
            poisoned: HashSet::new(),
            styles: HashMap::new(),
        }
    }
}

impl ViewHost for TestHost {
    fn estimate_height(&mut self, object: ObjectId, _fragment: FragmentId, _width: f32) -> f32 {
        self.log.borrow_mut().push(Event::Estimate(object));
        self.estimates.get(&object).copied().unwrap_or(self.estimate)
    }

    fn load_data_for(
        &mut self,
        objects: &[ObjectId],
        _context: ObjectId,
        _tag: PropertyTag,
        _fragment: FragmentId,
        range: Range<usize>,
    ) {
        self.log.borrow_mut().push(Event::Load(objects.to_vec(), range));
    }

    fn display(
        &mut self,
        env: &mut BoxBuilder,
        _factory: FactoryId,
        object: ObjectId,
        _fragment: FragmentId,
    ) -> Result<(), BuildError> {
        if self.poisoned.contains(&object) {
            return Err(BuildError::host("scripted failure"));
        }
        self.log.borrow_mut().push(Event::Display(object));
        let text = self.texts.get(&object).cloned().unwrap_or_default();
        let style = self
            .styles
            .get(&object)
            .copied()
            .unwrap_or_else(|| env.default_style());
        env.open_paragraph(style)?;
        env.add_text(WS, &text)?;
        env.close_paragraph()?;
        Ok(())
    }

    fn object_at(&mut self, context: ObjectId, tag: PropertyTag, index: usize) -> ObjectId {
        self.log.borrow_mut().push(Event::ObjectAt(context, tag, index));
        self.items[index]
    }
}

/// Host whose top-level items are sections, each displaying a nested
/// placeholder for its own sequence of paragraph sub-items.
pub(crate) struct NestedHost {
    log: EventLog,
    pub(crate) sections: Vec<ObjectId>,
    pub(crate) subs: HashMap<ObjectId, Vec<ObjectId>>,
    pub(crate) texts: HashMap<ObjectId, String>,
    /// Sections open [`EMPTY_TAG`] before their items and leave it empty.
    pub(crate) empty_prop: bool,
}

impl NestedHost {
    pub(crate) fn new(log: &EventLog) -> Self {
        Self {
            log: Rc::clone(log),
            sections: Vec::new(),
            subs: HashMap::new(),
            texts: HashMap::new(),
            empty_prop: false,
        }
    }
}

impl ViewHost for NestedHost {
    fn estimate_height(&mut self, object: ObjectId, _fragment: FragmentId, _width: f32) -> f32 {
        self.log.borrow_mut().push(Event::Estimate(object));
        match self.subs.get(&object) {
            Some(subs) => ADVANCE * subs.len() as f32,
            None => ADVANCE,
        }
    }

    fn load_data_for(
        &mut self,
        objects: &[ObjectId],
        _context: ObjectId,
        _tag: PropertyTag,
        _fragment: FragmentId,
        range: Range<usize>,
    ) {
        self.log.borrow_mut().push(Event::Load(objects.to_vec(), range));
    }

    fn display(
        &mut self,
        env: &mut BoxBuilder,
        _factory: FactoryId,
        object: ObjectId,
        _fragment: FragmentId,
    ) -> Result<(), BuildError> {
        self.log.borrow_mut().push(Event::Display(object));
        if let Some(subs) = self.subs.get(&object).cloned() {
            if self.empty_prop {
                env.open_prop(EMPTY_TAG, PropKind::ObjectSequence)?;
                env.close_prop()?;
            }
            env.open_prop(SUB_TAG, PropKind::ObjectSequence)?;
            env.add_lazy_items(FACTORY, FRAG, object, subs)?;
            env.close_prop()?;
        } else {
            let text = self.texts.get(&object).cloned().unwrap_or_default();
            env.open_paragraph(env.default_style())?;
            env.add_text(WS, &text)?;
            env.close_paragraph()?;
        }
        Ok(())
    }

    fn object_at(&mut self, context: ObjectId, tag: PropertyTag, index: usize) -> ObjectId {
        self.log.borrow_mut().push(Event::ObjectAt(context, tag, index));
        if tag == ITEMS_TAG {
            self.sections[index]
        } else {
            self.subs[&context][index]
        }
    }
}

/// Synchronizer that records the ranges it is told about.
pub(crate) struct RecordingSync {
    pub(crate) log: EventLog,
}

impl Synchronizer for RecordingSync {
    fn expand_lazy_items(&mut self, context: ObjectId, tag: PropertyTag, range: Range<usize>) {
        self.log
            .borrow_mut()
            .push(Event::SyncExpand(context, tag, range));
    }

    fn contract_lazy_items(&mut self, context: ObjectId, tag: PropertyTag, range: Range<usize>) {
        self.log
            .borrow_mut()
            .push(Event::SyncContract(context, tag, range));
    }
}

/// Viewport that lets everything become lazy.
pub(crate) struct AnywhereLazy;

impl Viewport for AnywhereLazy {
    fn is_ok_to_make_lazy(&self, _top: f32, _bottom: f32) -> bool {
        true
    }
}

/// Viewport that keeps everything displayed.
pub(crate) struct KeepAll;

impl Viewport for KeepAll {
    fn is_ok_to_make_lazy(&self, _top: f32, _bottom: f32) -> bool {
        false
    }
}

/// Viewport pinning the band `top..bottom` on screen.
pub(crate) struct Window {
    pub(crate) top: f32,
    pub(crate) bottom: f32,
}

impl Viewport for Window {
    fn is_ok_to_make_lazy(&self, top: f32, bottom: f32) -> bool {
        bottom <= self.top || top >= self.bottom
    }
}

/// A host, shaper, synchronizer and layout context bundled up, with a
/// shared log of every callback.
pub(crate) struct Fixture<H = TestHost> {
    pub(crate) log: EventLog,
    pub(crate) lcx: LayoutContext,
    pub(crate) shaper: FixedShaper,
    pub(crate) host: H,
    pub(crate) sync: RecordingSync,
    pub(crate) width: f32,
}

impl<H: ViewHost> Fixture<H> {
    pub(crate) fn cx(&mut self) -> TreeCx<'_> {
        TreeCx {
            lcx: &mut self.lcx,
            shaper: &mut self.shaper,
            host: &mut self.host,
            sync: Some(&mut self.sync),
            width: self.width,
        }
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub(crate) fn clear_events(&self) {
        self.log.borrow_mut().clear();
    }

    pub(crate) fn displayed(&self) -> Vec<ObjectId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Display(object) => Some(object),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn sync_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::SyncExpand(..) | Event::SyncContract(..)))
            .collect()
    }

    pub(crate) fn estimate_calls(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Estimate(_)))
            .count()
    }
}

impl Fixture {
    /// Fixture whose items each display one paragraph of the given text.
    pub(crate) fn new(texts: &[&str]) -> Self {
        let log = EventLog::default();
        let mut host = TestHost::new(&log);
        for (i, text) in texts.iter().enumerate() {
            let object = id(u64::try_from(i).unwrap() + 1);
            host.items.push(object);
            host.texts.insert(object, (*text).to_string());
        }
        Self {
            log: Rc::clone(&log),
            lcx: LayoutContext::new(),
            shaper: FixedShaper::new(),
            host,
            sync: RecordingSync { log },
            width: 200.0,
        }
    }

    /// Tree displaying the fixture's whole item sequence as one root
    /// placeholder.
    pub(crate) fn tree(&mut self) -> (BoxTree, BoxHandle) {
        self.tree_with_scale(1.0)
    }

    /// Same as [`Fixture::tree`], at a layout-to-device scale.
    pub(crate) fn tree_with_scale(&mut self, scale: f32) -> (BoxTree, BoxHandle) {
        let ids = self.host.items.clone();
        let mut tree = BoxTree::new(scale);
        tree.set_root_contents(&mut self.cx(), FACTORY, FRAG, CONTEXT, ITEMS_TAG, ids);
        let lazy = tree.children_of(tree.root())[0];
        (tree, lazy)
    }
}

impl Fixture<NestedHost> {
    /// Fixture whose top-level items are sections, each displaying a
    /// nested placeholder of paragraph sub-items.
    pub(crate) fn nested(sections: &[(u64, &[&str])]) -> Self {
        let log = EventLog::default();
        let mut host = NestedHost::new(&log);
        let mut next = 100;
        for (section, texts) in sections {
            let section = id(*section);
            host.sections.push(section);
            let mut subs = Vec::new();
            for text in *texts {
                let sub = id(next);
                next += 1;
                subs.push(sub);
                host.texts.insert(sub, (*text).to_string());
            }
            host.subs.insert(section, subs);
        }
        Self {
            log: Rc::clone(&log),
            lcx: LayoutContext::new(),
            shaper: FixedShaper::new(),
            host,
            sync: RecordingSync { log },
            width: 200.0,
        }
    }

    /// Tree displaying the fixture's sections as one root placeholder.
    pub(crate) fn section_tree(&mut self) -> (BoxTree, BoxHandle) {
        let ids = self.host.sections.clone();
        let mut tree = BoxTree::new(1.0);
        tree.set_root_contents(&mut self.cx(), FACTORY, FRAG, CONTEXT, ITEMS_TAG, ids);
        let lazy = tree.children_of(tree.root())[0];
        (tree, lazy)
    }
}
