// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expansion of lazy boxes and the callback protocol around it.

use crate::tests::utils::{assert_near, id, Event, Fixture, CONTEXT, ITEMS_TAG, SUB_TAG};
use crate::tree::data::LayoutPhase;
use crate::{BuildErrorKind, ExpandError, LazyItems};

#[test]
fn fresh_tree_is_one_estimated_placeholder() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (tree, lazy) = fx.tree();

    assert_eq!(tree.children_of(tree.root()).to_vec(), vec![lazy]);
    assert!(tree.is_lazy(lazy));
    assert_eq!(
        tree.lazy_items(lazy).unwrap().ids(),
        &[id(1), id(2), id(3), id(4), id(5)]
    );
    assert_eq!(tree.lazy_index_min(lazy), Some(0));
    assert_near(tree.total_height(), 50.0);
    // Five items are probed at the first, middle and last position only.
    assert_eq!(
        fx.events(),
        vec![
            Event::Estimate(id(1)),
            Event::Estimate(id(3)),
            Event::Estimate(id(5)),
        ]
    );
}

#[test]
fn interior_expansion_splits_the_placeholder() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();

    let exp = tree.expand_items(&mut fx.cx(), lazy, 1..3).unwrap();
    assert_eq!(exp.prefix_lazy, Some(lazy));
    assert_eq!(exp.expanded.len(), 2);
    let tail = exp.suffix_lazy.expect("trailing placeholder");

    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids, vec![lazy, exp.expanded[0], exp.expanded[1], tail]);
    assert_eq!(tree.lazy_items(lazy).unwrap().ids(), &[id(1)]);
    assert_eq!(tree.lazy_index_min(lazy), Some(0));
    assert_eq!(tree.lazy_items(tail).unwrap().ids(), &[id(4), id(5)]);
    assert_eq!(tree.lazy_index_min(tail), Some(3));
    assert_eq!(tree.para_text(exp.expanded[0]), Some("two"));
    assert_eq!(tree.para_text(exp.expanded[1]), Some("three"));

    assert_near(tree.box_height(lazy), 10.0);
    assert_near(tree.box_top(exp.expanded[0]), 10.0);
    assert_near(tree.box_top(tail), 30.0);
    assert_near(tree.box_height(tail), 20.0);
    assert_near(tree.total_height(), 50.0);
    // The split inherits the estimates; nothing is probed again.
    assert_eq!(fx.estimate_calls(), 3);
}

#[test]
fn leading_expansion_keeps_the_tail() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();

    let exp = tree.expand_items(&mut fx.cx(), lazy, 0..2).unwrap();
    assert_eq!(exp.prefix_lazy, None);
    assert_eq!(exp.suffix_lazy, Some(lazy));
    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids, vec![exp.expanded[0], exp.expanded[1], lazy]);
    assert_eq!(tree.lazy_items(lazy).unwrap().ids(), &[id(3), id(4), id(5)]);
    assert_eq!(tree.lazy_index_min(lazy), Some(2));
    assert_near(tree.box_top(lazy), 20.0);

    let loc = tree.locate_owner(exp.expanded[0]);
    assert_eq!(loc.object, CONTEXT);
    assert_eq!(loc.tag, ITEMS_TAG);
}

#[test]
fn trailing_expansion_keeps_the_head() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();

    let exp = tree.expand_items(&mut fx.cx(), lazy, 3..5).unwrap();
    assert_eq!(exp.prefix_lazy, Some(lazy));
    assert_eq!(exp.suffix_lazy, None);
    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids, vec![lazy, exp.expanded[0], exp.expanded[1]]);
    assert_eq!(tree.lazy_items(lazy).unwrap().ids(), &[id(1), id(2), id(3)]);
    assert_eq!(tree.lazy_index_min(lazy), Some(0));
    assert_eq!(tree.para_text(exp.expanded[0]), Some("four"));
    assert_near(tree.box_top(exp.expanded[0]), 30.0);
    assert_near(tree.box_top(exp.expanded[1]), 40.0);
    assert_near(tree.total_height(), 50.0);
    assert_eq!(
        fx.sync_events(),
        vec![Event::SyncExpand(CONTEXT, ITEMS_TAG, 3..5)]
    );
}

#[test]
fn full_expansion_dissolves_the_placeholder() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();

    let exp = tree.expand_fully(&mut fx.cx(), lazy).unwrap();
    assert_eq!(exp.prefix_lazy, None);
    assert_eq!(exp.suffix_lazy, None);
    assert_eq!(exp.expanded.len(), 5);
    assert!(!tree.contains(lazy));

    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids, exp.expanded);
    let texts: Vec<_> = kids.iter().map(|&k| tree.para_text(k).unwrap()).collect();
    assert_eq!(texts, vec!["one", "two", "three", "four", "five"]);
    assert_near(tree.total_height(), 50.0);
    assert_eq!(
        fx.sync_events(),
        vec![Event::SyncExpand(CONTEXT, ITEMS_TAG, 0..5)]
    );

    // The property chain now runs through the real boxes.
    let loc = tree.locate_owner(kids[0]);
    assert_eq!(loc.object, CONTEXT);
    assert_eq!(loc.tag, ITEMS_TAG);
}

#[test]
fn expansion_informs_sync_before_the_host_loads() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();
    fx.clear_events();

    tree.expand_items(&mut fx.cx(), lazy, 1..3).unwrap();
    assert_eq!(
        fx.events(),
        vec![
            Event::SyncExpand(CONTEXT, ITEMS_TAG, 1..3),
            Event::Load(vec![id(2), id(3)], 1..3),
            Event::Display(id(2)),
            Event::Display(id(3)),
        ]
    );
}

#[test]
fn expand_next_takes_one_item() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();

    let exp = tree.expand_next(&mut fx.cx(), lazy).unwrap();
    assert_eq!(exp.expanded.len(), 1);
    assert_eq!(tree.para_text(exp.expanded[0]), Some("one"));
    assert_eq!(exp.suffix_lazy, Some(lazy));
    assert_eq!(
        tree.lazy_items(lazy).unwrap().ids(),
        &[id(2), id(3), id(4), id(5)]
    );
    assert_eq!(tree.lazy_index_min(lazy), Some(1));
}

#[test]
fn expansion_outside_the_items_is_a_no_op() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();
    fx.clear_events();

    let exp = tree.expand_items(&mut fx.cx(), lazy, 7..9).unwrap();
    assert_eq!(exp.prefix_lazy, Some(lazy));
    assert!(exp.expanded.is_empty());
    assert_eq!(exp.suffix_lazy, None);
    assert_eq!(tree.children_of(tree.root()).to_vec(), vec![lazy]);
    assert!(fx.events().is_empty());
}

#[test]
fn expand_all_reaches_a_fixed_point() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, _) = fx.tree();

    tree.expand_all(&mut fx.cx()).unwrap();
    assert_eq!(fx.displayed(), (1..=5).map(id).collect::<Vec<_>>());
    assert_eq!(tree.children_of(tree.root()).len(), 5);

    fx.clear_events();
    tree.expand_all(&mut fx.cx()).unwrap();
    assert!(fx.events().is_empty());
}

#[test]
fn failed_display_leaves_the_tree_untouched() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();
    fx.host.poisoned.insert(id(2));
    fx.clear_events();

    let err = tree.expand_items(&mut fx.cx(), lazy, 1..3).unwrap_err();
    assert!(matches!(
        err,
        ExpandError::Build(ref e) if e.kind() == BuildErrorKind::HostFailure
    ));
    assert_eq!(tree.children_of(tree.root()).to_vec(), vec![lazy]);
    assert_eq!(tree.lazy_items(lazy).unwrap().len(), 5);
    assert_near(tree.total_height(), 50.0);
    assert!(fx.displayed().is_empty());

    // The box is not stuck in layout; a retry succeeds.
    fx.host.poisoned.clear();
    let exp = tree.expand_items(&mut fx.cx(), lazy, 1..3).unwrap();
    assert_eq!(exp.expanded.len(), 2);
    assert_eq!(tree.children_of(tree.root()).len(), 4);
    // The synchronizer heard both attempts.
    assert_eq!(fx.sync_events().len(), 2);
}

#[test]
#[should_panic(expected = "reentered layout")]
fn reentering_layout_panics() {
    let mut fx = Fixture::new(&["one"]);
    let (mut tree, lazy) = fx.tree();
    tree.data_mut(lazy).as_lazy_mut().unwrap().phase = LayoutPhase::InLayout;
    let _ = tree.expand_items(&mut fx.cx(), lazy, 0..1);
}

#[test]
fn prepare_range_covers_the_band() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, _) = fx.tree();

    tree.prepare_range(&mut fx.cx(), 0.0, 25.0).unwrap();
    assert_eq!(fx.displayed(), vec![id(1), id(2), id(3)]);
    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids.len(), 4);
    assert_near(tree.box_top(kids[0]), 0.0);
    assert_near(tree.box_top(kids[2]), 20.0);
    let tail = kids[3];
    assert!(tree.is_lazy(tail));
    assert_eq!(tree.lazy_index_min(tail), Some(3));
    assert_near(tree.box_top(tail), 30.0);

    // The band is already covered; nothing further happens.
    fx.clear_events();
    tree.prepare_range(&mut fx.cx(), 0.0, 25.0).unwrap();
    assert!(fx.events().is_empty());

    // A band touching the placeholder's top edge pulls in one more item.
    tree.prepare_range(&mut fx.cx(), 0.0, 30.0).unwrap();
    assert_eq!(fx.displayed(), vec![id(4)]);
    assert_eq!(tree.children_of(tree.root()).len(), 5);
    assert_eq!(tree.lazy_index_min(tail), Some(4));
}

#[test]
fn width_change_refreshes_estimates_before_the_band_is_read() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, _) = fx.tree();
    tree.prepare_range(&mut fx.cx(), 0.0, 25.0).unwrap();
    fx.clear_events();

    fx.width = 60.0;
    tree.prepare_range(&mut fx.cx(), 0.0, 25.0).unwrap();
    // The stale placeholder is re-probed; the short paragraphs still
    // cover the band, so no further item is displayed.
    assert_eq!(
        fx.events(),
        vec![Event::Estimate(id(4)), Event::Estimate(id(5))]
    );
    assert_near(tree.total_height(), 50.0);
}

#[test]
fn items_to_expand_follows_uneven_estimates() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    for (object, estimate) in [(1, 5.0), (2, 1.0), (3, 1.0), (4, 20.0), (5, 3.0)] {
        fx.host.estimates.insert(id(object), estimate);
    }
    let (tree, lazy) = fx.tree();

    assert_near(tree.total_height(), 30.0);
    assert_eq!(tree.items_to_expand(lazy, 6.0, 8.0), 2..4);
    // A degenerate band still asks for one item.
    assert_eq!(tree.items_to_expand(lazy, 0.0, 0.0), 0..1);
    // A band below everything clamps to the last item.
    assert_eq!(tree.items_to_expand(lazy, 100.0, 120.0), 4..5);
}

#[test]
fn scale_converts_estimates_to_device_units() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree_with_scale(2.0);

    assert_near(tree.total_height(), 100.0);
    assert_eq!(tree.items_to_expand(lazy, 0.0, 40.0), 0..2);

    // Real paragraphs come out in device units already; only the
    // remaining estimates are scaled.
    let exp = tree.expand_items(&mut fx.cx(), lazy, 0..2).unwrap();
    let tail = exp.suffix_lazy.unwrap();
    assert_near(tree.box_height(exp.expanded[0]), 10.0);
    assert_near(tree.box_top(tail), 20.0);
    assert_near(tree.box_height(tail), 60.0);
    assert_near(tree.total_height(), 80.0);
}

#[test]
fn empty_placeholder_dissolves_without_the_host() {
    let mut fx = Fixture::new(&[]);
    let (mut tree, lazy) = fx.tree();
    assert!(tree.is_lazy(lazy));
    assert_eq!(tree.lazy_items(lazy).unwrap().len(), 0);
    assert_near(tree.total_height(), 0.0);

    fx.clear_events();
    let exp = tree.expand_fully(&mut fx.cx(), lazy).unwrap();
    assert_eq!(exp.prefix_lazy, None);
    assert!(exp.expanded.is_empty());
    assert_eq!(exp.suffix_lazy, None);
    assert!(!tree.contains(lazy));
    assert!(tree.children_of(tree.root()).is_empty());
    assert!(fx.events().is_empty());
}

#[test]
fn fresh_estimates_are_not_probed_again() {
    let mut fx = Fixture::new(&["one", "two", "three", "four", "five"]);
    let (mut tree, lazy) = fx.tree();
    assert_eq!(fx.estimate_calls(), 3);

    tree.expand_items(&mut fx.cx(), lazy, 0..2).unwrap();
    assert_eq!(fx.estimate_calls(), 3);
    tree.relayout(&mut fx.cx()).unwrap();
    assert_eq!(fx.estimate_calls(), 3);

    // A width change invalidates them; the refresh sees new values.
    fx.host.estimate = 30.0;
    fx.width = 100.0;
    tree.relayout(&mut fx.cx()).unwrap();
    assert_eq!(fx.estimate_calls(), 6);
    assert_near(tree.box_height(lazy), 90.0);
    assert_near(tree.total_height(), 110.0);
}

#[test]
#[should_panic(expected = "parallel")]
fn mismatched_item_arrays_panic() {
    let _ = LazyItems::new(vec![id(1)], Vec::new());
}

#[test]
fn nested_placeholders_resolve_to_the_nearest_owner() {
    let mut fx = Fixture::nested(&[(1, &["aa", "bb"][..]), (2, &["cc"][..])]);
    let (mut tree, sections) = fx.section_tree();

    tree.expand_fully(&mut fx.cx(), sections).unwrap();
    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids.len(), 2);
    let first = kids[0];
    assert!(tree.is_lazy(first));
    assert_eq!(tree.lazy_items(first).unwrap().ids(), &[id(100), id(101)]);

    // Both the root notifier and the section notifier cover this box;
    // the deeper one owns it.
    let loc = tree.locate_owner(first);
    assert_eq!(loc.object, id(1));
    assert_eq!(loc.tag, SUB_TAG);

    fx.clear_events();
    tree.expand_fully(&mut fx.cx(), first).unwrap();
    assert_eq!(
        fx.sync_events(),
        vec![Event::SyncExpand(id(1), SUB_TAG, 0..2)]
    );
    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids.len(), 3);
    assert_eq!(tree.para_text(kids[0]), Some("aa"));
    assert_eq!(tree.para_text(kids[1]), Some("bb"));
    assert!(tree.is_lazy(kids[2]));
}

#[test]
fn owner_lookup_skips_empty_properties() {
    let mut fx = Fixture::nested(&[(1, &["aa", "bb"][..])]);
    fx.host.empty_prop = true;
    let (mut tree, sections) = fx.section_tree();

    tree.expand_fully(&mut fx.cx(), sections).unwrap();
    let nested = tree.children_of(tree.root())[0];
    assert!(tree.is_lazy(nested));

    // The empty property contributes nothing to the chain walk; the
    // populated one after it owns the box.
    let loc = tree.locate_owner(nested);
    assert_eq!(loc.object, id(1));
    assert_eq!(loc.tag, SUB_TAG);
    assert_eq!(loc.prop_index, 1);
}

#[test]
fn expand_all_reaches_nested_placeholders() {
    let mut fx = Fixture::nested(&[(1, &["aa", "bb"][..]), (2, &["cc"][..])]);
    let (mut tree, _) = fx.section_tree();

    tree.expand_all(&mut fx.cx()).unwrap();
    let kids = tree.children_of(tree.root()).to_vec();
    assert_eq!(kids.len(), 3);
    let texts: Vec<_> = kids.iter().map(|&k| tree.para_text(k).unwrap()).collect();
    assert_eq!(texts, vec!["aa", "bb", "cc"]);
    assert_near(tree.total_height(), 30.0);
}
