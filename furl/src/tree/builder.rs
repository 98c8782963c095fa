// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Staged construction of box content.
//!
//! Host `display` callbacks run against a [`BoxBuilder`], which stages
//! boxes and notifiers in private arenas with local indices. Nothing
//! touches the live tree until the build finishes successfully and the
//! finished fragment is spliced in; a failed build is dropped whole, which
//! is what makes expansion transactional.

use alloc::string::String;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::analysis::WsSpan;
use crate::error::{BuildError, BuildErrorKind};
use crate::host::{FactoryId, FragmentId, ObjectId, PropertyTag, WsId};
use crate::tree::data::{BoxStyle, LazyItems, PropKind, NOT_AN_ATTR};

/// A staged box, identified by its index in [`BuiltFragment::boxes`].
#[derive(Clone, Debug)]
pub(crate) enum StagedKind {
    Pile {
        children: Vec<usize>,
    },
    Para {
        text: String,
        spans: SmallVec<[WsSpan; 2]>,
    },
    Lazy {
        items: LazyItems,
        index_min: usize,
        factory: FactoryId,
        fragment: FragmentId,
        context: ObjectId,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct StagedBox {
    pub(crate) style: BoxStyle,
    pub(crate) kind: StagedKind,
}

#[derive(Clone, Debug)]
pub(crate) struct StagedProp {
    pub(crate) tag: PropertyTag,
    pub(crate) kind: PropKind,
    pub(crate) first: Option<usize>,
    /// Set when the property's items went through
    /// [`add_lazy_items`](BoxBuilder::add_lazy_items), which is what makes
    /// the property contractible later.
    pub(crate) item_display: Option<(FactoryId, FragmentId)>,
}

#[derive(Clone, Debug)]
pub(crate) struct StagedNotifier {
    pub(crate) object: ObjectId,
    /// Index of the staged parent notifier; `None` for notifiers hanging
    /// directly off the splice anchor.
    pub(crate) parent: Option<usize>,
    pub(crate) props: Vec<StagedProp>,
    pub(crate) last: Option<usize>,
}

/// The completed output of a build: staged boxes, the indices of those at
/// the splice level, and the staged notifiers.
#[derive(Clone, Debug, Default)]
pub(crate) struct BuiltFragment {
    pub(crate) boxes: Vec<StagedBox>,
    pub(crate) roots: Vec<usize>,
    pub(crate) notifiers: Vec<StagedNotifier>,
}

#[derive(Copy, Clone, Debug)]
enum Scope {
    /// An open object; `notifier` indexes the staged notifiers.
    Object {
        notifier: usize,
        container: Option<usize>,
    },
    /// An open property of the innermost enclosing object.
    Prop {
        notifier: usize,
        prop: usize,
        container: Option<usize>,
    },
    /// An open nested pile; boxes go into its children.
    Pile { box_id: usize },
    /// An open paragraph collecting text.
    Para { box_id: usize },
}

/// The staging environment handed to host `display` callbacks.
///
/// Content is built with open/close scope pairs: objects contain
/// properties, properties contain boxes, paragraphs contain text. Boxes
/// added while no property is open are recorded against the enclosing
/// object as non-attribute content.
#[derive(Debug)]
pub struct BoxBuilder {
    default_style: BoxStyle,
    boxes: Vec<StagedBox>,
    roots: Vec<usize>,
    notifiers: Vec<StagedNotifier>,
    scopes: Vec<Scope>,
}

impl BoxBuilder {
    /// A builder whose content inherits display properties from a
    /// container with `container_style`.
    pub(crate) fn new(container_style: &BoxStyle) -> Self {
        Self {
            default_style: BoxStyle::inherited(container_style),
            boxes: Vec::new(),
            roots: Vec::new(),
            notifiers: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// The style content inherits from the container being built into.
    pub fn default_style(&self) -> BoxStyle {
        self.default_style
    }

    /// Opens a display scope for `object`. Everything built until the
    /// matching [`close_object`](Self::close_object) is attributed to it.
    pub fn open_object(&mut self, object: ObjectId) -> Result<(), BuildError> {
        if self.in_paragraph() {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "object opened inside a paragraph",
            ));
        }
        let notifier = self.notifiers.len();
        let parent = self.innermost_object();
        self.notifiers.push(StagedNotifier {
            object,
            parent,
            props: Vec::new(),
            last: None,
        });
        self.scopes.push(Scope::Object {
            notifier,
            container: self.current_container(),
        });
        Ok(())
    }

    /// Closes the innermost open object scope.
    pub fn close_object(&mut self) -> Result<(), BuildError> {
        match self.scopes.pop() {
            Some(Scope::Object { .. }) => Ok(()),
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(BuildError::with_detail(
                    BuildErrorKind::UnbalancedScope,
                    "close_object without matching open_object",
                ))
            }
        }
    }

    /// Opens property `tag` of the innermost open object.
    pub fn open_prop(&mut self, tag: PropertyTag, kind: PropKind) -> Result<(), BuildError> {
        if self.in_paragraph() {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "property opened inside a paragraph",
            ));
        }
        let Some(notifier) = self.innermost_object() else {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "property opened outside any object",
            ));
        };
        let prop = self.notifiers[notifier].props.len();
        self.notifiers[notifier].props.push(StagedProp {
            tag,
            kind,
            first: None,
            item_display: None,
        });
        self.scopes.push(Scope::Prop {
            notifier,
            prop,
            container: self.current_container(),
        });
        Ok(())
    }

    /// Closes the innermost open property scope.
    pub fn close_prop(&mut self) -> Result<(), BuildError> {
        match self.scopes.pop() {
            Some(Scope::Prop { .. }) => Ok(()),
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(BuildError::with_detail(
                    BuildErrorKind::UnbalancedScope,
                    "close_prop without matching open_prop",
                ))
            }
        }
    }

    /// Opens a paragraph box.
    pub fn open_paragraph(&mut self, style: BoxStyle) -> Result<(), BuildError> {
        if self.in_paragraph() {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "paragraphs do not nest",
            ));
        }
        let box_id = self.add_box(StagedBox {
            style,
            kind: StagedKind::Para {
                text: String::new(),
                spans: SmallVec::new(),
            },
        });
        self.scopes.push(Scope::Para { box_id });
        Ok(())
    }

    /// Closes the open paragraph.
    pub fn close_paragraph(&mut self) -> Result<(), BuildError> {
        match self.scopes.pop() {
            Some(Scope::Para { .. }) => Ok(()),
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(BuildError::with_detail(
                    BuildErrorKind::UnbalancedScope,
                    "close_paragraph without matching open_paragraph",
                ))
            }
        }
    }

    /// Appends text in writing system `ws` to the open paragraph.
    pub fn add_text(&mut self, ws: WsId, text: &str) -> Result<(), BuildError> {
        let Some(Scope::Para { box_id }) = self.scopes.last().copied() else {
            return Err(BuildError::new(BuildErrorKind::TextOutsideParagraph));
        };
        let StagedKind::Para { text: buf, spans } = &mut self.boxes[box_id].kind else {
            unreachable!("paragraph scope points at a non-paragraph box");
        };
        let start = buf.len();
        buf.push_str(text);
        match spans.last_mut() {
            Some(span) if span.ws == ws => span.range.end = buf.len(),
            _ => spans.push(WsSpan {
                range: start..buf.len(),
                ws,
            }),
        }
        Ok(())
    }

    /// Opens a nested pile; boxes added until the matching close become
    /// its children.
    pub fn open_pile(&mut self, style: BoxStyle) -> Result<(), BuildError> {
        if self.in_paragraph() {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "pile opened inside a paragraph",
            ));
        }
        let box_id = self.add_box(StagedBox {
            style,
            kind: StagedKind::Pile {
                children: Vec::new(),
            },
        });
        self.scopes.push(Scope::Pile { box_id });
        Ok(())
    }

    /// Closes the innermost open pile.
    pub fn close_pile(&mut self) -> Result<(), BuildError> {
        match self.scopes.pop() {
            Some(Scope::Pile { .. }) => Ok(()),
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(BuildError::with_detail(
                    BuildErrorKind::UnbalancedScope,
                    "close_pile without matching open_pile",
                ))
            }
        }
    }

    /// Adds a lazy box standing in for the `ids` of the open property,
    /// displayed on demand by `factory` with `fragment` against `context`.
    pub fn add_lazy_items(
        &mut self,
        factory: FactoryId,
        fragment: FragmentId,
        context: ObjectId,
        ids: Vec<ObjectId>,
    ) -> Result<(), BuildError> {
        if self.in_paragraph() {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "lazy items added inside a paragraph",
            ));
        }
        // A lazy box must sit on a property chain, or no owner could ever
        // be located for it when it comes time to expand.
        let container = self.current_container();
        let target = self.scopes.iter().rev().find_map(|scope| match *scope {
            Scope::Prop {
                notifier,
                prop,
                container: c,
            } if c == container => Some((notifier, prop)),
            _ => None,
        });
        let Some((notifier, prop)) = target else {
            return Err(BuildError::with_detail(
                BuildErrorKind::MisplacedScope,
                "lazy items added outside an open property",
            ));
        };
        let style = self.default_style;
        self.add_box(StagedBox {
            style,
            kind: StagedKind::Lazy {
                items: LazyItems::from_ids(ids),
                index_min: 0,
                factory,
                fragment,
                context,
            },
        });
        self.notifiers[notifier].props[prop].item_display = Some((factory, fragment));
        Ok(())
    }

    /// Finishes the build. Fails if any scope is still open.
    pub(crate) fn finish(self) -> Result<BuiltFragment, BuildError> {
        if !self.scopes.is_empty() {
            return Err(BuildError::with_detail(
                BuildErrorKind::UnbalancedScope,
                "build finished with open scopes",
            ));
        }
        Ok(BuiltFragment {
            boxes: self.boxes,
            roots: self.roots,
            notifiers: self.notifiers,
        })
    }

    fn in_paragraph(&self) -> bool {
        matches!(self.scopes.last(), Some(Scope::Para { .. }))
    }

    /// Index of the innermost open object's staged notifier.
    fn innermost_object(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Object { notifier, .. } => Some(*notifier),
            _ => None,
        })
    }

    /// The pile whose children new boxes join, or `None` at splice level.
    fn current_container(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Pile { box_id } => Some(*box_id),
            _ => None,
        })
    }

    /// Stages `staged`, appends it to the current container, and records
    /// it on every same-level property chain and object scope.
    fn add_box(&mut self, staged: StagedBox) -> usize {
        let box_id = self.boxes.len();
        self.boxes.push(staged);
        let container = self.current_container();
        match container {
            Some(pile) => {
                let StagedKind::Pile { children } = &mut self.boxes[pile].kind else {
                    unreachable!("pile scope points at a non-pile box");
                };
                children.push(box_id);
            }
            None => self.roots.push(box_id),
        }

        // Attribute the box to enclosing scopes that build into the same
        // container. A box with an enclosing object but no open property
        // at its level is recorded as non-attribute content.
        let mut attributed = false;
        for scope in self.scopes.iter().rev() {
            match *scope {
                Scope::Prop {
                    notifier,
                    prop,
                    container: c,
                } if c == container => {
                    let entry = &mut self.notifiers[notifier].props[prop];
                    if entry.first.is_none() {
                        entry.first = Some(box_id);
                    }
                    attributed = true;
                }
                Scope::Object {
                    notifier,
                    container: c,
                } if c == container => {
                    let data = &mut self.notifiers[notifier];
                    data.last = Some(box_id);
                    if !attributed {
                        let literal = data
                            .props
                            .last()
                            .is_some_and(|p| p.tag == NOT_AN_ATTR && p.first.is_some());
                        if !literal {
                            data.props.push(StagedProp {
                                tag: NOT_AN_ATTR,
                                kind: PropKind::Literal,
                                first: Some(box_id),
                                item_display: None,
                            });
                        }
                        attributed = true;
                    }
                }
                _ => {}
            }
        }
        box_id
    }
}
