// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types reported by tree building, expansion and line breaking.

use core::fmt;

use crate::host::WsId;

/// The kinds of failure a host `display` callback or the staging
/// environment can raise while building box content.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildErrorKind {
    /// The host reported that it could not produce content for an object.
    HostFailure,
    /// An open/close pair (object, property, paragraph or pile) was left
    /// unbalanced when the build finished.
    UnbalancedScope,
    /// Text was added outside of an open paragraph.
    TextOutsideParagraph,
    /// A property or box was opened in a position where it is not allowed.
    MisplacedScope,
}

/// Error raised while building staged box content.
///
/// Building is transactional. When a build fails the staged content is
/// dropped without touching the live tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildError {
    kind: BuildErrorKind,
    detail: Option<&'static str>,
}

impl BuildError {
    pub(crate) fn new(kind: BuildErrorKind) -> Self {
        Self { kind, detail: None }
    }

    /// Creates an error for a host `display` callback that failed,
    /// with a short static description of what went wrong.
    pub fn host(detail: &'static str) -> Self {
        Self {
            kind: BuildErrorKind::HostFailure,
            detail: Some(detail),
        }
    }

    pub(crate) fn with_detail(kind: BuildErrorKind, detail: &'static str) -> Self {
        Self {
            kind,
            detail: Some(detail),
        }
    }

    /// The kind of build failure.
    pub fn kind(&self) -> BuildErrorKind {
        self.kind
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BuildErrorKind::HostFailure => write!(f, "host failed to display an object")?,
            BuildErrorKind::UnbalancedScope => write!(f, "unbalanced open/close in build")?,
            BuildErrorKind::TextOutsideParagraph => {
                write!(f, "text added outside of a paragraph")?;
            }
            BuildErrorKind::MisplacedScope => write!(f, "scope opened in an invalid position")?,
        }
        if let Some(detail) = self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl core::error::Error for BuildError {}

/// Error raised when line breaking cannot measure a run at all.
///
/// Transient placement failures are not reported through this type; the
/// breaker degrades those to an estimated advance instead. Only a writing
/// system with no usable shaping path surfaces here.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BreakError {
    ws: WsId,
}

impl BreakError {
    pub(crate) fn unknown_writing_system(ws: WsId) -> Self {
        Self { ws }
    }

    /// The writing system that could not be shaped.
    pub fn writing_system(&self) -> WsId {
        self.ws
    }
}

impl fmt::Display for BreakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no shaping path for writing system {}", self.ws.0)
    }
}

impl core::error::Error for BreakError {}

/// Error raised by lazy expansion and contraction.
///
/// Both contain a build phase (host callbacks producing content) and a
/// layout phase (measuring what was produced), and either can fail. A
/// failed operation leaves the tree exactly as it was.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpandError {
    /// The host failed while building replacement content.
    Build(BuildError),
    /// Measuring the replacement content failed.
    Layout(BreakError),
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(e) => write!(f, "expansion build failed: {e}"),
            Self::Layout(e) => write!(f, "expansion layout failed: {e}"),
        }
    }
}

impl core::error::Error for ExpandError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Build(e) => Some(e),
            Self::Layout(e) => Some(e),
        }
    }
}

impl From<BuildError> for ExpandError {
    fn from(e: BuildError) -> Self {
        Self::Build(e)
    }
}

impl From<BreakError> for ExpandError {
    fn from(e: BreakError) -> Self {
        Self::Layout(e)
    }
}
