// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reusable per-view layout state.

use crate::analysis::Analyzer;

/// State shared across layout passes of one view.
///
/// Building an [`Analyzer`] resolves segmentation models, so the context
/// should be created once and lent to every tree operation rather than
/// rebuilt per paragraph.
#[derive(Clone, Debug)]
pub struct LayoutContext {
    pub(crate) analyzer: Analyzer,
}

impl LayoutContext {
    /// Creates a context with freshly resolved Unicode data handles.
    pub fn new() -> Self {
        Self {
            analyzer: Analyzer::new(),
        }
    }

    /// The analyzer used for paragraph analysis.
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }
}

impl Default for LayoutContext {
    fn default() -> Self {
        Self::new()
    }
}
