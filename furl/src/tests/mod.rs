// Copyright 2026 the Furl Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end tests driving the public API with scripted hosts.

mod utils;

mod test_tree;
