// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use crate::cfg::config::Config;

/// Process-wide library context.
///
/// Owns what used to be hidden globals: the session-id counter and the
/// runtime configuration. Every session holds an `Arc` to it, so the
/// embedder controls the lifecycle explicitly; dropping the last handle is
/// the teardown.
#[derive(Debug)]
pub struct Context {
    cfg: Config,
    session_ids: AtomicU32,
}

impl Context {
    pub fn new(cfg: Config) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            session_ids: AtomicU32::new(1),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Allocates the next session id; ids start at 1 and never repeat
    /// within one context.
    pub(crate) fn next_session_id(&self) -> u32 {
        self.session_ids.fetch_add(1, Ordering::SeqCst)
    }
}
