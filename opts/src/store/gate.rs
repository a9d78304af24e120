//! Initialization gate
//!
//! Holds work submitted before the persisted snapshot has been merged and
//! hands it back, in submission order, when the gate opens. One-way: once
//! `Ready` it never returns to `Loading`.

use std::collections::VecDeque;

use tracing::debug;

#[derive(Debug)]
pub enum InitGate<T> {
    Loading(VecDeque<T>),
    Ready,
}

impl<T> Default for InitGate<T> {
    fn default() -> Self {
        InitGate::Loading(VecDeque::new())
    }
}

impl<T> InitGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, InitGate::Ready)
    }

    /// Queue `item` while loading; hand it straight back once ready
    pub fn defer(&mut self, item: T) -> Option<T> {
        match self {
            InitGate::Loading(queue) => {
                queue.push_back(item);
                debug!(queued = queue.len(), "InitGate::defer: queued until ready");
                None
            }
            InitGate::Ready => Some(item),
        }
    }

    /// Transition to `Ready`, returning everything queued
    pub fn open(&mut self) -> VecDeque<T> {
        match std::mem::replace(self, InitGate::Ready) {
            InitGate::Loading(queue) => {
                debug!(queued = queue.len(), "InitGate::open: releasing deferred work");
                queue
            }
            InitGate::Ready => VecDeque::new(),
        }
    }

    pub fn queued(&self) -> usize {
        match self {
            InitGate::Loading(queue) => queue.len(),
            InitGate::Ready => 0,
        }
    }
}
