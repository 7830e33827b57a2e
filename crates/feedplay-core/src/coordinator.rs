//! Playback coordination
//!
//! Decides which content id in a visible media group should currently play.
//! A group with several videos plays them one after another and stops after
//! the last one; a group with a single video plays just that one.

use crate::types::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// Playback mode of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlaybackMode {
    /// No active group
    Idle,
    /// Exactly one item, always current
    Single,
    /// Ordered items played one at a time
    Sequential,
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackMode::Idle => write!(f, "idle"),
            PlaybackMode::Single => write!(f, "single"),
            PlaybackMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Sequential playback state machine for one group
///
/// `current_index` is always a valid index into `ordered_ids` unless the
/// mode is `Idle`. Duplicate ids are positional: each occurrence is its own
/// turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSequence {
    ordered_ids: Vec<ContentId>,
    current_index: usize,
    mode: PlaybackMode,
}

impl Default for PlaybackSequence {
    fn default() -> Self {
        Self {
            ordered_ids: Vec::new(),
            current_index: 0,
            mode: PlaybackMode::Idle,
        }
    }
}

impl PlaybackSequence {
    pub fn new(ids: Vec<ContentId>) -> Self {
        let mut sequence = Self::default();
        sequence.setup(ids);
        sequence
    }

    fn mode_for(len: usize) -> PlaybackMode {
        match len {
            0 => PlaybackMode::Idle,
            1 => PlaybackMode::Single,
            _ => PlaybackMode::Sequential,
        }
    }

    /// Replace the group's items and start from the first
    pub fn setup(&mut self, ids: Vec<ContentId>) {
        self.mode = Self::mode_for(ids.len());
        self.ordered_ids = ids;
        self.current_index = 0;
    }

    /// Advance after the current item finished
    ///
    /// The last item of a sequence ends it (no loop). A single item simply
    /// stops.
    pub fn on_item_finished(&mut self) {
        if self.mode != PlaybackMode::Sequential {
            return;
        }
        if self.current_index + 1 < self.ordered_ids.len() {
            self.current_index += 1;
        } else {
            self.mode = PlaybackMode::Idle;
            self.current_index = 0;
        }
    }

    /// Should this id be playing right now
    pub fn should_play(&self, content_id: &ContentId) -> bool {
        match self.mode {
            PlaybackMode::Idle => false,
            PlaybackMode::Single => self.ordered_ids.first() == Some(content_id),
            PlaybackMode::Sequential => self.ordered_ids.get(self.current_index) == Some(content_id),
        }
    }

    /// Start again from the first item, keeping the list
    pub fn restart(&mut self) {
        if self.ordered_ids.is_empty() {
            return;
        }
        self.current_index = 0;
        self.mode = Self::mode_for(self.ordered_ids.len());
    }

    /// The id whose turn it is
    pub fn current(&self) -> Option<&ContentId> {
        match self.mode {
            PlaybackMode::Idle => None,
            _ => self.ordered_ids.get(self.current_index),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn ids(&self) -> &[ContentId] {
        &self.ordered_ids
    }

    pub fn contains(&self, content_id: &ContentId) -> bool {
        self.ordered_ids.contains(content_id)
    }
}

/// Coordinates playback across all visible groups
///
/// Every change bumps a revision published on a watch channel so the
/// presentation layer can re-query `should_play` for its cells.
pub struct PlaybackCoordinator {
    groups: Mutex<HashMap<GroupId, PlaybackSequence>>,
    revision_tx: watch::Sender<u64>,
}

impl Default for PlaybackCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            groups: Mutex::new(HashMap::new()),
            revision_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupId, PlaybackSequence>> {
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self) {
        self.revision_tx.send_modify(|revision| *revision += 1);
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Set up (or replace) a group
    pub fn setup(&self, group: &GroupId, ids: Vec<ContentId>) {
        let sequence = PlaybackSequence::new(ids);
        debug!(group = %group, mode = %sequence.mode(), items = sequence.ids().len(), "Group set up");
        self.lock().insert(group.clone(), sequence);
        self.publish();
    }

    /// Report that the group's current item finished
    pub fn on_item_finished(&self, group: &GroupId) -> PlaybackMode {
        let mode = {
            let mut groups = self.lock();
            let Some(sequence) = groups.get_mut(group) else {
                return PlaybackMode::Idle;
            };
            sequence.on_item_finished();
            debug!(group = %group, mode = %sequence.mode(), index = sequence.current_index(), "Item finished");
            sequence.mode()
        };
        self.publish();
        mode
    }

    /// Restart a group that became visible again
    pub fn restart(&self, group: &GroupId) {
        if let Some(sequence) = self.lock().get_mut(group) {
            sequence.restart();
        }
        self.publish();
    }

    /// Should this id play within the given group
    pub fn should_play(&self, group: &GroupId, content_id: &ContentId) -> bool {
        self.lock()
            .get(group)
            .is_some_and(|sequence| sequence.should_play(content_id))
    }

    /// Is this id current in any group
    pub fn is_current(&self, content_id: &ContentId) -> bool {
        self.lock().values().any(|sequence| sequence.should_play(content_id))
    }

    /// Is this id part of any group
    pub fn tracks(&self, content_id: &ContentId) -> bool {
        self.lock().values().any(|sequence| sequence.contains(content_id))
    }

    /// Current id of a group
    pub fn current(&self, group: &GroupId) -> Option<ContentId> {
        self.lock().get(group).and_then(|sequence| sequence.current().cloned())
    }

    /// Copy of a group's state
    pub fn sequence(&self, group: &GroupId) -> Option<PlaybackSequence> {
        self.lock().get(group).cloned()
    }

    /// Forget a group (it scrolled away)
    pub fn remove_group(&self, group: &GroupId) -> Option<PlaybackSequence> {
        let removed = self.lock().remove(group);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub fn group_count(&self) -> usize {
        self.lock().len()
    }
}
