//! Clip registry — holds loaded clips by name, resolved late by the blend queue.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::clip::Clip;

/// Registry of loaded clips. A clip referenced by name before it has loaded
/// simply isn't found by `resolve`; the blend queue skips it for that frame
/// rather than stalling.
///
/// The store is shared read-only across controllers behind one `RwLock` (see
/// `Controller::clip_store`), so the "warned once" bookkeeping for
/// [`resolve`](Self::resolve) lives behind its own `Mutex` rather than
/// requiring a write lock on the whole store just to log a missing name.
pub struct ClipStore {
    clips: HashMap<String, Clip>,
    /// Names already reported missing, so the "clip unresolved" warning fires
    /// once per name rather than every frame. Spec §7: resolution errors are
    /// soft and reported once per (state, clip) pair until resolved; this
    /// store only has names to key on, so it dedupes per clip name instead.
    warned_missing: Mutex<HashSet<String>>,
}

impl Default for ClipStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipStore {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            warned_missing: Mutex::new(HashSet::new()),
        }
    }

    /// Register a clip. Overwrites any existing clip with the same name.
    pub fn add(&mut self, clip: Clip) {
        self.warned_missing.lock().expect("clip store warn-set poisoned").remove(&clip.name);
        self.clips.insert(clip.name.clone(), clip);
    }

    pub fn get(&self, name: &str) -> Option<&Clip> {
        self.clips.get(name)
    }

    /// Look up a clip, printing a one-time warning the first time `name` is
    /// requested and not found. This is what the blend queue calls each
    /// frame when sampling active clips.
    pub fn resolve(&self, name: &str) -> Option<&Clip> {
        if let Some(clip) = self.clips.get(name) {
            return Some(clip);
        }
        let mut warned = self.warned_missing.lock().expect("clip store warn-set poisoned");
        if warned.insert(name.to_string()) {
            println!("{}", flint_core::FlintError::ClipUnresolved(name.to_string()));
        }
        None
    }

    pub fn has(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;

    fn dummy_clip(name: &str) -> Clip {
        Clip {
            name: name.into(),
            ticks_per_second: 25.0,
            duration_ticks: 25.0,
            key_times: vec![],
            node_tracks: vec![],
            num_non_bones: 0,
        }
    }

    #[test]
    fn add_then_get_round_trips() {
        let mut store = ClipStore::new();
        store.add(dummy_clip("walk"));
        assert!(store.has("walk"));
        assert_eq!(store.get("walk").unwrap().name, "walk");
    }

    #[test]
    fn resolve_missing_clip_returns_none() {
        let store = ClipStore::new();
        assert!(store.resolve("missing").is_none());
        // second lookup should not panic or double-insert
        assert!(store.resolve("missing").is_none());
    }
}
