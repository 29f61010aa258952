//! Audio channel handles and handle-indexed maps.
//!
//! Channels (decks, microphones, auxiliaries, the master bus) are
//! identified by small dense indices handed out by [`ChannelRegistry`].
//! Handles are plain `Copy` values so they can cross the control/audio
//! boundary inside queue messages, and [`ChannelMap`] gives O(1)
//! handle-indexed lookup without hashing on the audio thread.

use crate::error::EffectsError;

/// Upper bound on registered channels.
///
/// Engine-side channel maps are pre-sized to this on the control thread,
/// so registering channels never reallocates on the audio thread.
pub const MAX_CHANNELS: usize = 32;

/// Opaque identifier for a registered audio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(usize);

impl ChannelHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Hands out channel handles and remembers their group names.
///
/// Registration happens once at startup, before any chain is enabled for
/// a channel. Duplicate registration of a group is an error.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    groups: Vec<String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            groups: Vec::with_capacity(MAX_CHANNELS),
        }
    }

    /// Register a channel group, returning its handle.
    pub fn register(&mut self, group: &str) -> Result<ChannelHandle, EffectsError> {
        if self.groups.iter().any(|g| g == group) {
            return Err(EffectsError::ChannelAlreadyRegistered(group.to_string()));
        }
        if self.groups.len() >= MAX_CHANNELS {
            return Err(EffectsError::TooManyChannels);
        }
        let handle = ChannelHandle(self.groups.len());
        self.groups.push(group.to_string());
        Ok(handle)
    }

    /// Look up the handle for an already-registered group.
    pub fn handle_for(&self, group: &str) -> Option<ChannelHandle> {
        self.groups.iter().position(|g| g == group).map(ChannelHandle)
    }

    pub fn group_for(&self, handle: ChannelHandle) -> Option<&str> {
        self.groups.get(handle.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = ChannelHandle> + '_ {
        (0..self.groups.len()).map(ChannelHandle)
    }
}

/// A map from [`ChannelHandle`] to `T`, backed by a dense vector.
///
/// Maps that live on the audio thread are created with
/// [`ChannelMap::with_channel_capacity`] on the control thread; inserting
/// within that capacity never allocates.
#[derive(Debug)]
pub struct ChannelMap<T> {
    slots: Vec<Option<T>>,
}

impl<T> ChannelMap<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Create a map pre-filled with `None` for every possible handle.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    #[inline]
    pub fn get(&self, handle: ChannelHandle) -> Option<&T> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: ChannelHandle) -> Option<&mut T> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    #[inline]
    pub fn contains(&self, handle: ChannelHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Insert a value, returning the previous one if present.
    ///
    /// Grows the backing vector if the handle is out of range; maps used
    /// on the audio thread must be pre-sized so this never happens there.
    pub fn insert(&mut self, handle: ChannelHandle, value: T) -> Option<T> {
        if handle.0 >= self.slots.len() {
            self.slots.resize_with(handle.0 + 1, || None);
        }
        self.slots[handle.0].replace(value)
    }

    #[inline]
    pub fn remove(&mut self, handle: ChannelHandle) -> Option<T> {
        self.slots.get_mut(handle.0).and_then(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelHandle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (ChannelHandle(i), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChannelHandle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (ChannelHandle(i), v)))
    }
}

impl<T> Default for ChannelMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ChannelRegistry::new();
        let deck1 = registry.register("[Channel1]").unwrap();
        let deck2 = registry.register("[Channel2]").unwrap();

        assert_ne!(deck1, deck2);
        assert_eq!(registry.handle_for("[Channel1]"), Some(deck1));
        assert_eq!(registry.group_for(deck2), Some("[Channel2]"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ChannelRegistry::new();
        registry.register("[Master]").unwrap();
        assert!(matches!(
            registry.register("[Master]"),
            Err(EffectsError::ChannelAlreadyRegistered(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_channel_map_insert_within_capacity() {
        let mut registry = ChannelRegistry::new();
        let a = registry.register("[Channel1]").unwrap();
        let b = registry.register("[Channel2]").unwrap();

        let mut map: ChannelMap<u32> = ChannelMap::with_channel_capacity(MAX_CHANNELS);
        assert!(map.insert(a, 7).is_none());
        assert_eq!(map.insert(a, 9), Some(7));
        assert_eq!(map.get(a), Some(&9));
        assert!(!map.contains(b));
        assert_eq!(map.remove(a), Some(9));
        assert!(!map.contains(a));
    }
}
