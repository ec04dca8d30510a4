use std::fmt::{Display, Formatter};

/// A generational handle into an [`Arena`]. A handle outlives the value it points to: once the slot is freed the
/// handle resolves to `None`, even if the slot was reused since.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle {
    index: u32,
    epoch: u32,
}

impl EventHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl Display for EventHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.index, self.epoch)
    }
}

struct Slot<T> {
    epoch: u32,
    value: Option<T>,
}

/// Slot storage with generational handles and free slot reuse
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0 }
    }

    pub fn insert(&mut self, value: T) -> EventHandle {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                EventHandle { index, epoch: slot.epoch }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { epoch: 0, value: Some(value) });
                EventHandle { index, epoch: 0 }
            }
        }
    }

    pub fn get(&self, handle: EventHandle) -> Option<&T> {
        match self.slots.get(handle.index()) {
            Some(slot) if slot.epoch == handle.epoch => slot.value.as_ref(),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: EventHandle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index()) {
            Some(slot) if slot.epoch == handle.epoch => slot.value.as_mut(),
            _ => None,
        }
    }

    pub fn contains(&self, handle: EventHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Frees the slot of `handle`. Removing a stale handle is a no-op returning `None`.
    pub fn remove(&mut self, handle: EventHandle) -> Option<T> {
        let slot = match self.slots.get_mut(handle.index()) {
            Some(slot) if slot.epoch == handle.epoch => slot,
            _ => return None,
        };
        let value = slot.value.take()?;
        slot.epoch = slot.epoch.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Frees all slots. Every handle issued so far becomes stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.value.take().is_some() {
                slot.epoch = slot.epoch.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventHandle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.value.as_ref().map(|v| (EventHandle { index: index as u32, epoch: slot.epoch }, v)))
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handles() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        assert!(arena.get(a).is_none());

        // The freed slot is reused under a new epoch
        let c = arena.insert("c");
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut arena = Arena::new();
        let handles = (0..5).map(|i| arena.insert(i)).collect::<Vec<_>>();
        arena.remove(handles[2]);
        arena.clear();
        assert!(arena.is_empty());
        assert!(handles.iter().all(|&h| !arena.contains(h)));
        assert_eq!(arena.iter().count(), 0);

        let h = arena.insert(10);
        assert_eq!(h.index(), 0);
        assert!(!handles.contains(&h));
        assert_eq!(arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![10]);
    }
}
