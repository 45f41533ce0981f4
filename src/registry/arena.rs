//! Generation-checked slot arena backing device and stream handles

/// Index plus generation of an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slots are reused after removal with a bumped generation, so a key from a
/// removed entry never resolves to its successor.
#[derive(Debug)]
pub struct HandleArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0 }
    }
}

impl<T> HandleArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> SlotKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return SlotKey { index, generation: slot.generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        SlotKey { index, generation: 0 }
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (SlotKey { index: index as u32, generation: slot.generation }, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn removed_key_is_stale_after_reuse() {
        let mut arena = HandleArena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));

        let b = arena.insert("b");
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.remove(a), None);
    }

    #[test]
    fn double_remove_is_noop() {
        let mut arena = HandleArena::new();
        let key = arena.insert(1);
        assert_eq!(arena.remove(key), Some(1));
        assert_eq!(arena.remove(key), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn iter_lists_live_entries() {
        let mut arena = HandleArena::new();
        let a = arena.insert(10);
        let b = arena.insert(20);
        arena.insert(30);
        arena.remove(b);
        if let Some(value) = arena.get_mut(a) {
            *value += 1;
        }

        let values: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![11, 30]);
        assert_eq!(arena.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_only_live_keys_resolve(ops in prop::collection::vec(any::<bool>(), 1..64)) {
            let mut arena = HandleArena::new();
            let mut live = Vec::new();
            let mut dead = Vec::new();

            for (i, insert) in ops.into_iter().enumerate() {
                if insert || live.is_empty() {
                    live.push(arena.insert(i));
                } else {
                    let key = live.remove(0);
                    prop_assert!(arena.remove(key).is_some());
                    dead.push(key);
                }
            }

            prop_assert_eq!(arena.len(), live.len());
            for key in &live {
                prop_assert!(arena.contains(*key));
            }
            for key in &dead {
                prop_assert!(!arena.contains(*key));
            }
        }
    }
}
