//! Doubly linked lists whose nodes live in an arena and link by slot index.
//!
//! Several lists may share one arena (the SLRU segments do), each `List`
//! only owns its head, tail and length. Removed slots are recycled.

pub(crate) type Idx = usize;

#[derive(Debug)]
struct Slot<T> {
    value: T,
    prev: Option<Idx>,
    next: Option<Idx>,
}

#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Option<Slot<T>>>,
    free_slots: Vec<Idx>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    /// Store `value` unlinked and return its slot.
    pub fn insert(&mut self, value: T) -> Idx {
        let slot = Slot {
            value,
            prev: None,
            next: None,
        };
        match self.free_slots.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Take the value out. The slot must already be unlinked from its list.
    pub fn remove(&mut self, idx: Idx) -> T {
        let slot = self.slots[idx].take().expect("stale arena index");
        debug_assert!(slot.prev.is_none() && slot.next.is_none(), "removing a linked node");
        self.free_slots.push(idx);
        slot.value
    }

    pub fn get(&self, idx: Idx) -> &T {
        &self.slot(idx).value
    }

    pub fn get_mut(&mut self, idx: Idx) -> &mut T {
        &mut self.slot_mut(idx).value
    }

    pub fn prev(&self, idx: Idx) -> Option<Idx> {
        self.slot(idx).prev
    }

    pub fn next(&self, idx: Idx) -> Option<Idx> {
        self.slot(idx).next
    }

    fn slot(&self, idx: Idx) -> &Slot<T> {
        self.slots[idx].as_ref().expect("stale arena index")
    }

    fn slot_mut(&mut self, idx: Idx) -> &mut Slot<T> {
        self.slots[idx].as_mut().expect("stale arena index")
    }
}

/// Head is the most recent end, tail the least recent.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct List {
    head: Option<Idx>,
    tail: Option<Idx>,
    len: usize,
}

impl List {
    pub fn new() -> Self {
        List::default()
    }

    pub fn head(&self) -> Option<Idx> {
        self.head
    }

    pub fn tail(&self) -> Option<Idx> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_front<T>(&mut self, arena: &mut Arena<T>, idx: Idx) {
        match self.head {
            Some(head) => self.link_before(arena, idx, head),
            None => self.link_only(arena, idx),
        }
    }

    pub fn push_back<T>(&mut self, arena: &mut Arena<T>, idx: Idx) {
        match self.tail {
            Some(tail) => self.link_after(arena, idx, tail),
            None => self.link_only(arena, idx),
        }
    }

    pub fn unlink<T>(&mut self, arena: &mut Arena<T>, idx: Idx) {
        let (prev, next) = {
            let slot = arena.slot(idx);
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => arena.slot_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => arena.slot_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let slot = arena.slot_mut(idx);
        slot.prev = None;
        slot.next = None;
        self.len -= 1;
    }

    pub fn move_to_front<T>(&mut self, arena: &mut Arena<T>, idx: Idx) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(arena, idx);
        self.push_front(arena, idx);
    }

    /// Swap with the previous node. False if already at the head.
    pub fn move_toward_head_by_one<T>(&mut self, arena: &mut Arena<T>, idx: Idx) -> bool {
        match arena.prev(idx) {
            Some(prev) => {
                self.unlink(arena, idx);
                self.link_before(arena, idx, prev);
                true
            }
            None => false,
        }
    }

    /// Swap with the next node. False if already at the tail.
    pub fn move_toward_tail_by_one<T>(&mut self, arena: &mut Arena<T>, idx: Idx) -> bool {
        match arena.next(idx) {
            Some(next) => {
                self.unlink(arena, idx);
                self.link_after(arena, idx, next);
                true
            }
            None => false,
        }
    }

    /// Head to tail.
    pub fn iter<'a, T>(&self, arena: &'a Arena<T>) -> Iter<'a, T> {
        Iter {
            arena,
            cur: self.head,
            forward: true,
        }
    }

    /// Tail to head.
    pub fn iter_rev<'a, T>(&self, arena: &'a Arena<T>) -> Iter<'a, T> {
        Iter {
            arena,
            cur: self.tail,
            forward: false,
        }
    }

    fn link_only<T>(&mut self, arena: &mut Arena<T>, idx: Idx) {
        let slot = arena.slot_mut(idx);
        slot.prev = None;
        slot.next = None;
        self.head = Some(idx);
        self.tail = Some(idx);
        self.len += 1;
    }

    fn link_before<T>(&mut self, arena: &mut Arena<T>, idx: Idx, at: Idx) {
        let prev = arena.slot(at).prev;
        {
            let slot = arena.slot_mut(idx);
            slot.prev = prev;
            slot.next = Some(at);
        }
        arena.slot_mut(at).prev = Some(idx);
        match prev {
            Some(p) => arena.slot_mut(p).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.len += 1;
    }

    fn link_after<T>(&mut self, arena: &mut Arena<T>, idx: Idx, at: Idx) {
        let next = arena.slot(at).next;
        {
            let slot = arena.slot_mut(idx);
            slot.prev = Some(at);
            slot.next = next;
        }
        arena.slot_mut(at).next = Some(idx);
        match next {
            Some(n) => arena.slot_mut(n).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.len += 1;
    }
}

pub(crate) struct Iter<'a, T> {
    arena: &'a Arena<T>,
    cur: Option<Idx>,
    forward: bool,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = Idx;

    fn next(&mut self) -> Option<Idx> {
        let idx = self.cur?;
        self.cur = if self.forward {
            self.arena.next(idx)
        } else {
            self.arena.prev(idx)
        };
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &List, arena: &Arena<u32>) -> Vec<u32> {
        list.iter(arena).map(|i| *arena.get(i)).collect()
    }

    fn build(n: u32) -> (List, Arena<u32>, Vec<Idx>) {
        let mut arena = Arena::new();
        let mut list = List::new();
        let idx: Vec<Idx> = (0..n).map(|v| arena.insert(v)).collect();
        for &i in &idx {
            list.push_back(&mut arena, i);
        }
        (list, arena, idx)
    }

    #[test]
    fn push_and_unlink() {
        let (mut list, mut arena, idx) = build(4);
        assert_eq!(values(&list, &arena), vec![0, 1, 2, 3]);
        list.unlink(&mut arena, idx[1]);
        list.unlink(&mut arena, idx[3]);
        assert_eq!(values(&list, &arena), vec![0, 2]);
        assert_eq!(list.tail(), Some(idx[2]));
        assert_eq!(list.len(), 2);
        assert_eq!(arena.remove(idx[3]), 3);
        // slot is recycled
        assert_eq!(arena.insert(9), idx[3]);
    }

    #[test]
    fn move_to_front_relinks() {
        let (mut list, mut arena, idx) = build(3);
        list.move_to_front(&mut arena, idx[2]);
        assert_eq!(values(&list, &arena), vec![2, 0, 1]);
        let rev: Vec<u32> = list.iter_rev(&arena).map(|i| *arena.get(i)).collect();
        assert_eq!(rev, vec![1, 0, 2]);
    }

    #[test]
    fn shift_by_one() {
        let (mut list, mut arena, idx) = build(4);
        assert!(list.move_toward_head_by_one(&mut arena, idx[2]));
        assert_eq!(values(&list, &arena), vec![0, 2, 1, 3]);
        assert!(list.move_toward_tail_by_one(&mut arena, idx[0]));
        assert_eq!(values(&list, &arena), vec![2, 0, 1, 3]);
        assert!(!list.move_toward_head_by_one(&mut arena, idx[2]));
        assert!(!list.move_toward_tail_by_one(&mut arena, idx[3]));
        assert!(list.move_toward_tail_by_one(&mut arena, idx[1]));
        assert_eq!(values(&list, &arena), vec![2, 0, 3, 1]);
        assert_eq!(list.tail(), Some(idx[1]));
        assert_eq!(list.head(), Some(idx[2]));
    }
}
