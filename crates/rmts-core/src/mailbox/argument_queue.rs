//! Fixed-capacity ring of argument copies.
//!
//! Each queued write command of an end-user clone owns one ring. The
//! mailbox entry only records the slot index; the slot is recycled when
//! the entry executes or is abandoned.

use serde_json::Value;

#[derive(Debug)]
pub(crate) struct ArgumentQueue {
    slots: Vec<Option<Value>>,
    head: usize,
    len: usize,
}

impl ArgumentQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Copies `value` into the next free slot, or returns it back when full.
    pub(crate) fn push(&mut self, value: Value) -> Result<usize, Value> {
        if self.len == self.capacity() {
            return Err(value);
        }
        let slot = (self.head + self.len) % self.capacity();
        self.slots[slot] = Some(value);
        self.len += 1;
        Ok(slot)
    }

    /// Takes the argument in `slot`, recycling it.
    ///
    /// Entries of one command are consumed in FIFO order, so `slot` is the
    /// head of the ring.
    pub(crate) fn take(&mut self, slot: usize) -> Option<Value> {
        debug_assert_eq!(slot, self.head, "argument slots are consumed in order");
        let value = self.slots.get_mut(slot)?.take()?;
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_until_full() {
        let mut queue = ArgumentQueue::new(2);
        assert_eq!(queue.push(json!(1)), Ok(0));
        assert_eq!(queue.push(json!(2)), Ok(1));
        assert_eq!(queue.push(json!(3)), Err(json!(3)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn slots_wrap_around() {
        let mut queue = ArgumentQueue::new(2);
        let a = queue.push(json!("a")).expect("slot a");
        let b = queue.push(json!("b")).expect("slot b");
        assert_eq!(queue.take(a), Some(json!("a")));
        let c = queue.push(json!("c")).expect("slot c");
        assert_eq!(c, 0);
        assert_eq!(queue.take(b), Some(json!("b")));
        assert_eq!(queue.take(c), Some(json!("c")));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn clear_recycles_everything() {
        let mut queue = ArgumentQueue::new(3);
        queue.push(json!(1)).expect("slot");
        queue.push(json!(2)).expect("slot");
        queue.clear();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.push(json!(9)), Ok(0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(ArgumentQueue::new(0).capacity(), 1);
    }
}
