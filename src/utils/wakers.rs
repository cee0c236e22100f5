use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Wake, Waker};

use fixedbitset::FixedBitSet;

/// Tracks which child slots are "ready" and should be polled.
#[derive(Debug)]
pub(crate) struct ReadinessVec {
    ready_count: usize,
    max_count: usize,
    readiness_list: FixedBitSet,
    parent_waker: Option<Waker>,
}

impl ReadinessVec {
    fn new(len: usize) -> Self {
        let mut readiness_list = FixedBitSet::with_capacity(len);
        readiness_list.set_range(.., true);
        Self {
            ready_count: len,
            max_count: len,
            readiness_list,
            parent_waker: None,
        }
    }

    /// Set the ready state to `true` for the given index. Returns the old
    /// ready state.
    pub(crate) fn set_ready(&mut self, index: usize) -> bool {
        if !self.readiness_list[index] {
            self.ready_count += 1;
            self.readiness_list.set(index, true);
            false
        } else {
            true
        }
    }

    /// Set the ready state to `false` for the given index. Returns whether
    /// the slot was previously ready.
    pub(crate) fn clear_ready(&mut self, index: usize) -> bool {
        if self.readiness_list[index] {
            self.ready_count -= 1;
            self.readiness_list.set(index, false);
            true
        } else {
            false
        }
    }

    /// Returns `true` if any slot is ready.
    pub(crate) fn any_ready(&self) -> bool {
        self.ready_count > 0
    }

    /// Iterate over the ready slot indices.
    pub(crate) fn awake(&self) -> impl Iterator<Item = usize> + '_ {
        self.readiness_list.ones()
    }

    /// Set the parent `Waker`. This needs to be called at the start of
    /// every `poll` function.
    pub(crate) fn set_waker(&mut self, parent_waker: &Waker) {
        match &mut self.parent_waker {
            Some(prev) => prev.clone_from(parent_waker),
            None => self.parent_waker = Some(parent_waker.clone()),
        }
    }

    /// Grow to `len` slots; new slots start out ready.
    fn resize(&mut self, len: usize) {
        if len <= self.max_count {
            return;
        }
        self.readiness_list.grow(len);
        self.readiness_list.set_range(self.max_count..len, true);
        self.ready_count += len - self.max_count;
        self.max_count = len;
    }

    fn wake(&mut self, index: usize) {
        if !self.set_ready(index) {
            if let Some(parent) = &self.parent_waker {
                parent.wake_by_ref();
            }
        }
    }
}

/// A collection of wakers, one per child slot, routing wakes into a shared
/// [`ReadinessVec`] and on to the parent waker.
#[derive(Debug)]
pub(crate) struct WakerVec {
    readiness: Arc<Mutex<ReadinessVec>>,
    wakers: Vec<Waker>,
}

struct SlotWaker {
    index: usize,
    readiness: Arc<Mutex<ReadinessVec>>,
}

impl Wake for SlotWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.readiness.lock().unwrap().wake(self.index);
    }
}

impl WakerVec {
    /// Create a new instance with `len` slots, all initially ready.
    pub(crate) fn new(len: usize) -> Self {
        let readiness = Arc::new(Mutex::new(ReadinessVec::new(len)));
        let wakers = (0..len).map(|index| slot_waker(index, &readiness)).collect();
        Self { readiness, wakers }
    }

    /// The waker for the given slot.
    pub(crate) fn get(&self, index: usize) -> Option<&Waker> {
        self.wakers.get(index)
    }

    /// Access the readiness tracker.
    pub(crate) fn readiness(&self) -> MutexGuard<'_, ReadinessVec> {
        self.readiness.lock().unwrap()
    }

    /// Grow to at least `len` slots; new slots start out ready.
    pub(crate) fn resize(&mut self, len: usize) {
        self.readiness.lock().unwrap().resize(len);
        while self.wakers.len() < len {
            let index = self.wakers.len();
            self.wakers.push(slot_waker(index, &self.readiness));
        }
    }
}

fn slot_waker(index: usize, readiness: &Arc<Mutex<ReadinessVec>>) -> Waker {
    Waker::from(Arc::new(SlotWaker {
        index,
        readiness: Arc::clone(readiness),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_ready() {
        let wakers = WakerVec::new(3);
        let readiness = wakers.readiness();
        assert!(readiness.any_ready());
        assert_eq!(readiness.awake().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn clear_and_wake_round_trip() {
        let wakers = WakerVec::new(2);
        wakers.readiness().clear_ready(0);
        wakers.readiness().clear_ready(1);
        assert!(!wakers.readiness().any_ready());

        wakers.get(1).unwrap().wake_by_ref();
        assert!(wakers.readiness().any_ready());
        assert_eq!(wakers.readiness().awake().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn resize_marks_new_slots_ready() {
        let mut wakers = WakerVec::new(1);
        wakers.readiness().clear_ready(0);
        wakers.resize(3);
        assert_eq!(wakers.readiness().awake().collect::<Vec<_>>(), vec![1, 2]);
    }
}
