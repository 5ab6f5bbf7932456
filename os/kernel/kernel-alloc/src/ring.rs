//! Fixed-capacity circular queue of [`Extent`]s with in-place compaction.

use crate::extent::Extent;

/// Depth bound for the quicksort work stack; the larger partition is always
/// deferred, so depth never exceeds `log2(len)`.
const SORT_STACK_DEPTH: usize = usize::BITS as usize;

/// The ring is full.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingFull;

/// A circular buffer of extents over caller-provided storage.
///
/// # Invariants
/// - Live entries occupy logical indices `0..len`, physically
///   `(head + i) % capacity`.
/// - `len <= capacity`.
/// - Slots outside the live range hold stale values and are never read.
pub struct ExtentRing<'a> {
    slots: &'a mut [Extent],
    head: usize,
    len: usize,
}

impl<'a> ExtentRing<'a> {
    /// Wraps `slots` as an empty ring. Existing slot contents are ignored.
    pub const fn new(slots: &'a mut [Extent]) -> Self {
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    #[inline]
    const fn phys(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }

    #[inline]
    fn get(&self, logical: usize) -> Extent {
        self.slots[self.phys(logical)]
    }

    #[inline]
    fn set(&mut self, logical: usize, e: Extent) {
        let p = self.phys(logical);
        self.slots[p] = e;
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        let (pa, pb) = (self.phys(a), self.phys(b));
        self.slots.swap(pa, pb);
    }

    /// Appends at the tail.
    ///
    /// # Errors
    /// [`RingFull`] if no slot is free.
    pub fn push_back(&mut self, e: Extent) -> Result<(), RingFull> {
        if self.is_full() {
            return Err(RingFull);
        }
        self.len += 1;
        self.set(self.len - 1, e);
        Ok(())
    }

    /// Prepends at the head, so the next [`pop_front`](Self::pop_front) returns `e`.
    ///
    /// # Errors
    /// [`RingFull`] if no slot is free.
    pub fn push_front(&mut self, e: Extent) -> Result<(), RingFull> {
        if self.is_full() {
            return Err(RingFull);
        }
        let cap = self.slots.len();
        self.head = (self.head + cap - 1) % cap;
        self.len += 1;
        self.set(0, e);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<Extent> {
        if self.len == 0 {
            return None;
        }
        let e = self.get(0);
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        Some(e)
    }

    /// Live entries in dequeue order.
    pub fn iter(&self) -> impl Iterator<Item = Extent> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Sorts the live range by base address and merges adjacent runs.
    ///
    /// Merged entries are packed toward the tail; `head` advances past the
    /// cells they vacate. Returns the number of entries removed.
    pub fn compact(&mut self) -> usize {
        if self.len < 2 {
            return 0;
        }
        self.sort_by_base();
        self.merge_adjacent()
    }

    /// Iterative quicksort over logical indices, median-of-three Hoare partition.
    fn sort_by_base(&mut self) {
        let mut stack = [(0usize, 0usize); SORT_STACK_DEPTH];
        let mut top = 0;
        let (mut lo, mut hi) = (0, self.len - 1);

        loop {
            while lo < hi {
                let p = self.partition(lo, hi);
                // Continue with the smaller side, defer the larger one.
                if p - lo < hi - p {
                    stack[top] = (p + 1, hi);
                    hi = p;
                } else {
                    stack[top] = (lo, p);
                    lo = p + 1;
                }
                top += 1;
            }

            if top == 0 {
                break;
            }
            top -= 1;
            (lo, hi) = stack[top];
        }
    }

    /// Partitions `[lo, hi]` and returns `j` with `lo <= j < hi` such that
    /// every key in `[lo, j]` is `<=` every key in `[j + 1, hi]`.
    fn partition(&mut self, lo: usize, hi: usize) -> usize {
        let mid = lo + (hi - lo) / 2;
        if self.get(mid).base() < self.get(lo).base() {
            self.swap(mid, lo);
        }
        if self.get(hi).base() < self.get(lo).base() {
            self.swap(hi, lo);
        }
        if self.get(hi).base() < self.get(mid).base() {
            self.swap(hi, mid);
        }
        let pivot = self.get(mid).base();

        let (mut i, mut j) = (lo, hi);
        loop {
            while self.get(i).base() < pivot {
                i += 1;
            }
            while self.get(j).base() > pivot {
                j -= 1;
            }
            if i >= j {
                return j;
            }
            self.swap(i, j);
            i += 1;
            j -= 1;
        }
    }

    /// Backward pass over a sorted live range: `w` is the accumulating
    /// survivor, `r` walks down toward the head.
    fn merge_adjacent(&mut self) -> usize {
        let mut w = self.len - 1;
        for r in (0..self.len - 1).rev() {
            let lower = self.get(r);
            if let Some(joined) = lower.merged(self.get(w)) {
                self.set(w, joined);
            } else {
                w -= 1;
                self.set(w, lower);
            }
        }

        // Survivors occupy logical [w, len).
        self.head = self.phys(w);
        self.len -= w;
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::MAX_PAGES;

    fn e(base: u64, pages: u64) -> Extent {
        Extent::from_parts(base, pages)
    }

    fn live(ring: &ExtentRing<'_>) -> Vec<(u64, u64)> {
        ring.iter().map(|x| (x.base(), x.pages())).collect()
    }

    #[test]
    fn fifo_with_wraparound() {
        let mut slots = [Extent::new(); 3];
        let mut ring = ExtentRing::new(&mut slots);

        for i in 0..3 {
            ring.push_back(e(i * 0x1000, 1)).unwrap();
        }
        assert_eq!(ring.push_back(e(0x9000, 1)), Err(RingFull));

        assert_eq!(ring.pop_front().map(|x| x.base()), Some(0x0));
        ring.push_back(e(0x3000, 1)).unwrap();
        assert_eq!(live(&ring), vec![(0x1000, 1), (0x2000, 1), (0x3000, 1)]);
    }

    #[test]
    fn push_front_is_next_out() {
        let mut slots = [Extent::new(); 4];
        let mut ring = ExtentRing::new(&mut slots);
        ring.push_back(e(0x1000, 1)).unwrap();
        ring.push_front(e(0x5000, 2)).unwrap();
        assert_eq!(ring.pop_front(), Some(e(0x5000, 2)));
        assert_eq!(ring.pop_front(), Some(e(0x1000, 1)));
        assert_eq!(ring.pop_front(), None);
    }

    #[test]
    fn zero_capacity_ring_rejects_everything() {
        let mut ring = ExtentRing::new(&mut []);
        assert_eq!(ring.push_back(e(0, 1)), Err(RingFull));
        assert_eq!(ring.push_front(e(0, 1)), Err(RingFull));
        assert_eq!(ring.pop_front(), None);
        assert_eq!(ring.compact(), 0);
    }

    #[test]
    fn compact_sorts_across_the_wrap_point() {
        let mut slots = [Extent::new(); 5];
        let mut ring = ExtentRing::new(&mut slots);
        // Move head to the middle so the live range wraps.
        for _ in 0..3 {
            ring.push_back(e(0xF000_0000, 1)).unwrap();
            ring.pop_front();
        }
        for base in [0x9000, 0x1000, 0x7000, 0x3000, 0x5000] {
            ring.push_back(e(base, 1)).unwrap();
        }

        assert_eq!(ring.compact(), 0);
        assert_eq!(
            live(&ring),
            vec![(0x1000, 1), (0x3000, 1), (0x5000, 1), (0x7000, 1), (0x9000, 1)]
        );
    }

    #[test]
    fn compact_merges_runs_and_frees_head_slots() {
        let mut slots = [Extent::new(); 8];
        let mut ring = ExtentRing::new(&mut slots);
        for (base, pages) in [(0x4000, 2), (0x20000, 1), (0x0, 4), (0x6000, 1), (0x21000, 3)] {
            ring.push_back(e(base, pages)).unwrap();
        }

        assert_eq!(ring.compact(), 3);
        assert_eq!(live(&ring), vec![(0x0, 7), (0x20000, 4)]);
        assert_eq!(ring.len(), 2);

        // Vacated cells are usable again.
        for i in 0..6 {
            ring.push_back(e(0x100_0000 + i * 0x10000, 1)).unwrap();
        }
        assert!(ring.is_full());
    }

    #[test]
    fn compact_respects_the_count_limit() {
        let mut slots = [Extent::new(); 4];
        let mut ring = ExtentRing::new(&mut slots);
        let big = e(0, MAX_PAGES);
        ring.push_back(e(big.end(), 2)).unwrap();
        ring.push_back(big).unwrap();

        assert_eq!(ring.compact(), 0);
        assert_eq!(live(&ring), vec![(0, MAX_PAGES), (big.end(), 2)]);
    }

    #[test]
    fn compact_is_idempotent() {
        let mut slots = [Extent::new(); 16];
        let mut ring = ExtentRing::new(&mut slots);
        let bases = [13u64, 2, 7, 3, 11, 1, 8, 12, 5, 0, 9];
        for b in bases {
            ring.push_back(e(b * 0x1000, 1)).unwrap();
        }

        ring.compact();
        let once = live(&ring);
        ring.compact();
        assert_eq!(live(&ring), once);
        assert_eq!(once, vec![(0, 4), (0x5000, 1), (0x7000, 3), (0xB000, 3)]);
    }

    #[test]
    fn sort_handles_many_entries_in_reverse_order() {
        let mut slots = vec![Extent::new(); 257];
        let mut ring = ExtentRing::new(&mut slots);
        for i in (0..257u64).rev() {
            // Gaps keep them from merging.
            ring.push_back(e(i * 0x2000, 1)).unwrap();
        }
        ring.compact();
        let bases: Vec<u64> = ring.iter().map(|x| x.base()).collect();
        assert!(bases.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(bases.len(), 257);
    }
}
