//! Capture group updates attached to automaton transitions.

use std::ops::Range;

use fixedbitset::FixedBitSet;

/// Marker for an unset entry in a capture array.
pub const NO_POSITION: usize = usize::MAX;

/// Marker for an unset entry in a relative capture array.
pub const NO_OFFSET: u32 = u32::MAX;

/// The capture group starts and ends written or cleared by one transition.
///
/// Capture arrays hold the start of group `g` at `2 * g` and its end at
/// `2 * g + 1`. For each half of a group at most one of "updated" and
/// "cleared" is set; the later operation along a path wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupBoundaries {
    start_updated: FixedBitSet,
    end_updated: FixedBitSet,
    start_cleared: FixedBitSet,
    end_cleared: FixedBitSet,
}

fn override_with(set: &mut FixedBitSet, clear: &FixedBitSet, insert: &FixedBitSet) {
    for g in clear.ones() {
        set.set(g, false);
    }
    set.union_with(insert);
}

impl GroupBoundaries {
    pub fn new(groups: usize) -> Self {
        Self {
            start_updated: FixedBitSet::with_capacity(groups),
            end_updated: FixedBitSet::with_capacity(groups),
            start_cleared: FixedBitSet::with_capacity(groups),
            end_cleared: FixedBitSet::with_capacity(groups),
        }
    }

    pub fn update_start(&mut self, group: usize) {
        self.start_updated.insert(group);
        self.start_cleared.set(group, false);
    }

    pub fn update_end(&mut self, group: usize) {
        self.end_updated.insert(group);
        self.end_cleared.set(group, false);
    }

    /// Reset both halves of every group in `groups`.
    pub fn clear(&mut self, groups: Range<usize>) {
        for g in groups {
            self.start_cleared.insert(g);
            self.end_cleared.insert(g);
            self.start_updated.set(g, false);
            self.end_updated.set(g, false);
        }
    }

    /// Apply the operations of `other` after those of `self`.
    pub fn merge(&mut self, other: &GroupBoundaries) {
        override_with(&mut self.start_updated, &other.start_cleared, &other.start_updated);
        override_with(&mut self.end_updated, &other.end_cleared, &other.end_updated);
        override_with(&mut self.start_cleared, &other.start_updated, &other.start_cleared);
        override_with(&mut self.end_cleared, &other.end_updated, &other.end_cleared);
    }

    pub fn is_empty(&self) -> bool {
        [
            &self.start_updated,
            &self.end_updated,
            &self.start_cleared,
            &self.end_cleared,
        ]
        .iter()
        .all(|set| set.ones().next().is_none())
    }

    pub fn start_updated(&self, group: usize) -> bool {
        self.start_updated.contains(group)
    }

    pub fn end_updated(&self, group: usize) -> bool {
        self.end_updated.contains(group)
    }

    pub fn start_cleared(&self, group: usize) -> bool {
        self.start_cleared.contains(group)
    }

    pub fn end_cleared(&self, group: usize) -> bool {
        self.end_cleared.contains(group)
    }

    /// Write `position` into updated entries and reset cleared ones.
    pub fn apply(&self, captures: &mut [usize], position: usize) {
        for g in self.start_cleared.ones() {
            captures[2 * g] = NO_POSITION;
        }
        for g in self.end_cleared.ones() {
            captures[2 * g + 1] = NO_POSITION;
        }
        for g in self.start_updated.ones() {
            captures[2 * g] = position;
        }
        for g in self.end_updated.ones() {
            captures[2 * g + 1] = position;
        }
    }

    /// Like [`apply`](Self::apply) for captures stored as distances back from
    /// the current position.
    pub fn apply_relative(&self, captures: &mut [u32]) {
        for g in self.start_cleared.ones() {
            captures[2 * g] = NO_OFFSET;
        }
        for g in self.end_cleared.ones() {
            captures[2 * g + 1] = NO_OFFSET;
        }
        for g in self.start_updated.ones() {
            captures[2 * g] = 0;
        }
        for g in self.end_updated.ones() {
            captures[2 * g + 1] = 0;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn last_operation_wins() {
        let mut b = GroupBoundaries::new(3);
        b.update_start(1);
        b.update_end(1);
        b.clear(1..3);
        assert!(!b.start_updated(1));
        assert!(b.start_cleared(1) && b.end_cleared(2));
        b.update_start(2);
        assert!(b.start_updated(2) && !b.start_cleared(2));
        assert!(b.end_cleared(2));
    }

    #[test]
    fn merge() {
        let mut first = GroupBoundaries::new(3);
        first.update_start(0);
        first.clear(1..3);

        let mut second = GroupBoundaries::new(3);
        second.update_start(1);
        second.update_end(1);
        second.update_end(0);

        first.merge(&second);
        assert!(first.start_updated(0) && first.end_updated(0));
        assert!(first.start_updated(1) && first.end_updated(1));
        assert!(!first.start_cleared(1) && !first.end_cleared(1));
        assert!(first.start_cleared(2) && first.end_cleared(2));

        let mut clearing = GroupBoundaries::new(3);
        clearing.clear(0..1);
        first.merge(&clearing);
        assert!(!first.start_updated(0) && first.start_cleared(0));
    }

    #[test]
    fn apply() {
        let mut b = GroupBoundaries::new(2);
        assert!(b.is_empty());
        b.update_start(0);
        b.clear(1..2);
        let mut captures = vec![NO_POSITION, NO_POSITION, 3, 4];
        b.apply(&mut captures, 7);
        assert_eq!(captures, vec![7, NO_POSITION, NO_POSITION, NO_POSITION]);

        let mut relative = vec![NO_OFFSET, 5, 2, 1];
        b.apply_relative(&mut relative);
        assert_eq!(relative, vec![0, 5, NO_OFFSET, NO_OFFSET]);
    }
}
