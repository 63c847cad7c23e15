//! Precomputed match results for patterns without loops.
//!
//! When no group loops, every thread of the DFA lives for a bounded number
//! of steps, so its captures can be kept in the DFA state itself as
//! distances back from the current position. Each accepting transition then
//! names one entry of a small result table and matching needs no capture
//! arrays at all.

use indexmap::IndexSet;

use crate::boundaries::{GroupBoundaries, NO_OFFSET, NO_POSITION};
use crate::error::{Bailout, Limit, Stage};

/// Result index meaning "no result".
pub const NO_RESULT: u8 = u8::MAX;

/// Captures of one thread, relative to the current position.
pub type RelativeCaptures = Box<[u32]>;

#[derive(Debug, Clone)]
pub struct TraceFinder {
    groups: usize,
    max_results: usize,
    results: IndexSet<RelativeCaptures>,
}

impl TraceFinder {
    pub fn new(groups: usize, max_results: usize) -> Self {
        Self {
            groups,
            max_results: max_results.min(NO_RESULT as usize),
            results: IndexSet::new(),
        }
    }

    /// Captures of a thread that has not entered any group.
    pub fn fresh(&self) -> RelativeCaptures {
        vec![NO_OFFSET; 2 * self.groups].into_boxed_slice()
    }

    /// Captures after applying `boundaries` and consuming one character.
    pub fn advance(&self, captures: &[u32], boundaries: &GroupBoundaries) -> RelativeCaptures {
        let mut next = captures.to_vec();
        boundaries.apply_relative(&mut next);
        for offset in next.iter_mut().filter(|o| **o != NO_OFFSET) {
            *offset += 1;
        }
        next.into_boxed_slice()
    }

    /// Index of the result a thread with `captures` produces when it accepts
    /// through `boundaries`.
    pub fn result(
        &mut self,
        captures: &[u32],
        boundaries: &GroupBoundaries,
    ) -> Result<u8, Bailout> {
        let mut result = captures.to_vec();
        boundaries.apply_relative(&mut result);
        let result = result.into_boxed_slice();
        if let Some(index) = self.results.get_index_of(&result) {
            return Ok(index as u8);
        }
        if self.results.len() >= self.max_results {
            return Err(Bailout::limit(
                Stage::TraceFinder,
                Limit::TraceFinderMaxResults,
            ));
        }
        let (index, _) = self.results.insert_full(result);
        Ok(index as u8)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> Vec<RelativeCaptures> {
        self.results.into_iter().collect()
    }
}

/// Absolute capture positions of `result` for a match ending at `position`.
pub fn resolve(result: &[u32], position: usize) -> Vec<usize> {
    result
        .iter()
        .map(|&offset| match offset {
            NO_OFFSET => NO_POSITION,
            offset => position - offset as usize,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn advance_and_resolve() {
        let finder = TraceFinder::new(2, 10);
        let mut enter = GroupBoundaries::new(2);
        enter.update_start(0);
        enter.update_start(1);
        let captures = finder.advance(&finder.fresh(), &enter);
        assert_eq!(&*captures, &[1, NO_OFFSET, 1, NO_OFFSET]);

        let mut exit = GroupBoundaries::new(2);
        exit.update_end(1);
        let captures = finder.advance(&captures, &exit);
        assert_eq!(&*captures, &[2, NO_OFFSET, 2, 1]);

        assert_eq!(
            resolve(&[2, 0, 2, 1], 7),
            vec![5, 7, 5, 6]
        );
        assert_eq!(resolve(&[NO_OFFSET, NO_OFFSET], 3), vec![NO_POSITION, NO_POSITION]);
    }

    #[test]
    fn result_budget() {
        let mut finder = TraceFinder::new(1, 2);
        let mut done = GroupBoundaries::new(1);
        done.update_end(0);
        assert_eq!(finder.result(&[1, NO_OFFSET], &done), Ok(0));
        assert_eq!(finder.result(&[2, NO_OFFSET], &done), Ok(1));
        assert_eq!(finder.result(&[1, NO_OFFSET], &done), Ok(0));
        assert_eq!(
            finder.result(&[3, NO_OFFSET], &done),
            Err(Bailout::limit(Stage::TraceFinder, Limit::TraceFinderMaxResults))
        );
        assert_eq!(finder.len(), 2);
    }
}
