//! Node splitting: make every loop of the DFA single-entry.
//!
//! A strongly connected component entered from more than one state is
//! duplicated once per extra entry, and the outside edges into that entry
//! are moved to the copy. Components are then searched again inside each
//! loop with its header removed, until the control flow graph is reducible.
//! Cloning a state is always safe since its behavior only depends on the
//! state itself.
//!
//! Every pass clones all the multi-entry components it finds. Components
//! found in one pass are disjoint, so their entries stay valid while the
//! others are cloned.

use fixedbitset::FixedBitSet;
use log::{debug, trace};

use crate::dfa::{Dfa, DfaState, StateId, DEAD};
use crate::error::{Bailout, Limit, Stage};

/// Edges and states visited per state of the size budget, summed over all
/// passes.
const WORK_PER_STATE: usize = 256;

fn too_large() -> Bailout {
    Bailout::limit(Stage::NodeSplitter, Limit::MaxDfaSizeAfterSplitting)
}

pub struct NodeSplitter {
    states: Vec<DfaState>,
    roots: [StateId; 2],
    max_states: usize,
    max_work: usize,
    work: usize,
    passes: usize,
}

impl NodeSplitter {
    pub fn new(dfa: &Dfa, max_states: usize) -> Self {
        Self {
            states: dfa.states.clone(),
            roots: dfa.roots(),
            max_states,
            max_work: max_states.saturating_mul(WORK_PER_STATE),
            work: 0,
            passes: 0,
        }
    }

    /// Returns a copy of `dfa` with a reducible transition graph.
    pub fn split(mut self, dfa: &Dfa) -> Result<Dfa, Bailout> {
        let before = self.states.len();
        self.run()?;
        debug!(
            "node splitting: {before} -> {} states in {} passes, work {}",
            self.states.len(),
            self.passes,
            self.work
        );
        let [root_start, root_mid] = self.roots;
        Ok(Dfa {
            states: self.states,
            root_start,
            root_mid,
            ..dfa.clone()
        })
    }

    fn run(&mut self) -> Result<(), Bailout> {
        while self.split_pass()? {
            self.passes += 1;
            self.collect_garbage()?;
            if self.states.len() > self.max_states {
                return Err(too_large());
            }
        }
        Ok(())
    }

    fn charge(&mut self, work: usize) -> Result<(), Bailout> {
        self.work = self.work.saturating_add(work);
        if self.work > self.max_work {
            return Err(too_large());
        }
        Ok(())
    }

    fn edge_count(&self) -> usize {
        self.states.iter().map(|s| s.transitions.len() + 1).sum()
    }

    fn predecessors(&self) -> Vec<Vec<StateId>> {
        let mut preds = vec![Vec::new(); self.states.len()];
        for (id, state) in self.states.iter().enumerate() {
            for succ in state.successors() {
                preds[succ].push(id);
            }
        }
        preds
    }

    /// Clones every multi-entry component reachable through the nested
    /// regions, skipping the regions inside components cloned in the same
    /// pass. Returns false if the graph is already reducible.
    fn split_pass(&mut self) -> Result<bool, Bailout> {
        self.charge(self.edge_count())?;
        let preds = self.predecessors();
        let mut all = FixedBitSet::with_capacity(self.states.len());
        all.insert_range(..);
        let mut regions = vec![all];
        let mut changed = false;
        while let Some(region) = regions.pop() {
            for scc in self.components(&region)? {
                if scc.len() == 1 && !self.states[scc[0]].successors().any(|s| s == scc[0]) {
                    continue;
                }
                let mut members = FixedBitSet::with_capacity(self.states.len());
                for &id in &scc {
                    members.insert(id);
                }
                let entries: Vec<StateId> = scc
                    .iter()
                    .copied()
                    .filter(|&id| {
                        self.roots.contains(&id)
                            || preds[id].iter().any(|&p| !members.contains(p))
                    })
                    .collect();
                match entries.as_slice() {
                    [] => {}
                    [header] => {
                        members.set(*header, false);
                        regions.push(members);
                    }
                    [_, rest @ ..] => {
                        for &entry in rest {
                            self.clone_component(&scc, &members, entry)?;
                        }
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }

    /// Copies `scc` (sorted) and moves the outside edges into `entry` to the
    /// copy.
    fn clone_component(
        &mut self,
        scc: &[StateId],
        members: &FixedBitSet,
        entry: StateId,
    ) -> Result<(), Bailout> {
        let base = self.states.len();
        if base + scc.len() > self.max_states {
            return Err(too_large());
        }
        self.charge(base + scc.len())?;
        trace!("cloning {} states entered at {entry}", scc.len());
        let copy_of = |id: StateId| scc.binary_search(&id).ok().map(|i| base + i);

        for &id in scc {
            let mut state = self.states[id].clone();
            for succ in state.successors_mut() {
                if let Some(copy) = copy_of(*succ) {
                    *succ = copy;
                }
            }
            self.states.push(state);
        }
        let Some(entry_copy) = copy_of(entry) else {
            return Ok(());
        };
        for (id, state) in self.states[..base].iter_mut().enumerate() {
            if members.contains(id) {
                continue;
            }
            for succ in state.successors_mut() {
                if *succ == entry {
                    *succ = entry_copy;
                }
            }
        }
        for root in &mut self.roots {
            if *root == entry {
                *root = entry_copy;
            }
        }
        Ok(())
    }

    /// Strongly connected components of the states in `region`, following
    /// only edges that stay inside it.
    fn components(&mut self, region: &FixedBitSet) -> Result<Vec<Vec<StateId>>, Bailout> {
        const UNVISITED: usize = usize::MAX;
        let n = self.states.len();
        let edges: Vec<Vec<StateId>> = self
            .states
            .iter()
            .enumerate()
            .map(|(id, state)| match region.contains(id) {
                true => state.successors().filter(|&s| region.contains(s)).collect(),
                false => Vec::new(),
            })
            .collect();
        self.charge(region.count_ones(..) + edges.iter().map(Vec::len).sum::<usize>())?;
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0; n];
        let mut on_stack = FixedBitSet::with_capacity(n);
        let mut stack = Vec::new();
        let mut sccs = Vec::new();
        let mut next_index = 0;

        for start in region.ones() {
            if index[start] != UNVISITED {
                continue;
            }
            // (state, next edge to follow)
            let mut frames = vec![(start, 0)];
            index[start] = next_index;
            low[start] = next_index;
            next_index += 1;
            stack.push(start);
            on_stack.insert(start);

            while let Some(frame) = frames.last_mut() {
                let v = frame.0;
                if let Some(&w) = edges[v].get(frame.1) {
                    frame.1 += 1;
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        low[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack.insert(w);
                        frames.push((w, 0));
                    } else if on_stack.contains(w) {
                        low[v] = low[v].min(index[w]);
                    }
                    continue;
                }
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    low[parent] = low[parent].min(low[v]);
                }
                if low[v] == index[v] {
                    let mut scc = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack.set(w, false);
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    scc.sort_unstable();
                    sccs.push(scc);
                }
            }
        }
        Ok(sccs)
    }

    /// Drops unreachable states, keeping the dead state first.
    fn collect_garbage(&mut self) -> Result<(), Bailout> {
        self.charge(self.edge_count())?;
        let n = self.states.len();
        let mut reachable = FixedBitSet::with_capacity(n);
        let mut stack: Vec<StateId> = self.roots.to_vec();
        while let Some(id) = stack.pop() {
            if reachable.put(id) {
                continue;
            }
            stack.extend(self.states[id].successors());
        }
        reachable.insert(DEAD);

        let mut renumber = vec![DEAD; n];
        let mut kept = Vec::with_capacity(n);
        for (id, state) in std::mem::take(&mut self.states).into_iter().enumerate() {
            if reachable.contains(id) {
                renumber[id] = kept.len();
                kept.push(state);
            }
        }
        for state in &mut kept {
            for succ in state.successors_mut() {
                *succ = renumber[*succ];
            }
        }
        for root in &mut self.roots {
            *root = renumber[*root];
        }
        self.states = kept;
        Ok(())
    }
}
