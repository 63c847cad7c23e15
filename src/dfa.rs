//! Subset construction over the lazily expanded NFA.
//!
//! A DFA state is an ordered list of threads, highest priority first. Each
//! thread is an NFA state; in tracking mode the capture array of thread `i`
//! lives in slot `i` at run time, and every transition says which slot each
//! successor copies its captures from. In tracing mode the captures are part
//! of the thread itself (see [`crate::trace`]).
//!
//! Matching is leftmost-first. A search that is not sticky keeps injecting
//! the initial NFA state at the lowest priority until some thread accepts.
//! Accepting on a character drops every thread of lower priority, so the
//! DFA stops once nothing better than the last match can still succeed.

use std::rc::Rc;

use fixedbitset::FixedBitSet;
use indexmap::IndexSet;
use log::{debug, trace};

use crate::boundaries::GroupBoundaries;
use crate::budget::BudgetConfig;
use crate::charset::{CodePointRange, MAX_CODE_POINT};
use crate::error::{Bailout, Limit, Stage};
use crate::nfa::{Context, Nfa, NfaState, NfaStateId, NfaTarget, NfaTransition};
use crate::trace::{RelativeCaptures, TraceFinder};

pub type StateId = usize;

/// The state without threads. Always state 0.
pub const DEAD: StateId = 0;

/// How a successor thread gets its captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotUpdate {
    /// Slot to copy from; `None` starts with every group unset.
    pub origin: Option<u8>,
    /// Index into [`Dfa::boundaries`], applied at the current position.
    pub boundaries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accept {
    /// The captures of `origin` with `boundaries` applied.
    Slot { origin: u8, boundaries: u32 },
    /// An entry of [`Dfa::results`].
    Result(u8),
}

/// Transition on every character in `range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfaTransition {
    pub range: CodePointRange,
    pub target: StateId,
    /// One entry per thread of the target, empty in tracing mode.
    pub updates: Box<[SlotUpdate]>,
    /// A match ending before the character.
    pub accept: Option<Accept>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Reads the characters before the search start to set up look-behinds.
    /// `entry` is the state the search begins in from here.
    Prefix { entry: StateId },
    Match,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfaState {
    pub kind: StateKind,
    /// Capture arrays used by the threads of the state.
    pub slots: usize,
    /// Sorted by range, non-overlapping.
    pub transitions: Vec<DfaTransition>,
    /// A match ending at the end of input.
    pub eoi_accept: Option<Accept>,
}

impl DfaState {
    pub fn transition(&self, c: u32) -> Option<&DfaTransition> {
        let i = self
            .transitions
            .partition_point(|t| t.range.hi() < c);
        self.transitions.get(i).filter(|t| t.range.contains(c))
    }

    /// Every state this one can move to, including the prefix entry.
    pub fn successors(&self) -> impl Iterator<Item = StateId> + '_ {
        let entry = match self.kind {
            StateKind::Prefix { entry } => Some(entry),
            StateKind::Match => None,
        };
        entry
            .into_iter()
            .chain(self.transitions.iter().map(|t| t.target))
    }

    pub(crate) fn successors_mut(&mut self) -> impl Iterator<Item = &mut StateId> + '_ {
        let entry = match &mut self.kind {
            StateKind::Prefix { entry } => Some(entry),
            StateKind::Match => None,
        };
        entry
            .into_iter()
            .chain(self.transitions.iter_mut().map(|t| &mut t.target))
    }
}

#[derive(Debug, Clone)]
pub struct Dfa {
    pub states: Vec<DfaState>,
    /// Where a search starting at offset 0 begins.
    pub root_start: StateId,
    /// Prefix state to run from `prefix_length` characters before a later
    /// start offset.
    pub root_mid: StateId,
    pub prefix_length: usize,
    pub boundaries: Vec<GroupBoundaries>,
    /// Relative captures of each result when built in tracing mode.
    pub results: Option<Vec<RelativeCaptures>>,
    pub groups: usize,
}

impl Dfa {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_traced(&self) -> bool {
        self.results.is_some()
    }

    pub fn roots(&self) -> [StateId; 2] {
        [self.root_start, self.root_mid]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Thread {
    state: NfaStateId,
    /// Empty unless tracing.
    captures: RelativeCaptures,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DfaKey {
    Dead,
    Prefix {
        tracker: FixedBitSet,
    },
    Match {
        threads: Vec<Thread>,
        injecting: bool,
        tracker: FixedBitSet,
    },
}

/// Outcome of one character in one state.
struct Step {
    target: StateId,
    updates: Box<[SlotUpdate]>,
    accept: Option<Accept>,
}

pub struct DfaBuilder<'n, 'a> {
    nfa: &'n mut Nfa<'a>,
    sticky: bool,
    stage: Stage,
    max_states: usize,
    max_threads: usize,
    tracer: Option<TraceFinder>,
    keys: IndexSet<DfaKey>,
    states: Vec<DfaState>,
    boundaries: IndexSet<GroupBoundaries>,
    no_boundaries: u32,
    /// Partition points of the look-behind classes.
    tracker_points: Vec<u32>,
    groups: usize,
}

impl<'n, 'a> DfaBuilder<'n, 'a> {
    /// Builder for the tracking DFA. Its limits are hard.
    pub fn new(nfa: &'n mut Nfa<'a>, sticky: bool, budgets: &BudgetConfig) -> Self {
        Self::with_stage(nfa, sticky, budgets, Stage::Dfa, None)
    }

    /// Builder for the tracing DFA. Running out of any budget is reported
    /// from the trace finder stage.
    pub fn tracing(nfa: &'n mut Nfa<'a>, sticky: bool, budgets: &BudgetConfig) -> Self {
        let groups = nfa.ast().capture_groups();
        let tracer = TraceFinder::new(groups, budgets.trace_finder_max_results);
        Self::with_stage(nfa, sticky, budgets, Stage::TraceFinder, Some(tracer))
    }

    fn with_stage(
        nfa: &'n mut Nfa<'a>,
        sticky: bool,
        budgets: &BudgetConfig,
        stage: Stage,
        tracer: Option<TraceFinder>,
    ) -> Self {
        let groups = nfa.ast().capture_groups();
        let mut tracker_points: Vec<u32> = nfa
            .look_behinds()
            .classes()
            .flat_map(|class| {
                class
                    .ranges()
                    .iter()
                    .flat_map(|r| [r.lo(), r.hi() + 1])
                    .collect::<Vec<_>>()
            })
            .collect();
        tracker_points.sort_unstable();
        tracker_points.dedup();
        let mut boundaries = IndexSet::new();
        boundaries.insert(GroupBoundaries::new(groups));
        Self {
            nfa,
            sticky,
            stage,
            max_states: budgets.max_dfa_size,
            max_threads: budgets.max_nfa_states_per_dfa_state,
            tracer,
            keys: IndexSet::new(),
            states: Vec::new(),
            boundaries,
            no_boundaries: 0,
            tracker_points,
            groups,
        }
    }

    pub fn build(mut self) -> Result<Dfa, Bailout> {
        self.keys.insert(DfaKey::Dead);
        let tracker = self.nfa.look_behinds().initial();
        let at_start = self.nfa.uses_caret();
        let root = self.root(tracker.clone(), at_start)?;
        let root_start = self.intern(root)?;
        let root_mid = self.intern(DfaKey::Prefix { tracker })?;

        while self.states.len() < self.keys.len() {
            let id = self.states.len();
            let key = self.keys[id].clone();
            let state = match key {
                DfaKey::Dead => DfaState {
                    kind: StateKind::Match,
                    slots: 0,
                    transitions: Vec::new(),
                    eoi_accept: None,
                },
                DfaKey::Prefix { tracker } => self.expand_prefix(&tracker)?,
                DfaKey::Match {
                    threads,
                    injecting,
                    tracker,
                } => self.expand_match(&threads, injecting, &tracker)?,
            };
            trace!(
                "dfa state {id}: {} slots, {} transitions",
                state.slots,
                state.transitions.len()
            );
            self.states.push(state);
        }

        let dfa = Dfa {
            states: self.states,
            root_start,
            root_mid,
            prefix_length: self.nfa.look_behinds().max_length(),
            boundaries: self.boundaries.into_iter().collect(),
            results: self.tracer.map(TraceFinder::into_results),
            groups: self.groups,
        };
        debug!(
            "built {} dfa with {} states",
            if dfa.is_traced() { "tracing" } else { "tracking" },
            dfa.len()
        );
        Ok(dfa)
    }

    fn limit(&self, limit: Limit) -> Bailout {
        Bailout::limit(self.stage, limit)
    }

    fn intern(&mut self, key: DfaKey) -> Result<StateId, Bailout> {
        if let Some(id) = self.keys.get_index_of(&key) {
            return Ok(id);
        }
        if self.keys.len() >= self.max_states {
            return Err(self.limit(Limit::MaxDfaSize));
        }
        Ok(self.keys.insert_full(key).0)
    }

    fn intern_boundaries(&mut self, boundaries: &GroupBoundaries) -> u32 {
        if boundaries.is_empty() {
            return self.no_boundaries;
        }
        match self.boundaries.get_index_of(boundaries) {
            Some(index) => index as u32,
            None => self.boundaries.insert_full(boundaries.clone()).0 as u32,
        }
    }

    fn fresh_captures(&self) -> RelativeCaptures {
        match &self.tracer {
            Some(tracer) => tracer.fresh(),
            None => RelativeCaptures::default(),
        }
    }

    /// The search start: just the initial NFA state.
    fn root(&mut self, tracker: FixedBitSet, at_start: bool) -> Result<DfaKey, Bailout> {
        let context = Context {
            at_start,
            satisfied: self.nfa.look_behinds().satisfied(&tracker),
        };
        let state = self.nfa.initial(context)?;
        Ok(DfaKey::Match {
            threads: vec![Thread {
                state,
                captures: self.fresh_captures(),
            }],
            injecting: !self.sticky,
            tracker,
        })
    }

    fn expand_prefix(&mut self, tracker: &FixedBitSet) -> Result<DfaState, Bailout> {
        let root = self.root(tracker.clone(), false)?;
        let entry = self.intern(root)?;
        let mut transitions: Vec<DfaTransition> = Vec::new();
        if !self.nfa.look_behinds().is_empty() {
            let mut points = self.tracker_points.clone();
            points.push(0);
            points.sort_unstable();
            points.dedup();
            for (lo, hi) in intervals(&points) {
                let next = self.nfa.look_behinds().advance(tracker, lo);
                let target = self.intern(DfaKey::Prefix { tracker: next })?;
                push_merged(
                    &mut transitions,
                    DfaTransition {
                        range: CodePointRange::new(lo, hi),
                        target,
                        updates: Box::default(),
                        accept: None,
                    },
                );
            }
        }
        Ok(DfaState {
            kind: StateKind::Prefix { entry },
            slots: 0,
            transitions,
            eoi_accept: None,
        })
    }

    fn expand_match(
        &mut self,
        threads: &[Thread],
        injecting: bool,
        tracker: &FixedBitSet,
    ) -> Result<DfaState, Bailout> {
        let per_thread = threads
            .iter()
            .map(|t| self.nfa.transitions(t.state))
            .collect::<Result<Vec<Rc<[NfaTransition]>>, Bailout>>()?;

        let mut points = self.tracker_points.clone();
        points.push(0);
        for t in per_thread.iter().flat_map(|ts| ts.iter()) {
            for r in t.class.ranges().iter() {
                points.push(r.lo());
                points.push(r.hi() + 1);
            }
        }
        points.sort_unstable();
        points.dedup();

        let mut transitions = Vec::new();
        for (lo, hi) in intervals(&points) {
            let step = self.step(threads, &per_thread, injecting, tracker, lo)?;
            if step.target == DEAD && step.accept.is_none() {
                continue;
            }
            push_merged(
                &mut transitions,
                DfaTransition {
                    range: CodePointRange::new(lo, hi),
                    target: step.target,
                    updates: step.updates,
                    accept: step.accept,
                },
            );
        }

        let mut eoi_accept = None;
        'threads: for (slot, (thread, ts)) in threads.iter().zip(&per_thread).enumerate() {
            for t in ts.iter() {
                if t.target == NfaTarget::Final && t.accepts_eoi {
                    eoi_accept = Some(self.accept(slot, thread, &t.boundaries)?);
                    break 'threads;
                }
            }
        }

        Ok(DfaState {
            kind: StateKind::Match,
            slots: if self.tracer.is_some() { 0 } else { threads.len() },
            transitions,
            eoi_accept,
        })
    }

    fn accept(
        &mut self,
        slot: usize,
        thread: &Thread,
        boundaries: &GroupBoundaries,
    ) -> Result<Accept, Bailout> {
        if let Some(tracer) = &mut self.tracer {
            return Ok(Accept::Result(tracer.result(&thread.captures, boundaries)?));
        }
        Ok(Accept::Slot {
            origin: slot as u8,
            boundaries: self.intern_boundaries(boundaries),
        })
    }

    /// Follow every thread on `c`.
    fn step(
        &mut self,
        threads: &[Thread],
        per_thread: &[Rc<[NfaTransition]>],
        injecting: bool,
        tracker: &FixedBitSet,
        c: u32,
    ) -> Result<Step, Bailout> {
        let look_behinds = self.nfa.look_behinds();
        let tracker = look_behinds.advance(tracker, c);
        let context = Context {
            at_start: false,
            satisfied: look_behinds.satisfied(&tracker),
        };

        let mut next: Vec<Thread> = Vec::new();
        let mut updates = Vec::new();
        let mut accept = None;
        'threads: for (slot, (thread, ts)) in threads.iter().zip(per_thread).enumerate() {
            for t in ts.iter() {
                if !t.class.contains(c) {
                    continue;
                }
                let (main, lookaheads) = match &t.target {
                    NfaTarget::Final => {
                        accept = Some(self.accept(slot, thread, &t.boundaries)?);
                        break 'threads;
                    }
                    NfaTarget::Successor { main, lookaheads } => (*main, lookaheads.clone()),
                };
                let state = self.nfa.intern(NfaState {
                    main,
                    lookaheads,
                    context: context.clone(),
                })?;
                if next.iter().any(|n| n.state == state) {
                    continue;
                }
                let captures = match &self.tracer {
                    Some(tracer) => tracer.advance(&thread.captures, &t.boundaries),
                    None => {
                        let boundaries = self.intern_boundaries(&t.boundaries);
                        updates.push(SlotUpdate {
                            origin: Some(slot as u8),
                            boundaries,
                        });
                        RelativeCaptures::default()
                    }
                };
                next.push(Thread { state, captures });
            }
        }

        let injecting = injecting && accept.is_none();
        if injecting {
            let state = self.nfa.initial(context)?;
            if !next.iter().any(|n| n.state == state) {
                next.push(Thread {
                    state,
                    captures: self.fresh_captures(),
                });
                if self.tracer.is_none() {
                    updates.push(SlotUpdate {
                        origin: None,
                        boundaries: self.no_boundaries,
                    });
                }
            }
        }

        if next.len() > self.max_threads {
            return Err(self.limit(Limit::MaxNfaStatesPerDfaState));
        }
        let target = if next.is_empty() {
            DEAD
        } else {
            self.intern(DfaKey::Match {
                threads: next,
                injecting,
                tracker,
            })?
        };
        Ok(Step {
            target,
            updates: updates.into_boxed_slice(),
            accept,
        })
    }
}

/// Intervals between consecutive sorted partition points.
fn intervals(points: &[u32]) -> impl Iterator<Item = (u32, u32)> + '_ {
    points
        .iter()
        .enumerate()
        .filter(|&(_, &lo)| lo <= MAX_CODE_POINT)
        .map(|(i, &lo)| {
            let hi = points.get(i + 1).map_or(MAX_CODE_POINT, |&next| next - 1);
            (lo, hi.min(MAX_CODE_POINT))
        })
}

/// Append `transition`, extending the previous one if it behaves the same.
fn push_merged(transitions: &mut Vec<DfaTransition>, transition: DfaTransition) {
    if let Some(last) = transitions.last_mut() {
        if last.range.hi() + 1 == transition.range.lo()
            && last.target == transition.target
            && last.updates == transition.updates
            && last.accept == transition.accept
        {
            last.range = CodePointRange::new(last.range.lo(), transition.range.hi());
            return;
        }
    }
    transitions.push(transition);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flags::Flags;
    use crate::parser::parse;
    use crate::unicode::StdProperties;

    fn build(pattern: &str, flags: &str, tracing: bool) -> Result<Dfa, Bailout> {
        let flags: Flags = flags.parse().unwrap();
        let budgets = BudgetConfig::default();
        let ast = parse(pattern, flags, &budgets, &StdProperties).unwrap();
        let mut nfa = Nfa::new(&ast, flags, &budgets)?;
        let builder = if tracing {
            DfaBuilder::tracing(&mut nfa, flags.sticky(), &budgets)
        } else {
            DfaBuilder::new(&mut nfa, flags.sticky(), &budgets)
        };
        builder.build()
    }

    #[test]
    fn dead_state_first() {
        let dfa = build("abc", "", false).unwrap();
        assert_eq!(dfa.states[DEAD].transitions, vec![]);
        assert_eq!(dfa.states[DEAD].slots, 0);
        assert_ne!(dfa.root_start, DEAD);
        assert!(!dfa.is_traced());
    }

    #[test]
    fn sticky_literal() {
        let dfa = build("ab", "y", false).unwrap();
        let root = &dfa.states[dfa.root_start];
        assert_eq!(root.slots, 1);
        assert_eq!(root.transitions.len(), 1);
        assert_eq!(root.transitions[0].range, CodePointRange::single('a' as u32));
        assert_eq!(root.eoi_accept, None);

        let after_a = &dfa.states[root.transitions[0].target];
        let t = after_a.transition('b' as u32).unwrap();
        assert_eq!(t.updates.len(), 1);
        assert_eq!(t.updates[0].origin, Some(0));
        assert!(after_a.transition('c' as u32).is_none());

        let after_b = &dfa.states[t.target];
        assert!(matches!(after_b.eoi_accept, Some(Accept::Slot { origin: 0, .. })));
        assert!(after_b.transition('x' as u32).unwrap().accept.is_some());
        assert_eq!(after_b.transition('x' as u32).unwrap().target, DEAD);
    }

    #[test]
    fn transitions_sorted_and_merged() {
        let dfa = build("[a-c][x-z]|[d-f]", "y", false).unwrap();
        let root = &dfa.states[dfa.root_start];
        assert_eq!(root.transitions.len(), 2);
        assert_eq!(root.transitions[0].range, CodePointRange::new('a' as u32, 'c' as u32));
        assert_eq!(root.transitions[1].range, CodePointRange::new('d' as u32, 'f' as u32));
        for state in &dfa.states {
            for pair in state.transitions.windows(2) {
                assert!(pair[0].range.hi() < pair[1].range.lo());
            }
        }
    }

    #[test]
    fn searching_injects_initial_state() {
        let dfa = build("a", "", false).unwrap();
        let root = &dfa.states[dfa.root_start];
        // Every other character keeps the search alive.
        assert_eq!(root.transitions.len(), 3);
        for c in ['\0', 'b', '\u{10FFFF}'] {
            let t = root.transition(c as u32).unwrap();
            assert_eq!(t.target, dfa.root_start);
            assert_eq!(
                &*t.updates,
                &[SlotUpdate {
                    origin: None,
                    boundaries: 0
                }]
            );
        }
        let after_a = &dfa.states[root.transition('a' as u32).unwrap().target];
        assert_eq!(after_a.slots, 2);
        assert!(matches!(after_a.eoi_accept, Some(Accept::Slot { origin: 0, .. })));
        // Once a match is found nothing is injected anymore.
        let t = after_a.transition('a' as u32).unwrap();
        assert!(t.accept.is_some());
        assert_eq!(t.target, DEAD);
    }

    #[test]
    fn accept_prunes_lower_priority() {
        // Greedy: the thread continuing the star outranks the accepting one.
        let dfa = build("a*", "y", false).unwrap();
        let root = &dfa.states[dfa.root_start];
        let t = root.transition('a' as u32).unwrap();
        // The empty match is remembered but the star keeps going.
        assert!(t.accept.is_some());
        assert_ne!(t.target, DEAD);
        let again = &dfa.states[t.target];
        assert_eq!(again.transition('a' as u32).unwrap().target, t.target);

        // Lazy: accepting first leaves nothing to continue.
        let dfa = build("a*?", "y", false).unwrap();
        let root = &dfa.states[dfa.root_start];
        let t = root.transition('a' as u32).unwrap();
        assert!(t.accept.is_some());
        assert_eq!(t.target, DEAD);
    }

    #[test]
    fn prefix_states() {
        let dfa = build("(?<=a)b", "", false).unwrap();
        assert_eq!(dfa.prefix_length, 1);
        let StateKind::Prefix { entry } = dfa.states[dfa.root_mid].kind else {
            panic!("root_mid is not a prefix state");
        };
        assert_eq!(entry, dfa.root_start);
        let after_a = dfa.states[dfa.root_mid].transition('a' as u32).unwrap().target;
        let StateKind::Prefix { entry } = dfa.states[after_a].kind else {
            panic!("prefix leads to a match state");
        };
        assert_ne!(entry, dfa.root_start);

        let dfa = build("b", "", false).unwrap();
        assert_eq!(dfa.prefix_length, 0);
        assert!(dfa.states[dfa.root_mid].transitions.is_empty());
    }

    #[test]
    fn tracing() {
        let dfa = build("(a)|(b)", "y", true).unwrap();
        assert!(dfa.is_traced());
        let results = dfa.results.as_ref().unwrap();
        assert_eq!(results.len(), 2);
        let root = &dfa.states[dfa.root_start];
        assert_eq!(root.slots, 0);
        let after_b = &dfa.states[root.transition('b' as u32).unwrap().target];
        let Some(Accept::Result(r)) = after_b.eoi_accept else {
            panic!("expected a result");
        };
        let r = &results[r as usize];
        assert_eq!(r[2], crate::boundaries::NO_OFFSET);
        assert_eq!(&r[4..6], &[1, 0]);
    }

    #[test]
    fn budgets() {
        let flags = Flags::empty();
        let budgets = BudgetConfig {
            max_dfa_size: 4,
            ..BudgetConfig::default()
        };
        let ast = parse("abcdef", flags, &budgets, &StdProperties).unwrap();
        let mut nfa = Nfa::new(&ast, flags, &budgets).unwrap();
        assert_eq!(
            DfaBuilder::new(&mut nfa, false, &budgets).build().unwrap_err(),
            Bailout::limit(Stage::Dfa, Limit::MaxDfaSize)
        );
        assert_eq!(
            DfaBuilder::tracing(&mut nfa, false, &budgets).build().unwrap_err(),
            Bailout::limit(Stage::TraceFinder, Limit::MaxDfaSize)
        );

        let budgets = BudgetConfig {
            max_nfa_states_per_dfa_state: 2,
            ..BudgetConfig::default()
        };
        let ast = parse("a|aa|aaa", flags, &budgets, &StdProperties).unwrap();
        let mut nfa = Nfa::new(&ast, flags, &budgets).unwrap();
        assert_eq!(
            DfaBuilder::new(&mut nfa, true, &budgets).build().unwrap_err(),
            Bailout::limit(Stage::Dfa, Limit::MaxNfaStatesPerDfaState)
        );
    }
}
