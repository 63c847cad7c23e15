//! Nondeterministic automaton over the syntax tree.
//!
//! An NFA state is a position in the tree: the character class that was
//! just consumed by the main pattern, plus the positions of the look-aheads
//! that are still running, plus the [`Context`] of the current input
//! position. Its transitions come from walking the tree depth-first up to
//! the next character classes, recording capture group boundaries, guards
//! and look-arounds along each path.
//!
//! States are expanded on demand while the DFA is built, since the context
//! of a successor is only known once the consumed character is.

use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;
use fixedbitset::FixedBitSet;
use indexmap::IndexSet;
use log::trace;

use crate::ast::{AssertionKind, NodeId, NodeKind, RegexAst};
use crate::boundaries::GroupBoundaries;
use crate::budget::BudgetConfig;
use crate::charset::{self, CodePointSet};
use crate::error::{Bailout, Feature, Limit, Stage};
use crate::flags::Flags;

/// Tree walk steps allowed per NFA state budget unit.
const WALK_WORK_PER_STATE: usize = 64;

pub type NfaStateId = usize;

bitflags! {
    /// Constraints on the character following the current position.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Guard: u8 {
        /// `$`: no character may follow.
        const NEXT_END = 1 << 0;
        /// Multiline `$`: only a line terminator may follow.
        const NEXT_LINE_END = 1 << 1;
        const NEXT_WORD = 1 << 2;
        const NEXT_NOT_WORD = 1 << 3;
    }
}

impl Guard {
    pub fn allowed_chars(self) -> CodePointSet {
        if self.contains(Guard::NEXT_END) {
            return CodePointSet::new();
        }
        let mut allowed = CodePointSet::full();
        if self.contains(Guard::NEXT_LINE_END) {
            allowed = allowed.create_intersection(&charset::line_terminators());
        }
        if self.contains(Guard::NEXT_WORD) {
            allowed = allowed.create_intersection(&charset::word_chars());
        }
        if self.contains(Guard::NEXT_NOT_WORD) {
            allowed = allowed.create_intersection(&charset::word_chars().create_inverse());
        }
        allowed
    }

    /// The end of input is not a word character.
    pub fn allows_eoi(self) -> bool {
        !self.contains(Guard::NEXT_WORD)
    }
}

/// Literal look-behind bodies, checked with a deterministic tracker.
///
/// Besides the look-behinds of the pattern the table holds an implicit
/// entry for "the previous character is a word character" when `\b` or
/// `\B` is used, and one for "the previous character is a line terminator"
/// for multiline `^`.
///
/// A tracker is a bit set holding, for each entry of length `n`, bits
/// `0..=n`. Bit `k` is set if the last `k` characters match the first `k`
/// classes of the body; the entry is satisfied if bit `n` is set.
#[derive(Debug, Clone)]
pub struct LookBehindTable {
    entries: Vec<Vec<CodePointSet>>,
    offsets: Vec<usize>,
    bits: usize,
    by_node: HashMap<NodeId, usize>,
    word: Option<usize>,
    line_terminator: Option<usize>,
}

fn literal_body(ast: &RegexAst, group: NodeId) -> Option<Vec<CodePointSet>> {
    let [alt] = ast.group(group)?.alternatives.as_slice() else {
        return None;
    };
    ast.terms(*alt)
        .iter()
        .map(|&t| match ast.kind(t) {
            NodeKind::CharacterClass(set) => Some(set.clone()),
            _ => None,
        })
        .collect()
}

/// Nodes reachable from the root, in no particular order.
fn reachable(ast: &RegexAst) -> Vec<NodeId> {
    let mut seen = FixedBitSet::with_capacity(ast.len());
    let mut stack = vec![ast.root()];
    let mut nodes = Vec::new();
    while let Some(id) = stack.pop() {
        if seen.put(id.index()) {
            continue;
        }
        nodes.push(id);
        match ast.kind(id) {
            NodeKind::Group(group) => stack.extend(group.alternatives.iter().copied()),
            NodeKind::Sequence(terms) => stack.extend(terms.iter().copied()),
            NodeKind::LookAhead(la) | NodeKind::LookBehind(la) => {
                stack.push(la.group);
                stack.push(la.match_found);
            }
            _ => {}
        }
    }
    nodes
}

impl LookBehindTable {
    /// Rejects constructs the automaton cannot express and collects the
    /// look-behind bodies.
    pub fn new(ast: &RegexAst, flags: Flags) -> Result<Self, Bailout> {
        let mut nodes = reachable(ast);
        nodes.sort_unstable();

        let mut table = LookBehindTable {
            entries: Vec::new(),
            offsets: Vec::new(),
            bits: 0,
            by_node: HashMap::new(),
            word: None,
            line_terminator: None,
        };
        let mut word = false;
        let mut caret = false;
        for id in nodes {
            match ast.kind(id) {
                NodeKind::BackReference(_) => {
                    return Err(Bailout::unsupported(Stage::Nfa, Feature::BackReference))
                }
                NodeKind::LookAhead(la) if la.negated => {
                    return Err(Bailout::unsupported(Stage::Nfa, Feature::NegativeLookAhead))
                }
                NodeKind::LookBehind(lb) => {
                    let Some(classes) = literal_body(ast, lb.group) else {
                        return Err(Bailout::unsupported(
                            Stage::Nfa,
                            Feature::NonLiteralLookBehind,
                        ));
                    };
                    table.by_node.insert(id, table.entries.len());
                    table.push(classes);
                }
                NodeKind::Assertion(AssertionKind::WordBoundary | AssertionKind::NotWordBoundary) => {
                    word = true
                }
                NodeKind::Assertion(AssertionKind::Start) => caret = true,
                _ => {}
            }
        }
        if word {
            table.word = Some(table.entries.len());
            table.push(vec![charset::word_chars().freeze()]);
        }
        if caret && flags.multiline() {
            table.line_terminator = Some(table.entries.len());
            table.push(vec![charset::line_terminators().freeze()]);
        }
        Ok(table)
    }

    fn push(&mut self, classes: Vec<CodePointSet>) {
        self.offsets.push(self.bits);
        self.bits += classes.len() + 1;
        self.entries.push(classes);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Characters before a match start that can influence it.
    pub fn max_length(&self) -> usize {
        self.entries.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn entry(&self, node: NodeId) -> Option<usize> {
        self.by_node.get(&node).copied()
    }

    pub fn word(&self) -> Option<usize> {
        self.word
    }

    pub fn line_terminator(&self) -> Option<usize> {
        self.line_terminator
    }

    /// Every class a tracker distinguishes.
    pub fn classes(&self) -> impl Iterator<Item = &CodePointSet> {
        self.entries.iter().flatten()
    }

    /// Tracker at the start of the input.
    pub fn initial(&self) -> FixedBitSet {
        let mut tracker = FixedBitSet::with_capacity(self.bits);
        for &offset in &self.offsets {
            tracker.insert(offset);
        }
        tracker
    }

    pub fn advance(&self, tracker: &FixedBitSet, c: u32) -> FixedBitSet {
        let mut next = FixedBitSet::with_capacity(self.bits);
        for (classes, &offset) in self.entries.iter().zip(&self.offsets) {
            next.insert(offset);
            for (k, class) in classes.iter().enumerate() {
                if tracker.contains(offset + k) && class.contains(c) {
                    next.insert(offset + k + 1);
                }
            }
        }
        next
    }

    /// The entries satisfied at the position described by `tracker`.
    pub fn satisfied(&self, tracker: &FixedBitSet) -> FixedBitSet {
        let mut satisfied = FixedBitSet::with_capacity(self.entries.len());
        for (i, (classes, &offset)) in self.entries.iter().zip(&self.offsets).enumerate() {
            if tracker.contains(offset + classes.len()) {
                satisfied.insert(i);
            }
        }
        satisfied
    }
}

/// What the walk can observe about the current input position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    /// At the very start of the input. Only tracked for patterns using `^`.
    pub at_start: bool,
    /// Satisfied [`LookBehindTable`] entries.
    pub satisfied: FixedBitSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NfaState {
    /// The root group before anything is consumed, the character class just
    /// consumed, or the top-level `MatchFound` once only look-aheads remain.
    pub main: NodeId,
    /// Character classes just consumed by running look-aheads. Sorted.
    pub lookaheads: Vec<NodeId>,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NfaTarget {
    /// The whole pattern has matched at the current position.
    Final,
    /// Consume a character and continue from these positions.
    Successor {
        main: NodeId,
        lookaheads: Vec<NodeId>,
    },
}

#[derive(Debug, Clone)]
pub struct NfaTransition {
    pub target: NfaTarget,
    /// The next character must be in this class. For a final transition the
    /// character is not consumed.
    pub class: CodePointSet,
    /// Whether a final transition may be taken at the end of input.
    pub accepts_eoi: bool,
    pub boundaries: GroupBoundaries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathElement {
    Enter(NodeId),
    /// Took the empty alternative of a quantifier group.
    PassThrough(NodeId),
    Exit(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepTarget {
    Consume(NodeId),
    Done,
}

#[derive(Debug, Clone)]
struct StepResult {
    target: StepTarget,
    guard: Guard,
    boundaries: GroupBoundaries,
    spawned: Vec<NodeId>,
}

/// Where a walk starts.
#[derive(Debug, Clone, Copy)]
enum SubStep {
    /// Continue after a consumed character class.
    Resume(NodeId),
    /// Run a look-ahead body from its beginning.
    Enter(NodeId),
}

/// Pending work of a walk.
#[derive(Debug, Clone, Copy)]
enum Task {
    Enter(NodeId),
    /// Continue after the node has matched.
    Leave(NodeId),
    FinishAlternative(NodeId),
    PushPath(PathElement),
    PopPath,
    PopSpawned,
    SetGuard(Guard),
}

/// Depth-first search from one position to every reachable character class
/// or `MatchFound`, in priority order. The search runs off an explicit task
/// stack.
struct StepVisitor<'n> {
    ast: &'n RegexAst,
    look_behinds: &'n LookBehindTable,
    context: &'n Context,
    multiline: bool,
    groups: usize,
    path: Vec<PathElement>,
    guard: Guard,
    spawned: Vec<NodeId>,
    tasks: Vec<Task>,
    results: Vec<StepResult>,
    work: usize,
    limit: usize,
}

impl<'n> StepVisitor<'n> {
    fn run(&mut self, task: Task) -> Result<(), Bailout> {
        self.tasks.push(task);
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Enter(id) => self.enter(id)?,
                Task::Leave(id) => self.leave(id),
                Task::FinishAlternative(group) => self.finish_alternative(group),
                Task::PushPath(element) => self.path.push(element),
                Task::PopPath => {
                    self.path.pop();
                }
                Task::PopSpawned => {
                    self.spawned.pop();
                }
                Task::SetGuard(guard) => self.guard = guard,
            }
        }
        Ok(())
    }

    /// Run `tasks` in order, before anything scheduled earlier.
    fn then(&mut self, tasks: &[Task]) {
        self.tasks.extend(tasks.iter().rev());
    }

    fn enter(&mut self, id: NodeId) -> Result<(), Bailout> {
        self.work += 1;
        if self.work > self.limit {
            return Err(Bailout::limit(Stage::Nfa, Limit::MaxNfaSize));
        }
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::CharacterClass(_) => self.emit(StepTarget::Consume(id)),
            NodeKind::MatchFound => self.emit(StepTarget::Done),
            NodeKind::Assertion(kind) => self.assertion(id, *kind),
            NodeKind::LookAhead(_) => {
                self.spawned.push(id);
                self.then(&[Task::Leave(id), Task::PopSpawned]);
            }
            NodeKind::LookBehind(lb) => {
                let satisfied = self
                    .look_behinds
                    .entry(id)
                    .is_some_and(|e| self.context.satisfied.contains(e));
                if satisfied != lb.negated {
                    self.then(&[Task::Leave(id)]);
                }
            }
            NodeKind::Group(group) => {
                let mut tasks = Vec::with_capacity(3 * group.alternatives.len());
                for &alt in &group.alternatives {
                    let (element, next) = match ast.terms(alt).first() {
                        Some(&first) => (PathElement::Enter(id), Task::Enter(first)),
                        None if group.is_quantifier() => {
                            (PathElement::PassThrough(id), Task::Leave(id))
                        }
                        None => (PathElement::Enter(id), Task::FinishAlternative(id)),
                    };
                    tasks.extend([Task::PushPath(element), next, Task::PopPath]);
                }
                self.then(&tasks);
            }
            // Back-references are rejected up front; sequences are entered
            // through their group.
            NodeKind::BackReference(_) | NodeKind::Sequence(_) => {}
        }
        Ok(())
    }

    fn leave(&mut self, id: NodeId) {
        let ast = self.ast;
        let node = ast.node(id);
        let Some(parent) = node.parent else {
            self.then(&[Task::Enter(ast.match_found())]);
            return;
        };
        match ast.kind(parent) {
            NodeKind::Sequence(terms) => {
                let Some(group) = ast.node(parent).parent else {
                    return;
                };
                if node.seq_index == 0 && self.is_empty_iteration(group) {
                    return;
                }
                match terms.get(node.seq_index + 1) {
                    Some(&next) => self.then(&[Task::Enter(next)]),
                    None => self.finish_alternative(group),
                }
            }
            NodeKind::LookAhead(la) | NodeKind::LookBehind(la) => {
                self.then(&[Task::Enter(la.match_found)])
            }
            _ => {}
        }
    }

    /// An optional iteration of `group` that has not consumed anything
    /// fails.
    fn is_empty_iteration(&self, group: NodeId) -> bool {
        let ast = self.ast;
        let Some(g) = ast.group(group) else {
            return false;
        };
        g.is_quantifier()
            && g.alternatives.iter().any(|&alt| ast.terms(alt).is_empty())
            && self.path.contains(&PathElement::Enter(group))
    }

    fn finish_alternative(&mut self, group: NodeId) {
        let is_loop = self.ast.group(group).is_some_and(|g| g.is_loop);
        let next = if is_loop {
            Task::Enter(group)
        } else {
            Task::Leave(group)
        };
        self.then(&[Task::PushPath(PathElement::Exit(group)), next, Task::PopPath]);
    }

    fn guarded(&mut self, id: NodeId, guard: Guard) {
        let saved = self.guard;
        self.guard |= guard;
        self.then(&[Task::Leave(id), Task::SetGuard(saved)]);
    }

    fn satisfied(&self, entry: Option<usize>) -> bool {
        entry.is_some_and(|e| self.context.satisfied.contains(e))
    }

    fn assertion(&mut self, id: NodeId, kind: AssertionKind) {
        match kind {
            AssertionKind::Start => {
                let after_line_terminator =
                    self.multiline && self.satisfied(self.look_behinds.line_terminator());
                if self.context.at_start || after_line_terminator {
                    self.then(&[Task::Leave(id)]);
                }
            }
            AssertionKind::End if self.multiline => self.guarded(id, Guard::NEXT_LINE_END),
            AssertionKind::End => self.guarded(id, Guard::NEXT_END),
            AssertionKind::WordBoundary | AssertionKind::NotWordBoundary => {
                let prev_word = self.satisfied(self.look_behinds.word());
                let next_word = prev_word != (kind == AssertionKind::WordBoundary);
                let guard = if next_word {
                    Guard::NEXT_WORD
                } else {
                    Guard::NEXT_NOT_WORD
                };
                self.guarded(id, guard)
            }
        }
    }

    fn boundaries(&self) -> GroupBoundaries {
        let mut boundaries = GroupBoundaries::new(self.groups);
        for element in &self.path {
            match *element {
                PathElement::Enter(id) => {
                    let Some(group) = self.ast.group(id) else {
                        continue;
                    };
                    if group.is_quantifier() {
                        let enclosed = &group.enclosed_captures;
                        boundaries.clear(enclosed.start as usize..enclosed.end as usize);
                    }
                    if group.capturing {
                        boundaries.update_start(group.group_number as usize);
                    }
                }
                PathElement::Exit(id) => {
                    if let Some(group) = self.ast.group(id).filter(|g| g.capturing) {
                        boundaries.update_end(group.group_number as usize);
                    }
                }
                PathElement::PassThrough(_) => {}
            }
        }
        boundaries
    }

    fn emit(&mut self, target: StepTarget) {
        let duplicate = self
            .results
            .iter()
            .any(|r| r.target == target && r.guard == self.guard && r.spawned == self.spawned);
        if !duplicate {
            self.results.push(StepResult {
                target,
                guard: self.guard,
                boundaries: self.boundaries(),
                spawned: self.spawned.clone(),
            });
        }
    }
}

/// A combination of walk results still waiting for some sub-steps.
#[derive(Debug, Clone)]
struct Partial {
    /// `None` once the main pattern is done.
    main: Option<NodeId>,
    pending: Vec<NodeId>,
    /// Intersection of the classes to consume; `None` is unconstrained.
    class: Option<CodePointSet>,
    guard: Guard,
    boundaries: GroupBoundaries,
}

impl Partial {
    fn add(&mut self, ast: &RegexAst, result: &StepResult) {
        self.guard |= result.guard;
        self.boundaries.merge(&result.boundaries);
        if let StepTarget::Consume(id) = result.target {
            if let NodeKind::CharacterClass(set) = ast.kind(id) {
                self.class = Some(match &self.class {
                    Some(class) => class.create_intersection(set),
                    None => set.clone(),
                });
            }
        }
    }
}

pub struct Nfa<'a> {
    ast: &'a RegexAst,
    look_behinds: LookBehindTable,
    multiline: bool,
    uses_caret: bool,
    states: IndexSet<NfaState>,
    transitions: Vec<Option<Rc<[NfaTransition]>>>,
    max_states: usize,
    walk_limit: usize,
}

impl<'a> Nfa<'a> {
    pub fn new(ast: &'a RegexAst, flags: Flags, budgets: &BudgetConfig) -> Result<Self, Bailout> {
        let look_behinds = LookBehindTable::new(ast, flags)?;
        Ok(Nfa {
            ast,
            look_behinds,
            multiline: flags.multiline(),
            uses_caret: ast.uses_assertion(AssertionKind::Start),
            states: IndexSet::new(),
            transitions: Vec::new(),
            max_states: budgets.max_nfa_size,
            walk_limit: budgets.max_nfa_size.saturating_mul(WALK_WORK_PER_STATE),
        })
    }

    pub fn ast(&self) -> &RegexAst {
        self.ast
    }

    pub fn look_behinds(&self) -> &LookBehindTable {
        &self.look_behinds
    }

    /// `^` needs to know whether the position is the start of the input.
    pub fn uses_caret(&self) -> bool {
        self.uses_caret
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, id: NfaStateId) -> &NfaState {
        &self.states[id]
    }

    pub fn intern(&mut self, state: NfaState) -> Result<NfaStateId, Bailout> {
        if let Some(id) = self.states.get_index_of(&state) {
            return Ok(id);
        }
        if self.states.len() >= self.max_states {
            return Err(Bailout::limit(Stage::Nfa, Limit::MaxNfaSize));
        }
        let (id, _) = self.states.insert_full(state);
        self.transitions.push(None);
        Ok(id)
    }

    /// The state before the pattern has consumed anything.
    pub fn initial(&mut self, context: Context) -> Result<NfaStateId, Bailout> {
        let main = self.ast.root();
        self.intern(NfaState {
            main,
            lookaheads: Vec::new(),
            context,
        })
    }

    pub fn transitions(&mut self, id: NfaStateId) -> Result<Rc<[NfaTransition]>, Bailout> {
        if let Some(transitions) = &self.transitions[id] {
            return Ok(Rc::clone(transitions));
        }
        let transitions: Rc<[NfaTransition]> = self.compute(&self.states[id])?.into();
        trace!(
            "nfa state {id}: {} transitions",
            transitions.len()
        );
        self.transitions[id] = Some(Rc::clone(&transitions));
        Ok(transitions)
    }

    fn walk(
        &self,
        context: &Context,
        step: SubStep,
        work: &mut usize,
    ) -> Result<Vec<StepResult>, Bailout> {
        let mut visitor = StepVisitor {
            ast: self.ast,
            look_behinds: &self.look_behinds,
            context,
            multiline: self.multiline,
            groups: self.ast.capture_groups(),
            path: Vec::new(),
            guard: Guard::empty(),
            spawned: Vec::new(),
            tasks: Vec::new(),
            results: Vec::new(),
            work: *work,
            limit: self.walk_limit,
        };
        let task = match step {
            SubStep::Resume(id) => Task::Leave(id),
            SubStep::Enter(id) => match self.ast.kind(id) {
                NodeKind::LookAhead(la) => Task::Enter(la.group),
                _ => Task::Enter(id),
            },
        };
        visitor.run(task)?;
        *work = visitor.work;
        Ok(visitor.results)
    }

    fn compute(&self, state: &NfaState) -> Result<Vec<NfaTransition>, Bailout> {
        let ast = self.ast;
        let mut work = 0;
        let main_results = match ast.kind(state.main) {
            NodeKind::MatchFound => vec![StepResult {
                target: StepTarget::Done,
                guard: Guard::empty(),
                boundaries: GroupBoundaries::new(ast.capture_groups()),
                spawned: Vec::new(),
            }],
            NodeKind::CharacterClass(_) => {
                self.walk(&state.context, SubStep::Resume(state.main), &mut work)?
            }
            _ => self.walk(&state.context, SubStep::Enter(state.main), &mut work)?,
        };

        let mut out = Vec::new();
        for main in &main_results {
            let mut partial = Partial {
                main: match main.target {
                    StepTarget::Consume(id) => Some(id),
                    StepTarget::Done => None,
                },
                pending: Vec::new(),
                class: None,
                guard: Guard::empty(),
                boundaries: GroupBoundaries::new(ast.capture_groups()),
            };
            partial.add(ast, main);
            let todo: Vec<SubStep> = state
                .lookaheads
                .iter()
                .map(|&id| SubStep::Resume(id))
                .chain(main.spawned.iter().map(|&id| SubStep::Enter(id)))
                .collect();
            self.expand(&state.context, partial, &todo, &mut work, &mut out)?;
        }
        Ok(out)
    }

    /// Combine `partial` with every result of the remaining sub-steps, in
    /// priority order.
    fn expand(
        &self,
        context: &Context,
        partial: Partial,
        todo: &[SubStep],
        work: &mut usize,
        out: &mut Vec<NfaTransition>,
    ) -> Result<(), Bailout> {
        let mut stack = vec![(partial, todo.to_vec())];
        while let Some((partial, todo)) = stack.pop() {
            let Some((&step, rest)) = todo.split_first() else {
                self.finish(partial, out);
                continue;
            };
            let results = self.walk(context, step, work)?;
            for result in results.iter().rev() {
                let mut next = partial.clone();
                if let StepTarget::Consume(id) = result.target {
                    next.pending.push(id);
                }
                next.add(self.ast, result);
                if next.class.as_ref().is_some_and(CodePointSet::matches_nothing) {
                    continue;
                }
                let mut todo = rest.to_vec();
                todo.extend(result.spawned.iter().map(|&id| SubStep::Enter(id)));
                stack.push((next, todo));
            }
        }
        Ok(())
    }

    fn finish(&self, partial: Partial, out: &mut Vec<NfaTransition>) {
        let allowed = partial.guard.allowed_chars();
        let (target, class, accepts_eoi) = match (partial.main, partial.pending.is_empty()) {
            (None, true) => (NfaTarget::Final, allowed, partial.guard.allows_eoi()),
            (main, _) => {
                let class = match &partial.class {
                    Some(class) => class.create_intersection(&allowed),
                    None => allowed,
                };
                let mut lookaheads = partial.pending;
                lookaheads.sort_unstable();
                lookaheads.dedup();
                let main = main.unwrap_or_else(|| self.ast.match_found());
                (NfaTarget::Successor { main, lookaheads }, class, false)
            }
        };
        if class.matches_nothing() && !accepts_eoi {
            return;
        }
        let class = class.freeze();
        let duplicate = out
            .iter()
            .any(|t| t.target == target && t.class == class && t.accepts_eoi == accepts_eoi);
        if !duplicate {
            out.push(NfaTransition {
                target,
                class,
                accepts_eoi,
                boundaries: partial.boundaries,
            });
        }
    }
}
