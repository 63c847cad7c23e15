//! The compilation pipeline: parse, NFA, DFA, then the optional passes.

use log::debug;

use crate::budget::BudgetConfig;
use crate::dfa::{Dfa, DfaBuilder};
use crate::error::{CompileError, Stage};
use crate::flags::Flags;
use crate::machine::CompiledMatcher;
use crate::nfa::Nfa;
use crate::parser;
use crate::split::NodeSplitter;
use crate::unicode::{PropertyLookup, StdProperties};

/// Compiles patterns under one set of budgets.
pub struct Compiler<'p> {
    budgets: BudgetConfig,
    properties: &'p dyn PropertyLookup,
}

impl Default for Compiler<'static> {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

impl Compiler<'static> {
    pub fn new(budgets: BudgetConfig) -> Self {
        Self {
            budgets: budgets.validate(),
            properties: &StdProperties,
        }
    }
}

impl<'p> Compiler<'p> {
    /// Use `properties` to resolve `\p{..}` escapes.
    pub fn with_properties<'q>(self, properties: &'q dyn PropertyLookup) -> Compiler<'q> {
        Compiler {
            budgets: self.budgets,
            properties,
        }
    }

    pub fn budgets(&self) -> &BudgetConfig {
        &self.budgets
    }

    pub fn compile(&self, pattern: &str, flags: Flags) -> Result<CompiledMatcher, CompileError> {
        let result = self.run(pattern, flags);
        match &result {
            Err(CompileError::Bailout(bailout)) => {
                debug!("/{pattern}/{flags}: bailout: {bailout}");
            }
            Err(err) => debug!("/{pattern}/{flags}: {err}"),
            Ok(_) => {}
        }
        result
    }

    fn run(&self, pattern: &str, flags: Flags) -> Result<CompiledMatcher, CompileError> {
        let budgets = &self.budgets;
        let ast = parser::parse(pattern, flags, budgets, self.properties)?;
        debug!(
            "/{pattern}/{flags}: {} ast nodes, {} groups",
            ast.len(),
            ast.capture_groups()
        );

        let mut nfa = Nfa::new(&ast, flags, budgets)?;
        let dfa = match self.trace(&mut nfa, flags)? {
            Some(dfa) => dfa,
            None => DfaBuilder::new(&mut nfa, flags.sticky(), budgets).build()?,
        };
        debug!("/{pattern}/{flags}: {} nfa states, {} dfa states", nfa.len(), dfa.len());

        let dfa = self.split(dfa);
        Ok(CompiledMatcher::new(pattern, flags, dfa, ast.group_names()))
    }

    /// Build the tracing DFA if the pattern allows it. Running out of budget
    /// only disables tracing.
    fn trace(&self, nfa: &mut Nfa<'_>, flags: Flags) -> Result<Option<Dfa>, CompileError> {
        if !self.budgets.enable_trace_finder || !nfa.ast().is_tree_like() {
            return Ok(None);
        }
        match DfaBuilder::tracing(nfa, flags.sticky(), &self.budgets).build() {
            Ok(dfa) => Ok(Some(dfa)),
            Err(bailout) if bailout.stage == Stage::TraceFinder => {
                debug!("trace finder disabled: {bailout}");
                Ok(None)
            }
            Err(bailout) => Err(bailout.into()),
        }
    }

    fn split(&self, dfa: Dfa) -> Dfa {
        if !self.budgets.enable_node_splitting {
            return dfa;
        }
        match NodeSplitter::new(&dfa, self.budgets.max_dfa_size_after_splitting).split(&dfa) {
            Ok(split) => split,
            Err(bailout) => {
                debug!("node splitting disabled: {bailout}");
                dfa
            }
        }
    }
}
