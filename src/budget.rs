//! Engineering limits applied while compiling a pattern.
//!
//! Every limit is checked by the stage that produces the corresponding
//! structure. Exceeding one of the hard limits aborts compilation with a
//! [`Bailout`](crate::Bailout); the trace finder and node splitter limits only
//! disable their optimization.

/// Upper bound for the node, state and transition indices, which are stored
/// as `i16`-sized values.
pub const MAX_INDEX: usize = i16::MAX as usize;

/// Capture group boundaries are addressed with a signed byte.
pub const MAX_CAPTURE_GROUPS: usize = 127;

/// Deepest group nesting the parser descends into.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Per-state capture slots are addressed with a byte.
pub const MAX_NFA_STATES_PER_DFA_STATE: usize = 255;

/// Result indices are a byte, with `u8::MAX` meaning "no result".
pub const MAX_TRACE_FINDER_RESULTS: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BudgetConfig {
    /// Nodes in the syntax tree, including copies made by counted repetitions.
    pub max_parse_tree_size: usize,
    /// Distinct NFA states.
    pub max_nfa_size: usize,
    /// DFA states produced by subset construction.
    pub max_dfa_size: usize,
    /// DFA states after node splitting.
    pub max_dfa_size_after_splitting: usize,
    /// Largest bound accepted in `{n}`, `{n,}` and `{n,m}`.
    pub max_counted_repetition: usize,
    pub max_capture_groups: usize,
    /// Groups and look-arounds open at the same time.
    pub max_nesting_depth: usize,
    pub max_nfa_states_per_dfa_state: usize,
    pub trace_finder_max_results: usize,
    pub enable_node_splitting: bool,
    pub enable_trace_finder: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_parse_tree_size: 4_000,
            max_nfa_size: 3_500,
            max_dfa_size: 3_000,
            max_dfa_size_after_splitting: 10_000,
            max_counted_repetition: 40,
            max_capture_groups: MAX_CAPTURE_GROUPS,
            max_nesting_depth: 64,
            max_nfa_states_per_dfa_state: MAX_NFA_STATES_PER_DFA_STATE,
            trace_finder_max_results: MAX_TRACE_FINDER_RESULTS,
            enable_node_splitting: false,
            enable_trace_finder: true,
        }
    }
}

impl BudgetConfig {
    /// Clamp every limit to what the compiled representation can index.
    pub fn validate(mut self) -> Self {
        self.max_parse_tree_size = self.max_parse_tree_size.min(MAX_INDEX);
        self.max_nfa_size = self.max_nfa_size.min(MAX_INDEX);
        self.max_dfa_size = self.max_dfa_size.min(MAX_INDEX);
        self.max_dfa_size_after_splitting = self.max_dfa_size_after_splitting.min(MAX_INDEX);
        self.max_capture_groups = self.max_capture_groups.min(MAX_CAPTURE_GROUPS);
        self.max_nesting_depth = self.max_nesting_depth.min(MAX_NESTING_DEPTH);
        self.max_nfa_states_per_dfa_state = self
            .max_nfa_states_per_dfa_state
            .min(MAX_NFA_STATES_PER_DFA_STATE);
        self.trace_finder_max_results = self
            .trace_finder_max_results
            .min(MAX_TRACE_FINDER_RESULTS);
        self
    }

    pub fn with_node_splitting(mut self, enabled: bool) -> Self {
        self.enable_node_splitting = enabled;
        self
    }

    pub fn with_trace_finder(mut self, enabled: bool) -> Self {
        self.enable_trace_finder = enabled;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate() {
        let budgets = BudgetConfig {
            max_parse_tree_size: 1_000_000,
            max_capture_groups: 1_000,
            max_nesting_depth: 10_000,
            max_nfa_states_per_dfa_state: 1_000,
            trace_finder_max_results: 255,
            ..BudgetConfig::default()
        }
        .validate();
        assert_eq!(budgets.max_parse_tree_size, MAX_INDEX);
        assert_eq!(budgets.max_capture_groups, 127);
        assert_eq!(budgets.max_nesting_depth, MAX_NESTING_DEPTH);
        assert_eq!(budgets.max_nfa_states_per_dfa_state, 255);
        assert_eq!(budgets.trace_finder_max_results, 254);

        assert_eq!(BudgetConfig::default().validate(), BudgetConfig::default());
    }
}
