use std::fmt;

use thiserror::Error;

use crate::flags::FlagsError;

/// What went wrong while reading a pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unmatched ')'")]
    UnexpectedParenthesis,
    #[error("unterminated group")]
    UnclosedParenthesis,
    #[error("unterminated character class")]
    UnclosedCharacterClass,
    #[error("nothing to repeat")]
    NothingToRepeat,
    #[error("numbers out of order in {{}} quantifier")]
    InvalidQuantifierRange,
    #[error("incomplete quantifier")]
    IncompleteQuantifier,
    #[error("lone quantifier brackets")]
    LoneQuantifierBrackets,
    #[error("invalid escape character {0:?}")]
    InvalidEscape(char),
    #[error("\\ at end of pattern")]
    TrailingBackslash,
    #[error("invalid unicode escape")]
    InvalidUnicodeEscape,
    #[error("invalid group")]
    InvalidGroup,
    #[error("invalid capture group name")]
    InvalidGroupName,
    #[error("duplicate capture group name {0:?}")]
    DuplicateGroupName(String),
    #[error("invalid named capture referenced: {0:?}")]
    UndefinedGroupName(String),
    #[error("range out of order in character class")]
    InvalidCharacterClassRange,
    #[error("invalid character class escape in range")]
    InvalidClassEscapeInRange,
    #[error("invalid property name {0:?}")]
    InvalidPropertyName(String),
}

/// A malformed pattern. `position` is a character offset into the pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid regular expression at position {position}: {kind}")]
pub struct SyntaxError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

/// Compilation stage that gave up on a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    Nfa,
    Dfa,
    TraceFinder,
    NodeSplitter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Nfa => "nfa",
            Stage::Dfa => "dfa",
            Stage::TraceFinder => "trace-finder",
            Stage::NodeSplitter => "node-splitter",
        };
        f.write_str(name)
    }
}

/// Names a [`BudgetConfig`](crate::BudgetConfig) limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    MaxParseTreeSize,
    MaxNfaSize,
    MaxDfaSize,
    MaxDfaSizeAfterSplitting,
    MaxCountedRepetition,
    MaxCaptureGroups,
    MaxNestingDepth,
    MaxNfaStatesPerDfaState,
    TraceFinderMaxResults,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limit::MaxParseTreeSize => "max_parse_tree_size",
            Limit::MaxNfaSize => "max_nfa_size",
            Limit::MaxDfaSize => "max_dfa_size",
            Limit::MaxDfaSizeAfterSplitting => "max_dfa_size_after_splitting",
            Limit::MaxCountedRepetition => "max_counted_repetition",
            Limit::MaxCaptureGroups => "max_capture_groups",
            Limit::MaxNestingDepth => "max_nesting_depth",
            Limit::MaxNfaStatesPerDfaState => "max_nfa_states_per_dfa_state",
            Limit::TraceFinderMaxResults => "trace_finder_max_results",
        };
        f.write_str(name)
    }
}

/// Pattern constructs that a finite automaton cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    BackReference,
    NegativeLookAhead,
    NonLiteralLookBehind,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::BackReference => "back-reference",
            Feature::NegativeLookAhead => "negative look-ahead",
            Feature::NonLiteralLookBehind => "non-literal look-behind",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BailoutReason {
    #[error("exceeded {0}")]
    Limit(Limit),
    #[error("unsupported {0}")]
    Unsupported(Feature),
}

/// A valid pattern this engine declines to compile. Callers are expected to
/// fall back to a different matching strategy.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("bailout in {stage} stage: {reason}")]
pub struct Bailout {
    pub stage: Stage,
    pub reason: BailoutReason,
}

impl Bailout {
    pub(crate) fn limit(stage: Stage, limit: Limit) -> Self {
        Self {
            stage,
            reason: BailoutReason::Limit(limit),
        }
    }

    pub(crate) fn unsupported(stage: Stage, feature: Feature) -> Self {
        Self {
            stage,
            reason: BailoutReason::Unsupported(feature),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Flags(#[from] FlagsError),
    #[error(transparent)]
    Bailout(#[from] Bailout),
}

impl CompileError {
    /// Returns true if the pattern is valid but was not compiled.
    pub fn is_bailout(&self) -> bool {
        matches!(self, CompileError::Bailout(_))
    }

    pub fn is_syntax_error(&self) -> bool {
        !self.is_bailout()
    }

    pub fn bailout(&self) -> Option<&Bailout> {
        match self {
            CompileError::Bailout(bailout) => Some(bailout),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let err = CompileError::from(SyntaxError {
            position: 3,
            kind: ParseErrorKind::NothingToRepeat,
        });
        assert_eq!(
            err.to_string(),
            "invalid regular expression at position 3: nothing to repeat"
        );
        assert!(err.is_syntax_error());

        let err = CompileError::from(Bailout::limit(Stage::Parse, Limit::MaxParseTreeSize));
        assert_eq!(
            err.to_string(),
            "bailout in parse stage: exceeded max_parse_tree_size"
        );
        assert!(err.is_bailout());
        assert!(!err.to_string().contains("invalid"));

        let err = CompileError::from(Bailout::unsupported(Stage::Nfa, Feature::BackReference));
        assert_eq!(err.to_string(), "bailout in nfa stage: unsupported back-reference");
    }
}
