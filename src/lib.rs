//! A regular expression compiler for ECMAScript-style patterns.
//!
//! Patterns are compiled into a deterministic automaton that tracks capture
//! groups, so matching takes time linear in the input. Constructs a finite
//! automaton cannot express, and patterns exceeding the configured
//! [`BudgetConfig`], are rejected with a [`Bailout`] so that callers can fall
//! back to another engine.
//!
//! ```
//! use dfaregex::Regex;
//!
//! let re = Regex::with_flags(r"(?<word>\w+)@", "i").unwrap();
//! let m = re.captures("mail: Bob@example").unwrap();
//! assert_eq!(m.name("word"), Some(6..9));
//! ```

pub mod ast;
pub mod boundaries;
pub mod budget;
pub mod cache;
pub mod charset;
pub mod compiler;
pub mod dfa;
pub mod error;
pub mod flags;
pub mod machine;
pub mod nfa;
pub mod parser;
pub mod split;
pub mod trace;
pub mod unicode;

pub use budget::BudgetConfig;
pub use cache::PatternCache;
pub use compiler::Compiler;
pub use error::{Bailout, BailoutReason, CompileError, Feature, Limit, ParseErrorKind, Stage, SyntaxError};
pub use flags::{Flags, FlagsError};
pub use machine::{CompiledMatcher, MatchResult};
pub use unicode::{PropertyLookup, StdProperties};

/// Compile `pattern` with the default property table.
pub fn compile(
    pattern: &str,
    flags: Flags,
    budgets: &BudgetConfig,
) -> Result<CompiledMatcher, CompileError> {
    Compiler::new(budgets.clone()).compile(pattern, flags)
}

/// Run `matcher` on `input` from the char offset `start`.
pub fn execute(matcher: &CompiledMatcher, input: &[char], start: usize) -> Option<MatchResult> {
    matcher.execute(input, start)
}

/// A compiled pattern matched against string slices. Offsets are in chars.
#[derive(Debug)]
pub struct Regex {
    matcher: CompiledMatcher,
}

impl Regex {
    pub fn new(pattern: &str) -> Result<Self, CompileError> {
        Self::with_flags(pattern, "")
    }

    /// `flags` is written as after a regular expression literal, e.g. `"im"`.
    pub fn with_flags(pattern: &str, flags: &str) -> Result<Self, CompileError> {
        let flags: Flags = flags.parse()?;
        let matcher = compile(pattern, flags, &BudgetConfig::default())?;
        Ok(Self { matcher })
    }

    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    pub fn find(&self, text: &str) -> Option<std::ops::Range<usize>> {
        self.captures(text).map(|m| m.range())
    }

    pub fn captures(&self, text: &str) -> Option<MatchResult> {
        let chars: Vec<char> = text.chars().collect();
        self.matcher.execute(&chars, 0)
    }
}
