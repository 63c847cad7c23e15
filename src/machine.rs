use std::ops::Range;
use std::sync::Arc;

use crate::boundaries::NO_POSITION;
use crate::dfa::{Accept, Dfa, StateKind, DEAD};
use crate::flags::Flags;
use crate::trace;

/// Character position.
/// Offsets count chars of the input, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sp(usize);

impl Sp {
    fn inc(&mut self) {
        self.0 += 1;
    }
}

/// Capture arrays of the threads of the current state, plus a second buffer
/// for the next state.
#[derive(Debug)]
struct Slots {
    width: usize,
    current: Vec<usize>,
    next: Vec<usize>,
}

impl Slots {
    fn new(groups: usize, slots: usize) -> Self {
        let width = 2 * groups;
        Self {
            width,
            current: vec![NO_POSITION; width * slots.max(1)],
            next: vec![NO_POSITION; width * slots.max(1)],
        }
    }

    fn slot(&self, i: usize) -> &[usize] {
        &self.current[i * self.width..(i + 1) * self.width]
    }
}

/// An executable matcher: the DFA with everything needed to report groups.
#[derive(Debug)]
pub struct CompiledMatcher {
    pattern: String,
    flags: Flags,
    dfa: Dfa,
    names: Arc<[Option<String>]>,
    max_slots: usize,
}

impl CompiledMatcher {
    pub(crate) fn new(
        pattern: &str,
        flags: Flags,
        dfa: Dfa,
        names: &[Option<String>],
    ) -> Self {
        let max_slots = dfa.states.iter().map(|s| s.slots).max().unwrap_or(0);
        Self {
            pattern: pattern.to_string(),
            flags,
            dfa,
            names: names.into(),
            max_slots,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Number of capture groups, including group 0.
    pub fn capture_groups(&self) -> usize {
        self.dfa.groups
    }

    /// Group names by group number. Group 0 and unnamed groups are `None`.
    pub fn group_names(&self) -> &[Option<String>] {
        &self.names
    }

    pub fn state_count(&self) -> usize {
        self.dfa.len()
    }

    /// Whether match results were precomputed for this pattern.
    pub fn is_traced(&self) -> bool {
        self.dfa.is_traced()
    }

    /// Find the leftmost match starting at or after `start`, or exactly at
    /// `start` for sticky patterns.
    pub fn execute(&self, input: &[char], start: usize) -> Option<MatchResult> {
        if start > input.len() {
            return None;
        }
        let dfa = &self.dfa;
        let mut state = dfa.root_start;
        if start > 0 {
            state = dfa.root_mid;
            for &c in &input[start.saturating_sub(dfa.prefix_length)..start] {
                if let Some(t) = dfa.states[state].transition(c as u32) {
                    state = t.target;
                }
            }
            if let StateKind::Prefix { entry } = dfa.states[state].kind {
                state = entry;
            }
        }

        let mut slots = Slots::new(dfa.groups, self.max_slots);
        let mut sp = Sp(start);
        let mut best = None;
        loop {
            let current = &dfa.states[state];
            let Some(&c) = input.get(sp.0) else {
                if let Some(accept) = current.eoi_accept {
                    best = Some(self.resolve(accept, &slots, sp));
                }
                break;
            };
            let Some(t) = current.transition(c as u32) else {
                break;
            };
            if let Some(accept) = t.accept {
                best = Some(self.resolve(accept, &slots, sp));
            }
            if t.target == DEAD {
                break;
            }
            let width = slots.width;
            for (j, update) in t.updates.iter().enumerate() {
                let dst = &mut slots.next[j * width..(j + 1) * width];
                match update.origin {
                    Some(origin) => {
                        let origin = origin as usize;
                        dst.copy_from_slice(&slots.current[origin * width..(origin + 1) * width]);
                    }
                    None => dst.fill(NO_POSITION),
                }
                dfa.boundaries[update.boundaries as usize].apply(dst, sp.0);
            }
            std::mem::swap(&mut slots.current, &mut slots.next);
            state = t.target;
            sp.inc();
        }

        best.map(|captures| MatchResult {
            captures,
            names: Arc::clone(&self.names),
        })
    }

    fn resolve(&self, accept: Accept, slots: &Slots, sp: Sp) -> Vec<usize> {
        match accept {
            Accept::Slot { origin, boundaries } => {
                let mut captures = slots.slot(origin as usize).to_vec();
                self.dfa.boundaries[boundaries as usize].apply(&mut captures, sp.0);
                captures
            }
            Accept::Result(index) => match &self.dfa.results {
                Some(results) => trace::resolve(&results[index as usize], sp.0),
                None => vec![NO_POSITION; slots.width],
            },
        }
    }
}

/// Offsets of a match and of its capture groups, in chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    captures: Vec<usize>,
    names: Arc<[Option<String>]>,
}

impl MatchResult {
    /// The span of group `group`, if it participated in the match.
    pub fn get(&self, group: usize) -> Option<Range<usize>> {
        let start = *self.captures.get(2 * group)?;
        let end = *self.captures.get(2 * group + 1)?;
        if start == NO_POSITION || end == NO_POSITION {
            return None;
        }
        Some(start..end)
    }

    pub fn start(&self) -> usize {
        self.captures[0]
    }

    pub fn end(&self) -> usize {
        self.captures[1]
    }

    pub fn range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Number of groups, including group 0.
    pub fn groups(&self) -> usize {
        self.captures.len() / 2
    }

    pub fn name(&self, name: &str) -> Option<Range<usize>> {
        let group = self
            .names
            .iter()
            .position(|n| n.as_deref() == Some(name))?;
        self.get(group)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Range<usize>>> + '_ {
        (0..self.groups()).map(|g| self.get(g))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{compile, BudgetConfig};

    macro_rules! chars {
        ($s:expr) => {
            &$s.chars().collect::<Vec<_>>()
        };
    }

    fn matcher(pattern: &str, flags: &str) -> CompiledMatcher {
        compile(pattern, flags.parse().unwrap(), &BudgetConfig::default()).unwrap()
    }

    fn find(pattern: &str, flags: &str, input: &str) -> Option<Range<usize>> {
        matcher(pattern, flags)
            .execute(chars!(input), 0)
            .map(|m| m.range())
    }

    #[test]
    fn concat() {
        assert_eq!(find("abc", "", "abc"), Some(0..3));
        assert_eq!(find("abc", "", "xxabcx"), Some(2..5));
        assert_eq!(find("abc", "", ""), None);
        assert_eq!(find("abc", "", "abd"), None);
    }

    #[test]
    fn or() {
        let m = matcher("ab(cd|ef|g)h", "");
        assert!(m.execute(chars!("abcdh"), 0).is_some());
        assert!(m.execute(chars!("abgh"), 0).is_some());
        assert!(m.execute(chars!("abh"), 0).is_none());
        assert!(m.execute(chars!(""), 0).is_none());

        // Leftmost-first, not longest.
        assert_eq!(find("a|ab", "", "ab"), Some(0..1));
        assert_eq!(find("ab|a", "", "ab"), Some(0..2));
    }

    #[test]
    fn question() {
        let m = matcher("a?b", "y");
        assert!(m.execute(chars!("b"), 0).is_some());
        assert!(m.execute(chars!("ab"), 0).is_some());
        assert!(m.execute(chars!("aab"), 0).is_none());
        assert!(m.execute(chars!("xc"), 0).is_none());
        assert!(m.execute(chars!(""), 0).is_none());
    }

    #[test]
    fn star_plus() {
        assert_eq!(find("a*", "", "aaab"), Some(0..3));
        assert_eq!(find("a*", "", "baaa"), Some(0..0));
        assert_eq!(find("a*?", "", "aaa"), Some(0..0));
        assert_eq!(find("a+?", "", "aaa"), Some(0..1));
        assert_eq!(find("ba+", "", "xbaaac"), Some(1..5));
        assert_eq!(find("(?:ab)+c", "", "abababc"), Some(0..7));
    }

    #[test]
    fn captures() {
        let m = matcher("(a)|(b)", "");
        let r = m.execute(chars!("b"), 0).unwrap();
        assert_eq!(r.get(0), Some(0..1));
        assert_eq!(r.get(1), None);
        assert_eq!(r.get(2), Some(0..1));
        assert_eq!(r.groups(), 3);

        // The group did not participate in the last iteration.
        let m = matcher("(?:(a)|b)*", "");
        let r = m.execute(chars!("ab"), 0).unwrap();
        assert_eq!(r.range(), 0..2);
        assert_eq!(r.get(1), None);

        let m = matcher("(a+)(b*)", "");
        let r = m.execute(chars!("xaabbc"), 0).unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![Some(1..5), Some(1..3), Some(3..5)]);
    }

    #[test]
    fn named_groups() {
        let m = matcher(r"(?<year>\d{4})-(?<month>\d{2})", "");
        assert_eq!(
            m.group_names(),
            &[None, Some("year".to_string()), Some("month".to_string())]
        );
        let r = m.execute(chars!("on 2024-05"), 0).unwrap();
        assert_eq!(r.name("year"), Some(3..7));
        assert_eq!(r.name("month"), Some(8..10));
        assert_eq!(r.name("day"), None);
    }

    #[test]
    fn start_index() {
        let m = matcher("a", "");
        assert_eq!(m.execute(chars!("aba"), 1).map(|r| r.range()), Some(2..3));
        assert_eq!(m.execute(chars!("aba"), 3), None);
        assert_eq!(m.execute(chars!("aba"), 4), None);

        let m = matcher("", "");
        assert_eq!(m.execute(chars!("ab"), 2).map(|r| r.range()), Some(2..2));

        let m = matcher("a", "y");
        assert!(m.execute(chars!("ba"), 0).is_none());
        assert_eq!(m.execute(chars!("ba"), 1).map(|r| r.range()), Some(1..2));
    }

    #[test]
    fn look_behind_before_start() {
        let m = matcher("(?<=abc)d", "");
        assert_eq!(m.execute(chars!("abcd"), 0).map(|r| r.range()), Some(3..4));
        assert_eq!(m.execute(chars!("abcd"), 3).map(|r| r.range()), Some(3..4));
        assert_eq!(m.execute(chars!("xbcd"), 3), None);

        let m = matcher("(?<!a)b", "");
        assert_eq!(m.execute(chars!("abb"), 0).map(|r| r.range()), Some(2..3));
        assert_eq!(m.execute(chars!("ab"), 1), None);
    }

    #[test]
    fn anchors() {
        assert_eq!(find("^a", "", "ba"), None);
        assert_eq!(find("^a", "m", "b\na"), Some(2..3));
        assert_eq!(find("a$", "", "a\nb"), None);
        assert_eq!(find("a$", "m", "a\nb"), Some(0..1));
        assert_eq!(find(r"\bfoo\b", "", "afoo foo"), Some(5..8));
        assert_eq!(find(r"\Boo", "", "oo foo"), Some(4..6));

        let m = matcher("^a", "");
        assert_eq!(m.execute(chars!("aa"), 1), None);
    }

    #[test]
    fn look_ahead() {
        assert_eq!(find("a(?=b)", "", "acab"), Some(2..3));
        let m = matcher("(?=(ab))a", "");
        let r = m.execute(chars!("ab"), 0).unwrap();
        assert_eq!(r.range(), 0..1);
        assert_eq!(r.get(1), Some(0..2));
    }

    #[test]
    fn traced_and_tracking_agree() {
        let traced = BudgetConfig::default();
        let tracking = BudgetConfig::default().with_trace_finder(false);
        for (pattern, input) in [
            ("(a)|(b)", "xb"),
            ("a{0,3}", "aaaa"),
            ("(a)?(b)?c", "bc"),
            ("x(?:(y)|z)w", "xzw xyw"),
        ] {
            let a = compile(pattern, Flags::empty(), &traced).unwrap();
            let b = compile(pattern, Flags::empty(), &tracking).unwrap();
            assert!(a.is_traced());
            assert!(!b.is_traced());
            assert_eq!(a.execute(chars!(input), 0), b.execute(chars!(input), 0));
        }
    }
}
