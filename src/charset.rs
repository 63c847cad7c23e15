//! Sets of Unicode code points, the building block of character classes.
//!
//! A [`CodePointSet`] is a list of inclusive ranges. Adding to a set only
//! appends; sorting and merging is deferred until a query needs the
//! canonical form. Two sets are equal if and only if their normalized range
//! lists are equal.

use std::borrow::Cow;
use std::cmp::{max, min};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex_syntax::hir::{ClassUnicode, ClassUnicodeRange};
use thiserror::Error;

pub const MIN_CODE_POINT: u32 = 0;
pub const MAX_CODE_POINT: u32 = 0x10FFFF;

// No code point above this has a case mapping.
const MAX_CASED_CODE_POINT: u32 = 0x1FFFF;

/// An inclusive range of code points, ordered by `lo`. Always `lo <= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodePointRange {
    lo: u32,
    hi: u32,
}

impl CodePointRange {
    /// The range between `a` and `b`, in either order.
    pub const fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    /// `None` unless `lo <= hi <= MAX_CODE_POINT`.
    pub const fn try_new(lo: u32, hi: u32) -> Option<Self> {
        if lo <= hi && hi <= MAX_CODE_POINT {
            Some(Self { lo, hi })
        } else {
            None
        }
    }

    pub const fn single(c: u32) -> Self {
        Self { lo: c, hi: c }
    }

    pub const fn lo(self) -> u32 {
        self.lo
    }

    pub const fn hi(self) -> u32 {
        self.hi
    }

    pub const fn contains(self, c: u32) -> bool {
        self.lo <= c && c <= self.hi
    }

    pub const fn is_single(self) -> bool {
        self.lo == self.hi
    }

    pub const fn len(self) -> u32 {
        self.hi - self.lo + 1
    }

    fn intersects(self, other: Self) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    fn adjacent(self, other: Self) -> bool {
        self.hi.checked_add(1) == Some(other.lo) || other.hi.checked_add(1) == Some(self.lo)
    }

    fn intersection(self, other: Self) -> Option<Self> {
        let lo = max(self.lo, other.lo);
        let hi = min(self.hi, other.hi);
        (lo <= hi).then_some(Self { lo, hi })
    }

    fn expand(self, other: Self) -> Self {
        Self {
            lo: min(self.lo, other.lo),
            hi: max(self.hi, other.hi),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("code point set is frozen")]
pub struct FrozenError;

#[derive(Debug, Clone)]
pub struct CodePointSet {
    ranges: Vec<CodePointRange>,
    normalized: bool,
    frozen: bool,
}

impl Default for CodePointSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted, disjoint and no two ranges adjacent.
fn is_normalized(ranges: &[CodePointRange]) -> bool {
    ranges
        .windows(2)
        .all(|w| w[0].hi < w[1].lo && !w[0].adjacent(w[1]))
}

fn normalized(ranges: &[CodePointRange]) -> Vec<CodePointRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();
    let mut out: Vec<CodePointRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match out.last_mut() {
            Some(cur) if cur.intersects(range) || cur.adjacent(range) => *cur = cur.expand(range),
            _ => out.push(range),
        }
    }
    out
}

impl CodePointSet {
    pub fn new() -> Self {
        Self {
            ranges: Vec::new(),
            normalized: true,
            frozen: false,
        }
    }

    pub fn full() -> Self {
        Self::from_ranges([CodePointRange::new(MIN_CODE_POINT, MAX_CODE_POINT)])
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = CodePointRange>) -> Self {
        let ranges: Vec<_> = ranges.into_iter().collect();
        let normalized = is_normalized(&ranges);
        Self {
            ranges,
            normalized,
            frozen: false,
        }
    }

    pub fn from_char(c: char) -> Self {
        Self::from_ranges([CodePointRange::single(c as u32)])
    }

    pub fn from_chars(chars: &[char]) -> Self {
        Self::from_ranges(chars.iter().map(|&c| CodePointRange::single(c as u32)))
    }

    pub fn add_range(&mut self, range: CodePointRange) -> Result<&mut Self, FrozenError> {
        if self.frozen {
            return Err(FrozenError);
        }
        self.ranges.push(range);
        self.normalized = false;
        Ok(self)
    }

    pub fn add_set(&mut self, other: &CodePointSet) -> Result<&mut Self, FrozenError> {
        if self.frozen {
            return Err(FrozenError);
        }
        self.ranges.extend_from_slice(&other.ranges());
        self.normalized = false;
        Ok(self)
    }

    pub fn normalize(&mut self) {
        if !self.normalized {
            self.ranges = normalized(&self.ranges);
            self.normalized = true;
        }
    }

    /// Normalize and make immutable. Frozen sets answer queries without copying.
    pub fn freeze(mut self) -> Self {
        self.normalize();
        self.ranges.shrink_to_fit();
        self.frozen = true;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The normalized range list.
    pub fn ranges(&self) -> Cow<'_, [CodePointRange]> {
        if self.normalized {
            Cow::Borrowed(&self.ranges)
        } else {
            Cow::Owned(normalized(&self.ranges))
        }
    }

    pub fn contains(&self, c: u32) -> bool {
        let ranges = self.ranges();
        let i = ranges.partition_point(|r| r.hi < c);
        ranges.get(i).is_some_and(|r| r.contains(c))
    }

    pub fn matches_nothing(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn matches_something(&self) -> bool {
        !self.matches_nothing()
    }

    pub fn matches_everything(&self) -> bool {
        let ranges = self.ranges();
        ranges.len() == 1 && ranges[0].lo == MIN_CODE_POINT && ranges[0].hi == MAX_CODE_POINT
    }

    pub fn matches_single_char(&self) -> bool {
        let ranges = self.ranges();
        ranges.len() == 1 && ranges[0].is_single()
    }

    pub fn create_inverse(&self) -> CodePointSet {
        let mut inverse = Vec::new();
        let mut next = MIN_CODE_POINT;
        for r in self.ranges().iter() {
            if r.lo > next {
                inverse.push(CodePointRange::new(next, r.lo - 1));
            }
            next = r.hi + 1;
        }
        if next <= MAX_CODE_POINT {
            inverse.push(CodePointRange::new(next, MAX_CODE_POINT));
        }
        Self {
            ranges: inverse,
            normalized: true,
            frozen: false,
        }
    }

    pub fn create_intersection(&self, other: &CodePointSet) -> CodePointSet {
        let (a, b) = (self.ranges(), other.ranges());
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if let Some(r) = a[i].intersection(b[j]) {
                out.push(r);
            }
            if a[i].hi < b[j].hi {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self {
            ranges: out,
            normalized: true,
            frozen: false,
        }
    }

    pub fn create_union(&self, other: &CodePointSet) -> CodePointSet {
        let mut ranges = self.ranges().into_owned();
        ranges.extend_from_slice(&other.ranges());
        Self {
            ranges: normalized(&ranges),
            normalized: true,
            frozen: false,
        }
    }

    /// Close the set under case-insensitive equivalence.
    ///
    /// With `unicode`, characters are equivalent if they have the same
    /// simple case folding. Otherwise they are equivalent if they
    /// [`canonicalize`] to the same character.
    pub fn case_fold(&self, unicode: bool) -> CodePointSet {
        let ranges = self.ranges();
        let mut folded = ranges.to_vec();
        if unicode {
            folded.extend(simple_case_fold(&ranges));
        } else {
            let classes = case_classes();
            for r in ranges.iter().filter(|r| r.lo <= MAX_CASED_CODE_POINT) {
                let cased = (r.lo..=min(r.hi, MAX_CASED_CODE_POINT)).filter_map(char::from_u32);
                for c in cased {
                    let Some(members) = classes.get(&canonicalize(c)) else {
                        continue;
                    };
                    folded.extend(
                        members
                            .iter()
                            .map(|&m| m as u32)
                            .filter(|&m| !r.contains(m))
                            .map(CodePointRange::single),
                    );
                }
            }
        }
        Self {
            ranges: normalized(&folded),
            normalized: true,
            frozen: false,
        }
    }
}

impl PartialEq for CodePointSet {
    fn eq(&self, other: &Self) -> bool {
        self.ranges() == other.ranges()
    }
}

impl Eq for CodePointSet {}

impl Hash for CodePointSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ranges().hash(state);
    }
}

fn single(mut it: impl Iterator<Item = char>) -> Option<char> {
    let c = it.next()?;
    it.next().is_none().then_some(c)
}

/// Case canonicalization used for `i` patterns without `u`.
///
/// A character maps to its uppercase form if that is a single character,
/// except that non-ASCII characters never map into ASCII.
pub fn canonicalize(c: char) -> char {
    match single(c.to_uppercase()) {
        Some(u) if (c as u32) >= 128 && (u as u32) < 128 => c,
        Some(u) => u,
        None => c,
    }
}

/// Every class of two or more characters sharing a canonical form, keyed by
/// that form.
fn case_classes() -> &'static HashMap<char, Vec<char>> {
    static CLASSES: OnceLock<HashMap<char, Vec<char>>> = OnceLock::new();
    CLASSES.get_or_init(|| {
        let mut classes: HashMap<char, Vec<char>> = HashMap::new();
        for c in (MIN_CODE_POINT..=MAX_CASED_CODE_POINT).filter_map(char::from_u32) {
            classes.entry(canonicalize(c)).or_default().push(c);
        }
        classes.retain(|_, members| members.len() > 1);
        classes
    })
}

/// The simple case folding closure of `ranges`. Surrogates have no case
/// and are left out.
fn simple_case_fold(ranges: &[CodePointRange]) -> Vec<CodePointRange> {
    let scalars = ranges.iter().flat_map(|r| {
        [(r.lo, min(r.hi, 0xD7FF)), (max(r.lo, 0xE000), r.hi)]
            .into_iter()
            .filter(|(lo, hi)| lo <= hi)
            .filter_map(|(lo, hi)| {
                Some(ClassUnicodeRange::new(char::from_u32(lo)?, char::from_u32(hi)?))
            })
    });
    let mut class = ClassUnicode::new(scalars);
    if class.try_case_fold_simple().is_err() {
        return Vec::new();
    }
    class
        .iter()
        .map(|r| CodePointRange::new(r.start() as u32, r.end() as u32))
        .collect()
}

pub fn digits() -> CodePointSet {
    CodePointSet::from_ranges([CodePointRange::new('0' as u32, '9' as u32)])
}

pub fn word_chars() -> CodePointSet {
    CodePointSet::from_ranges([
        CodePointRange::new('0' as u32, '9' as u32),
        CodePointRange::new('A' as u32, 'Z' as u32),
        CodePointRange::single('_' as u32),
        CodePointRange::new('a' as u32, 'z' as u32),
    ])
}

pub fn white_space() -> CodePointSet {
    CodePointSet::from_ranges([
        CodePointRange::new(0x09, 0x0D),
        CodePointRange::single(0x20),
        CodePointRange::single(0xA0),
        CodePointRange::single(0x1680),
        CodePointRange::new(0x2000, 0x200A),
        CodePointRange::new(0x2028, 0x2029),
        CodePointRange::single(0x202F),
        CodePointRange::single(0x205F),
        CodePointRange::single(0x3000),
        CodePointRange::single(0xFEFF),
    ])
}

pub fn line_terminators() -> CodePointSet {
    CodePointSet::from_ranges([
        CodePointRange::single(0x0A),
        CodePointRange::single(0x0D),
        CodePointRange::new(0x2028, 0x2029),
    ])
}

/// The set matched by `.`.
pub fn dot(dot_all: bool) -> CodePointSet {
    if dot_all {
        CodePointSet::full()
    } else {
        line_terminators().create_inverse()
    }
}
