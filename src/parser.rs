use std::ops::Range;

use crate::ast::{AssertionKind, Group, LookAround, NodeId, NodeKind, RegexAst};
use crate::budget::BudgetConfig;
use crate::charset::{self, CodePointRange, CodePointSet, MAX_CODE_POINT};
use crate::error::{Bailout, CompileError, Limit, ParseErrorKind, Stage, SyntaxError};
use crate::flags::Flags;
use crate::unicode::PropertyLookup;

type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quantifier {
    min: u32,
    max: Option<u32>,
    greedy: bool,
}

enum ClassAtom {
    Char(u32),
    Set(CodePointSet),
}

/// Count capturing groups and collect their names ahead of parsing, so that
/// escapes can refer to groups defined later in the pattern.
fn prescan(chars: &[char]) -> Vec<Option<String>> {
    let mut names = vec![None];
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '(' if !in_class => {
                if chars.get(i + 1) != Some(&'?') {
                    names.push(None);
                } else if chars.get(i + 2) == Some(&'<')
                    && !matches!(chars.get(i + 3).copied(), Some('=' | '!'))
                {
                    let name: String = chars[i + 3..].iter().take_while(|&&c| c != '>').collect();
                    names.push(Some(name));
                }
            }
            _ => {}
        }
        i += 1;
    }
    names
}

fn is_syntax_char(c: char) -> bool {
    matches!(
        c,
        '^' | '$' | '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '/'
    )
}

fn is_identifier_char(c: char, first: bool) -> bool {
    match c {
        '$' | '_' => true,
        '\u{200C}' | '\u{200D}' => !first,
        c if first => c.is_alphabetic(),
        c => c.is_alphanumeric(),
    }
}

fn class_escape(c: char) -> CodePointSet {
    let set = match c.to_ascii_lowercase() {
        'd' => charset::digits(),
        's' => charset::white_space(),
        _ => charset::word_chars(),
    };
    if c.is_ascii_uppercase() {
        set.create_inverse()
    } else {
        set
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    flags: Flags,
    budgets: &'a BudgetConfig,
    properties: &'a dyn PropertyLookup,
    ast: RegexAst,
    /// Group names as found by the prescan, indexed by group number.
    prescanned: Vec<Option<String>>,
    names: Vec<Option<String>>,
    /// Highest capture group number allocated so far.
    next_group: u16,
    /// Groups currently open.
    depth: usize,
}

/// Parse a regular expression pattern into an abstract syntax tree (AST).
pub fn parse(
    pattern: &str,
    flags: Flags,
    budgets: &BudgetConfig,
    properties: &dyn PropertyLookup,
) -> Result<RegexAst> {
    let chars: Vec<char> = pattern.chars().collect();
    let prescanned = prescan(&chars);
    let mut parser = Parser {
        chars,
        pos: 0,
        flags,
        budgets,
        properties,
        ast: RegexAst::new(budgets.max_parse_tree_size),
        names: vec![None; prescanned.len()],
        prescanned,
        next_group: 0,
        depth: 0,
    };
    parser.parse_pattern()?;
    Ok(parser.ast)
}

impl<'a> Parser<'a> {
    fn error(&self, position: usize, kind: ParseErrorKind) -> CompileError {
        SyntaxError { position, kind }.into()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        let matched = self.peek() == Some(c);
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let n = s.chars().count();
        let matched = self
            .chars
            .get(self.pos..self.pos + n)
            .is_some_and(|window| window.iter().copied().eq(s.chars()));
        if matched {
            self.pos += n;
        }
        matched
    }

    fn has_named_groups(&self) -> bool {
        self.prescanned.iter().any(Option::is_some)
    }

    fn parse_pattern(&mut self) -> Result<()> {
        let alternatives = self.parse_disjunction()?;
        if self.peek().is_some() {
            return Err(self.error(self.pos, ParseErrorKind::UnexpectedParenthesis));
        }
        let root = self.ast.add(NodeKind::Group(Group {
            alternatives,
            capturing: true,
            group_number: 0,
            is_loop: false,
            expanded_quantifier: false,
            enclosed_captures: 1..self.next_group + 1,
        }))?;
        let mut names = std::mem::take(&mut self.names);
        names.resize(self.next_group as usize + 1, None);
        self.ast.set_groups(names);
        self.ast.link(root)?;
        Ok(())
    }

    /// Returns the `Sequence` node of each alternative.
    fn parse_disjunction(&mut self) -> Result<Vec<NodeId>> {
        let mut alternatives = vec![self.parse_alternative()?];
        while self.eat('|') {
            alternatives.push(self.parse_alternative()?);
        }
        Ok(alternatives)
    }

    fn parse_alternative(&mut self) -> Result<NodeId> {
        let mut terms = Vec::new();
        while !matches!(self.peek(), None | Some('|' | ')')) {
            self.parse_term(&mut terms)?;
        }
        Ok(self.ast.add(NodeKind::Sequence(terms))?)
    }

    fn parse_term(&mut self, terms: &mut Vec<NodeId>) -> Result<()> {
        let start = self.pos;
        let first_group = self.next_group + 1;
        let Some(c) = self.next() else {
            return Ok(());
        };
        let (atom, quantifiable) = match c {
            '^' => (self.assertion(AssertionKind::Start)?, false),
            '$' => (self.assertion(AssertionKind::End)?, false),
            '\\' => match self.peek() {
                Some('b') => {
                    self.pos += 1;
                    (self.assertion(AssertionKind::WordBoundary)?, false)
                }
                Some('B') => {
                    self.pos += 1;
                    (self.assertion(AssertionKind::NotWordBoundary)?, false)
                }
                _ => (self.parse_atom_escape(start)?, true),
            },
            '(' => self.parse_group(start)?,
            '.' => (self.class(charset::dot(self.flags.dot_all()), false)?, true),
            '[' => (self.parse_class(start)?, true),
            '*' | '+' | '?' => return Err(self.error(start, ParseErrorKind::NothingToRepeat)),
            '{' if self.flags.unicode() => {
                return Err(self.error(start, ParseErrorKind::NothingToRepeat))
            }
            '}' | ']' if self.flags.unicode() => {
                return Err(self.error(start, ParseErrorKind::LoneQuantifierBrackets))
            }
            '{' => {
                self.pos = start;
                if self.parse_braces().is_some() {
                    return Err(self.error(start, ParseErrorKind::NothingToRepeat));
                }
                self.pos = start + 1;
                (self.literal('{' as u32)?, true)
            }
            c => (self.literal(c as u32)?, true),
        };

        let quantifier_start = self.pos;
        match self.parse_quantifier()? {
            Some(_) if !quantifiable => {
                Err(self.error(quantifier_start, ParseErrorKind::NothingToRepeat))
            }
            Some(q) => self.quantify(atom, first_group..self.next_group + 1, q, terms),
            None => {
                terms.push(atom);
                Ok(())
            }
        }
    }

    fn assertion(&mut self, kind: AssertionKind) -> Result<NodeId> {
        Ok(self.ast.add(NodeKind::Assertion(kind))?)
    }

    fn class(&mut self, set: CodePointSet, fold: bool) -> Result<NodeId> {
        let set = if fold && self.flags.ignore_case() {
            set.case_fold(self.flags.unicode())
        } else {
            set
        };
        Ok(self.ast.add(NodeKind::CharacterClass(set.freeze()))?)
    }

    fn literal(&mut self, cp: u32) -> Result<NodeId> {
        self.class(CodePointSet::from_ranges([CodePointRange::single(cp)]), true)
    }

    fn parse_decimal(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
            value = value.saturating_mul(10).saturating_add(d);
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    /// `{n}`, `{n,}` or `{n,m}`. Leaves the position untouched if the text
    /// is not a braced quantifier.
    fn parse_braces(&mut self) -> Option<(u32, Option<u32>)> {
        let save = self.pos;
        let parsed = self.try_parse_braces();
        if parsed.is_none() {
            self.pos = save;
        }
        parsed
    }

    fn try_parse_braces(&mut self) -> Option<(u32, Option<u32>)> {
        if !self.eat('{') {
            return None;
        }
        let min = self.parse_decimal()?;
        let max = if !self.eat(',') {
            Some(min)
        } else if self.peek() == Some('}') {
            None
        } else {
            Some(self.parse_decimal()?)
        };
        self.eat('}').then_some((min, max))
    }

    fn parse_quantifier(&mut self) -> Result<Option<Quantifier>> {
        let start = self.pos;
        let (min, max, counted) = match self.peek() {
            Some('*') => (0, None, false),
            Some('+') => (1, None, false),
            Some('?') => (0, Some(1), false),
            Some('{') => match self.parse_braces() {
                Some((min, max)) => (min, max, true),
                None if self.flags.unicode() => {
                    return Err(self.error(start, ParseErrorKind::IncompleteQuantifier))
                }
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        if !counted {
            self.pos += 1;
        }
        if max.is_some_and(|max| max < min) {
            return Err(self.error(start, ParseErrorKind::InvalidQuantifierRange));
        }
        let greedy = !self.eat('?');
        if counted && max.unwrap_or(min) as usize > self.budgets.max_counted_repetition {
            return Err(Bailout::limit(Stage::Parse, Limit::MaxCountedRepetition).into());
        }
        Ok(Some(Quantifier { min, max, greedy }))
    }

    /// The first use of an atom is the atom itself, later uses are copies.
    fn instance(&mut self, atom: NodeId, used: &mut bool) -> Result<NodeId> {
        if std::mem::replace(used, true) {
            Ok(self.ast.copy_subtree(atom)?)
        } else {
            Ok(atom)
        }
    }

    fn sequence(&mut self, terms: Vec<NodeId>) -> Result<NodeId> {
        Ok(self.ast.add(NodeKind::Sequence(terms))?)
    }

    fn quantifier_group(
        &mut self,
        alternatives: Vec<NodeId>,
        is_loop: bool,
        captures: Range<u16>,
    ) -> Result<NodeId> {
        Ok(self.ast.add(NodeKind::Group(Group {
            alternatives,
            capturing: false,
            group_number: 0,
            is_loop,
            expanded_quantifier: !is_loop,
            enclosed_captures: captures,
        }))?)
    }

    /// A group that either runs `terms` or passes through, in greedy or lazy
    /// order.
    fn optional(
        &mut self,
        terms: Vec<NodeId>,
        greedy: bool,
        is_loop: bool,
        captures: Range<u16>,
    ) -> Result<NodeId> {
        let body = self.sequence(terms)?;
        let empty = self.sequence(Vec::new())?;
        let alternatives = if greedy {
            vec![body, empty]
        } else {
            vec![empty, body]
        };
        self.quantifier_group(alternatives, is_loop, captures)
    }

    /// Desugar `atom` under `q` and append the result to `terms`.
    ///
    /// Mandatory iterations become plain copies, wrapped in a group when
    /// the atom holds captures so each iteration resets them. An unbounded
    /// tail is a loop group, a bounded one nests optional groups.
    fn quantify(
        &mut self,
        atom: NodeId,
        captures: Range<u16>,
        q: Quantifier,
        terms: &mut Vec<NodeId>,
    ) -> Result<()> {
        if q.max == Some(0) {
            return Ok(());
        }
        let mut used = false;
        for _ in 0..q.min {
            let copy = self.instance(atom, &mut used)?;
            let term = if captures.is_empty() {
                copy
            } else {
                let body = self.sequence(vec![copy])?;
                self.quantifier_group(vec![body], false, captures.clone())?
            };
            terms.push(term);
        }

        match q.max {
            None => {
                let body = self.instance(atom, &mut used)?;
                let group = self.optional(vec![body], q.greedy, true, captures)?;
                terms.push(group);
            }
            Some(max) => {
                let bodies = (q.min..max)
                    .map(|_| self.instance(atom, &mut used))
                    .collect::<Result<Vec<_>>>()?;
                let mut inner = None;
                for body in bodies.into_iter().rev() {
                    let mut seq = vec![body];
                    seq.extend(inner);
                    inner = Some(self.optional(seq, q.greedy, false, captures.clone())?);
                }
                terms.extend(inner);
            }
        }
        Ok(())
    }

    fn close_group(&mut self, start: usize) -> Result<()> {
        if self.eat(')') {
            Ok(())
        } else {
            Err(self.error(start, ParseErrorKind::UnclosedParenthesis))
        }
    }

    /// Returns the node and whether it may be quantified.
    fn parse_group(&mut self, start: usize) -> Result<(NodeId, bool)> {
        if self.depth >= self.budgets.max_nesting_depth {
            return Err(Bailout::limit(Stage::Parse, Limit::MaxNestingDepth).into());
        }
        self.depth += 1;
        let group = self.parse_group_body(start);
        self.depth -= 1;
        group
    }

    fn parse_group_body(&mut self, start: usize) -> Result<(NodeId, bool)> {
        let unicode = self.flags.unicode();
        if self.eat_str("?=") {
            Ok((self.parse_look_around(start, false, false)?, !unicode))
        } else if self.eat_str("?!") {
            Ok((self.parse_look_around(start, false, true)?, !unicode))
        } else if self.eat_str("?<=") {
            Ok((self.parse_look_around(start, true, false)?, false))
        } else if self.eat_str("?<!") {
            Ok((self.parse_look_around(start, true, true)?, false))
        } else if self.eat_str("?:") {
            let first = self.next_group + 1;
            let alternatives = self.parse_disjunction()?;
            self.close_group(start)?;
            let group = self.ast.add(NodeKind::Group(Group {
                alternatives,
                capturing: false,
                group_number: 0,
                is_loop: false,
                expanded_quantifier: false,
                enclosed_captures: first..self.next_group + 1,
            }))?;
            Ok((group, true))
        } else if self.eat_str("?<") {
            let name = self.parse_group_name()?;
            Ok((self.parse_capturing(start, Some(name))?, true))
        } else if self.peek() == Some('?') {
            Err(self.error(start, ParseErrorKind::InvalidGroup))
        } else {
            Ok((self.parse_capturing(start, None)?, true))
        }
    }

    fn parse_group_name(&mut self) -> Result<String> {
        let start = self.pos;
        let mut name = String::new();
        loop {
            match self.next() {
                Some('>') if !name.is_empty() => return Ok(name),
                Some(c) if is_identifier_char(c, name.is_empty()) => name.push(c),
                _ => return Err(self.error(start, ParseErrorKind::InvalidGroupName)),
            }
        }
    }

    fn parse_capturing(&mut self, start: usize, name: Option<String>) -> Result<NodeId> {
        if self.next_group as usize >= self.budgets.max_capture_groups {
            return Err(Bailout::limit(Stage::Parse, Limit::MaxCaptureGroups).into());
        }
        self.next_group += 1;
        let number = self.next_group;
        if let Some(name) = &name {
            if self.names.iter().flatten().any(|n| n == name) {
                return Err(self.error(start, ParseErrorKind::DuplicateGroupName(name.clone())));
            }
        }
        if self.names.len() <= number as usize {
            self.names.resize(number as usize + 1, None);
        }
        self.names[number as usize] = name;

        let alternatives = self.parse_disjunction()?;
        self.close_group(start)?;
        Ok(self.ast.add(NodeKind::Group(Group {
            alternatives,
            capturing: true,
            group_number: number,
            is_loop: false,
            expanded_quantifier: false,
            enclosed_captures: number + 1..self.next_group + 1,
        }))?)
    }

    fn parse_look_around(&mut self, start: usize, behind: bool, negated: bool) -> Result<NodeId> {
        let first = self.next_group + 1;
        let alternatives = self.parse_disjunction()?;
        self.close_group(start)?;
        let group = self.ast.add(NodeKind::Group(Group {
            alternatives,
            capturing: false,
            group_number: 0,
            is_loop: false,
            expanded_quantifier: false,
            enclosed_captures: first..self.next_group + 1,
        }))?;
        let match_found = self.ast.add(NodeKind::MatchFound)?;
        let look_around = LookAround {
            group,
            negated,
            match_found,
        };
        let kind = if behind {
            NodeKind::LookBehind(look_around)
        } else {
            NodeKind::LookAhead(look_around)
        };
        Ok(self.ast.add(kind)?)
    }

    /// Escape outside of a character class. `start` is the backslash.
    fn parse_atom_escape(&mut self, start: usize) -> Result<NodeId> {
        let Some(c) = self.peek() else {
            return Err(self.error(start, ParseErrorKind::TrailingBackslash));
        };
        match c {
            '1'..='9' => {
                let digits = self.pos;
                let n = self.parse_decimal().unwrap_or(0) as usize;
                if n < self.prescanned.len() {
                    return Ok(self.ast.add(NodeKind::BackReference(n as u16))?);
                }
                if self.flags.unicode() {
                    return Err(self.error(start, ParseErrorKind::InvalidEscape(c)));
                }
                // Not a group reference: a legacy octal escape or a literal digit.
                self.pos = digits;
                let cp = if c >= '8' {
                    self.pos += 1;
                    c as u32
                } else {
                    self.parse_legacy_octal()
                };
                self.literal(cp)
            }
            'k' if self.flags.unicode() || self.has_named_groups() => {
                self.pos += 1;
                if !self.eat('<') {
                    return Err(self.error(start, ParseErrorKind::InvalidGroupName));
                }
                let name = self.parse_group_name()?;
                let Some(n) = self
                    .prescanned
                    .iter()
                    .position(|n| n.as_deref() == Some(name.as_str()))
                else {
                    return Err(self.error(start, ParseErrorKind::UndefinedGroupName(name)));
                };
                Ok(self.ast.add(NodeKind::BackReference(n as u16))?)
            }
            'd' | 'D' | 's' | 'S' | 'w' | 'W' => {
                self.pos += 1;
                self.class(class_escape(c), true)
            }
            'p' | 'P' if self.flags.unicode() => {
                self.pos += 1;
                let set = self.parse_property(start, c == 'P')?;
                self.class(set, true)
            }
            _ => {
                let cp = self.parse_character_escape(start, false)?;
                self.literal(cp)
            }
        }
    }

    /// Up to three octal digits with a value of at most 0o377.
    fn parse_legacy_octal(&mut self) -> u32 {
        let mut value = 0;
        for _ in 0..3 {
            match self.peek().and_then(|c| c.to_digit(8)) {
                Some(d) if value * 8 + d <= 0o377 => {
                    value = value * 8 + d;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        value
    }

    fn parse_hex(&mut self, digits: usize) -> Option<u32> {
        let text = self.chars.get(self.pos..self.pos + digits)?;
        let mut value = 0;
        for c in text {
            value = value * 16 + c.to_digit(16)?;
        }
        self.pos += digits;
        Some(value)
    }

    /// The part after `\u`.
    fn parse_unicode_escape(&mut self) -> Option<u32> {
        let unicode = self.flags.unicode();
        if unicode && self.peek() == Some('{') {
            let save = self.pos;
            self.pos += 1;
            let digits = self.pos;
            let mut value: u32 = 0;
            while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                value = value.saturating_mul(16).saturating_add(d);
                self.pos += 1;
            }
            if self.pos == digits || value > MAX_CODE_POINT || !self.eat('}') {
                self.pos = save;
                return None;
            }
            return Some(value);
        }

        let lead = self.parse_hex(4)?;
        if unicode
            && (0xD800..0xDC00).contains(&lead)
            && self.peek() == Some('\\')
            && self.peek_at(1) == Some('u')
        {
            let save = self.pos;
            self.pos += 2;
            match self.parse_hex(4) {
                Some(trail) if (0xDC00..0xE000).contains(&trail) => {
                    return Some(0x10000 + ((lead - 0xD800) << 10) + (trail - 0xDC00));
                }
                _ => self.pos = save,
            }
        }
        Some(lead)
    }

    /// Escapes denoting a single character. The position is just after the
    /// backslash at `start`.
    fn parse_character_escape(&mut self, start: usize, in_class: bool) -> Result<u32> {
        let Some(c) = self.next() else {
            return Err(self.error(start, ParseErrorKind::TrailingBackslash));
        };
        let unicode = self.flags.unicode();
        let cp = match c {
            'f' => 0x0C,
            'n' => 0x0A,
            'r' => 0x0D,
            't' => 0x09,
            'v' => 0x0B,
            'c' => match self.peek() {
                Some(l) if l.is_ascii_alphabetic() => {
                    self.pos += 1;
                    l as u32 % 32
                }
                Some(l) if in_class && !unicode && (l.is_ascii_digit() || l == '_') => {
                    self.pos += 1;
                    l as u32 % 32
                }
                _ if unicode => return Err(self.error(start, ParseErrorKind::InvalidEscape('c'))),
                _ => {
                    // A lone `\c` is a literal backslash followed by `c`.
                    self.pos -= 1;
                    '\\' as u32
                }
            },
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => 0,
            '0'..='7' if !unicode => {
                self.pos -= 1;
                self.parse_legacy_octal()
            }
            'x' => match self.parse_hex(2) {
                Some(cp) => cp,
                None if unicode => return Err(self.error(start, ParseErrorKind::InvalidEscape('x'))),
                None => 'x' as u32,
            },
            'u' => match self.parse_unicode_escape() {
                Some(cp) => cp,
                None if unicode => {
                    return Err(self.error(start, ParseErrorKind::InvalidUnicodeEscape))
                }
                None => 'u' as u32,
            },
            '-' if in_class => '-' as u32,
            c if unicode && !is_syntax_char(c) => {
                return Err(self.error(start, ParseErrorKind::InvalidEscape(c)))
            }
            c => c as u32,
        };
        Ok(cp)
    }

    /// `{Name}` or `{Name=Value}` after `\p` or `\P`.
    fn parse_property(&mut self, start: usize, negated: bool) -> Result<CodePointSet> {
        if !self.eat('{') {
            let c = if negated { 'P' } else { 'p' };
            return Err(self.error(start, ParseErrorKind::InvalidEscape(c)));
        }
        let text_start = self.pos;
        while self.peek().is_some_and(|c| c != '}') {
            self.pos += 1;
        }
        let text: String = self.chars[text_start..self.pos].iter().collect();
        if !self.eat('}') {
            return Err(self.error(start, ParseErrorKind::InvalidPropertyName(text)));
        }
        let (name, value) = match text.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (text.as_str(), None),
        };
        let Some(set) = self.properties.lookup(name, value) else {
            return Err(self.error(start, ParseErrorKind::InvalidPropertyName(text)));
        };
        Ok(if negated { set.create_inverse() } else { set })
    }

    fn parse_class_atom(&mut self) -> Result<ClassAtom> {
        let start = self.pos;
        let Some(c) = self.next() else {
            return Err(self.error(start, ParseErrorKind::UnclosedCharacterClass));
        };
        if c != '\\' {
            return Ok(ClassAtom::Char(c as u32));
        }
        let atom = match self.peek() {
            Some(e @ ('d' | 'D' | 's' | 'S' | 'w' | 'W')) => {
                self.pos += 1;
                ClassAtom::Set(class_escape(e))
            }
            Some(e @ ('p' | 'P')) if self.flags.unicode() => {
                self.pos += 1;
                ClassAtom::Set(self.parse_property(start, e == 'P')?)
            }
            Some('b') => {
                self.pos += 1;
                ClassAtom::Char(0x08)
            }
            _ => ClassAtom::Char(self.parse_character_escape(start, true)?),
        };
        Ok(atom)
    }

    /// Character class after its opening bracket at `start`.
    fn parse_class(&mut self, start: usize) -> Result<NodeId> {
        fn push(ranges: &mut Vec<CodePointRange>, atom: ClassAtom) {
            match atom {
                ClassAtom::Char(cp) => ranges.push(CodePointRange::single(cp)),
                ClassAtom::Set(set) => ranges.extend_from_slice(&set.ranges()),
            }
        }

        let negated = self.eat('^');
        let mut ranges = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error(start, ParseErrorKind::UnclosedCharacterClass)),
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            let atom_start = self.pos;
            let first = self.parse_class_atom()?;
            if self.peek() != Some('-') || matches!(self.peek_at(1), None | Some(']')) {
                push(&mut ranges, first);
                continue;
            }
            self.pos += 1;
            let second = self.parse_class_atom()?;
            match (first, second) {
                (ClassAtom::Char(lo), ClassAtom::Char(hi)) => {
                    let Some(range) = CodePointRange::try_new(lo, hi) else {
                        return Err(
                            self.error(atom_start, ParseErrorKind::InvalidCharacterClassRange)
                        );
                    };
                    ranges.push(range);
                }
                _ if self.flags.unicode() => {
                    return Err(self.error(atom_start, ParseErrorKind::InvalidClassEscapeInRange))
                }
                (first, second) => {
                    push(&mut ranges, first);
                    ranges.push(CodePointRange::single('-' as u32));
                    push(&mut ranges, second);
                }
            }
        }

        let mut set = CodePointSet::from_ranges(ranges);
        if self.flags.ignore_case() {
            set = set.case_fold(self.flags.unicode());
        }
        if negated {
            set = set.create_inverse();
        }
        self.class(set, false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::unicode::StdProperties;

    fn parse_with(pattern: &str, flags: Flags) -> Result<RegexAst> {
        parse(pattern, flags, &BudgetConfig::default(), &StdProperties)
    }

    fn tree(pattern: &str) -> String {
        parse_with(pattern, Flags::empty()).unwrap().to_string()
    }

    fn error_with(pattern: &str, flags: Flags) -> (usize, ParseErrorKind) {
        match parse_with(pattern, flags) {
            Err(CompileError::Syntax(SyntaxError { position, kind })) => (position, kind),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    fn error(pattern: &str) -> (usize, ParseErrorKind) {
        error_with(pattern, Flags::empty())
    }

    #[test]
    fn concat_or() {
        assert_eq!(tree("abc"), "abc");
        assert_eq!(tree("a|b|c"), "a|b|c");
        assert_eq!(tree("xyz|b|"), "xyz|b|");
        assert_eq!(tree(""), "");
    }

    #[test]
    fn parenthesis() {
        assert_eq!(tree("ab(cd|ef)"), "ab(cd|ef)");
        assert_eq!(tree("(?:a|b)c"), "(?:a|b)c");
        let ast = parse_with("(a)(?<x>(b))", Flags::empty()).unwrap();
        assert_eq!(ast.capture_groups(), 4);
        assert_eq!(ast.group_names()[2].as_deref(), Some("x"));

        // Error
        assert_eq!(error("(ab"), (0, ParseErrorKind::UnclosedParenthesis));
        assert_eq!(error("ab)"), (2, ParseErrorKind::UnexpectedParenthesis));
        assert_eq!(error("a(?x)"), (1, ParseErrorKind::InvalidGroup));
        assert_eq!(error("(?<1>a)"), (3, ParseErrorKind::InvalidGroupName));
        assert_eq!(
            error("(?<n>a)(?<n>b)"),
            (7, ParseErrorKind::DuplicateGroupName("n".to_string()))
        );
    }

    #[test]
    fn escape() {
        assert_eq!(tree(r"\+\*b\?"), "+*b?");
        assert_eq!(tree(r"\d"), "[0-9]");
        assert_eq!(tree(r"\cJ\x41B"), r"\u{a}AB");
        assert_eq!(tree(r"\0"), r"\u{0}");
        assert_eq!(tree(r"\u{1F600}"), "u{1F600}");
        assert_eq!(
            parse_with(r"\u{1F600}", Flags::UNICODE).unwrap().to_string(),
            r"\u{1f600}"
        );
        assert_eq!(
            parse_with(r"😀", Flags::UNICODE).unwrap().to_string(),
            r"\u{1f600}"
        );

        // Annex B leniency without the u flag.
        assert_eq!(tree(r"\8\a"), "8a");
        assert_eq!(tree(r"\101"), "A");
        assert_eq!(tree(r"\c"), r"\c");
        assert_eq!(tree(r"\k"), "k");
        assert_eq!(tree("a{"), "a{");
        assert_eq!(tree("]}"), "]}");

        // Error
        assert_eq!(error(r"ab\"), (2, ParseErrorKind::TrailingBackslash));
        assert_eq!(
            error_with(r"\a", Flags::UNICODE),
            (0, ParseErrorKind::InvalidEscape('a'))
        );
        assert_eq!(
            error_with(r"\u{110000}", Flags::UNICODE),
            (0, ParseErrorKind::InvalidUnicodeEscape)
        );
        assert_eq!(
            error_with("}", Flags::UNICODE),
            (0, ParseErrorKind::LoneQuantifierBrackets)
        );
        assert_eq!(
            error(r"\k<x>(?<y>a)"),
            (0, ParseErrorKind::UndefinedGroupName("x".to_string()))
        );
    }

    #[test]
    fn back_reference() {
        assert_eq!(tree(r"(a)\1"), r"(a)\1");
        assert_eq!(tree(r"\1(a)"), r"\1(a)");
        assert_eq!(tree(r"(?<x>a)\k<x>"), r"(a)\1");
    }

    #[test]
    fn question() {
        assert_eq!(tree("a?"), "(?~a|)");
        assert_eq!(tree("a??b"), "(?~|a)b");
        assert_eq!(tree("a(bc)?de"), "a(?~(bc)|)de");

        // Error
        assert_eq!(error("?"), (0, ParseErrorKind::NothingToRepeat));
        assert_eq!(error("?abc"), (0, ParseErrorKind::NothingToRepeat));
        assert_eq!(error("a|*"), (2, ParseErrorKind::NothingToRepeat));
        assert_eq!(error("a**"), (2, ParseErrorKind::NothingToRepeat));
        assert_eq!(error("^*"), (1, ParseErrorKind::NothingToRepeat));
        assert_eq!(error("(?<=a)?"), (6, ParseErrorKind::NothingToRepeat));
    }

    #[test]
    fn star_plus() {
        assert_eq!(tree("a*"), "(?*a|)");
        assert_eq!(tree("a*?"), "(?*|a)");
        assert_eq!(tree("ab+"), "ab(?*b|)");
        assert_eq!(tree("(a)+"), "(?~(a))(?*(a)|)");
        // Quantified look-ahead is only allowed without the u flag.
        assert_eq!(tree("(?=a)*"), "(?*(?=a)|)");
        assert_eq!(
            error_with("(?=a)*", Flags::UNICODE),
            (5, ParseErrorKind::NothingToRepeat)
        );
    }

    #[test]
    fn counted() {
        assert_eq!(tree("a{2}"), "aa");
        assert_eq!(tree("a{2,3}"), "aa(?~a|)");
        assert_eq!(tree("a{0,2}"), "(?~a(?~a|)|)");
        assert_eq!(tree("x{1,2}?"), "x(?~|x)");
        assert_eq!(tree("a{2,}"), "aa(?*a|)");
        assert_eq!(tree("a{0}b"), "b");

        assert_eq!(error("a{2,1}"), (1, ParseErrorKind::InvalidQuantifierRange));
        assert_eq!(error("{1}"), (0, ParseErrorKind::NothingToRepeat));
        assert_eq!(
            error_with("a{1", Flags::UNICODE),
            (1, ParseErrorKind::IncompleteQuantifier)
        );
    }

    #[test]
    fn character_class() {
        assert_eq!(tree("[a-c]"), "[a-c]");
        assert_eq!(tree("[a-cx]"), "[a-cx]");
        assert_eq!(tree("[-a]"), "[-a]");
        assert_eq!(tree(r"[\d_]"), "[0-9_]");
        assert_eq!(tree(r"[\b]"), r"\u{8}");
        assert_eq!(tree(r"[\w-z]"), "[-0-9A-Z_a-z]");
        assert_eq!(tree("[]"), "[]");
        assert_eq!(tree("[^\\u0000-\\uFFFF]"), r"[\u{10000}-\u{10ffff}]");

        // Error
        assert_eq!(error("[a"), (0, ParseErrorKind::UnclosedCharacterClass));
        assert_eq!(error("x[z-a]"), (2, ParseErrorKind::InvalidCharacterClassRange));
        assert_eq!(
            error_with(r"[\w-z]", Flags::UNICODE),
            (1, ParseErrorKind::InvalidClassEscapeInRange)
        );
    }

    #[test]
    fn ignore_case() {
        let ast = parse_with("a[x-y]", Flags::IGNORE_CASE).unwrap();
        assert_eq!(ast.to_string(), "[Aa][X-Yx-y]");
        let ast = parse_with("[^a]", Flags::IGNORE_CASE).unwrap();
        assert!(ast.to_string().starts_with("[\\u{0}-@B-`b-"));
    }

    #[test]
    fn property() {
        let ast = parse_with(r"\p{ASCII}\P{Any}", Flags::UNICODE).unwrap();
        assert_eq!(ast.to_string(), r"[\u{0}-\u{7f}][]");
        // Without the u flag `\p` is just `p`.
        assert_eq!(tree(r"\p{L}"), "p{L}");
        assert_eq!(
            error_with(r"\p{Foo}", Flags::UNICODE),
            (0, ParseErrorKind::InvalidPropertyName("Foo".to_string()))
        );
    }

    #[test]
    fn look_around() {
        assert_eq!(tree("(?<=ab)c(?!d)"), "(?<=ab)c(?!d)");
        assert_eq!(tree("(?=(a))"), "(?=(a))");
        let ast = parse_with("a(?=b)", Flags::empty()).unwrap();
        assert!(ast.is_tree_like());
        assert!(!parse_with("a+", Flags::empty()).unwrap().is_tree_like());
    }

    #[test]
    fn budget() {
        let budgets = BudgetConfig {
            max_parse_tree_size: 10,
            ..BudgetConfig::default()
        };
        let err = parse("abcdefghijkl", Flags::empty(), &budgets, &StdProperties).unwrap_err();
        assert_eq!(
            err,
            CompileError::Bailout(Bailout::limit(Stage::Parse, Limit::MaxParseTreeSize))
        );

        let err = parse_with("a{41}", Flags::empty()).unwrap_err();
        assert_eq!(
            err.bailout(),
            Some(&Bailout::limit(Stage::Parse, Limit::MaxCountedRepetition))
        );
        assert!(parse_with("a{40}", Flags::empty()).is_ok());

        let budgets = BudgetConfig {
            max_capture_groups: 2,
            ..BudgetConfig::default()
        };
        let err = parse("(a)(b)(c)", Flags::empty(), &budgets, &StdProperties).unwrap_err();
        assert_eq!(
            err.bailout(),
            Some(&Bailout::limit(Stage::Parse, Limit::MaxCaptureGroups))
        );
    }

    #[test]
    fn nesting_depth() {
        let nested = |open: &str, depth: usize| {
            format!("{}a{}", open.repeat(depth), ")".repeat(depth))
        };
        let too_deep = Bailout::limit(Stage::Parse, Limit::MaxNestingDepth);
        for open in ["(?:", "(", "(?=", "(?<="] {
            let err = parse_with(&nested(open, 500), Flags::empty()).unwrap_err();
            assert_eq!(err.bailout(), Some(&too_deep), "{open}");
        }
        assert!(parse_with(&nested("(?:", 64), Flags::empty()).is_ok());
        assert_eq!(
            parse_with(&nested("(?:", 65), Flags::empty()).unwrap_err().bailout(),
            Some(&too_deep)
        );

        let budgets = BudgetConfig {
            max_nesting_depth: 2,
            ..BudgetConfig::default()
        };
        assert!(parse("(a)(?:b(c))", Flags::empty(), &budgets, &StdProperties).is_ok());
        assert!(parse("((?=(c)))", Flags::empty(), &budgets, &StdProperties).is_err());
    }
}
