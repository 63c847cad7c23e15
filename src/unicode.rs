//! Unicode property sets for `\p{..}` and `\P{..}`.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use log::trace;
use regex_syntax::hir::{Class, HirKind, Literal};
use regex_syntax::ParserBuilder;

use crate::charset::{CodePointRange, CodePointSet};

/// Resolves a property escape to a set of code points.
///
/// `value` is the part after `=` in `\p{name=value}`. Returning `None`
/// makes the pattern a syntax error.
pub trait PropertyLookup {
    fn lookup(&self, name: &str, value: Option<&str>) -> Option<CodePointSet>;
}

/// Properties from the Unicode character database tables of `regex-syntax`:
/// binary properties, General_Category, Script and Script_Extensions.
///
/// Resolved sets are kept for the life of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdProperties;

type Key = (String, Option<String>);

fn property_cache() -> &'static Mutex<HashMap<Key, Option<CodePointSet>>> {
    static CACHE: OnceLock<Mutex<HashMap<Key, Option<CodePointSet>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl StdProperties {
    fn resolve(name: &str, value: Option<&str>) -> Option<CodePointSet> {
        if !is_identifier(name) || !value.map_or(true, is_identifier) {
            return None;
        }
        let escape = match value {
            Some(value) => {
                if !matches!(
                    name,
                    "General_Category" | "gc" | "Script" | "sc" | "Script_Extensions" | "scx"
                ) {
                    return None;
                }
                format!(r"\p{{{name}={value}}}")
            }
            None => format!(r"\p{{{name}}}"),
        };
        let hir = ParserBuilder::new().build().parse(&escape).ok()?;
        let set = match hir.into_kind() {
            HirKind::Class(Class::Unicode(class)) => CodePointSet::from_ranges(
                class
                    .iter()
                    .map(|r| CodePointRange::new(r.start() as u32, r.end() as u32)),
            ),
            // A property of one character comes back as a literal.
            HirKind::Literal(Literal(bytes)) => {
                let chars: Vec<char> = std::str::from_utf8(&bytes).ok()?.chars().collect();
                CodePointSet::from_chars(&chars)
            }
            _ => return None,
        };
        Some(set.freeze())
    }
}

impl PropertyLookup for StdProperties {
    fn lookup(&self, name: &str, value: Option<&str>) -> Option<CodePointSet> {
        let key = (name.to_string(), value.map(str::to_string));
        let mut cache = property_cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(set) = cache.get(&key) {
            return set.clone();
        }
        let set = Self::resolve(name, value);
        trace!(
            "property {name}{}: {} ranges",
            value.map(|v| format!("={v}")).unwrap_or_default(),
            set.as_ref().map_or(0, |s| s.ranges().len())
        );
        cache.insert(key, set.clone());
        set
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup() {
        let props = StdProperties;
        let alpha = props.lookup("Alphabetic", None).unwrap();
        assert!(alpha.contains('é' as u32));
        assert!(!alpha.contains('1' as u32));

        let n = props.lookup("gc", Some("N")).unwrap();
        assert!(n.contains('7' as u32));
        assert!(n.contains('Ⅷ' as u32));
        assert_eq!(props.lookup("Number", None), Some(n));

        assert!(props.lookup("ASCII", None).unwrap().contains(0x7F));
        assert!(props.lookup("Script", Some("Latin")).unwrap().contains('q' as u32));
        assert!(props.lookup("NoSuchProperty", None).is_none());
        assert!(props.lookup("Age", Some("6.0")).is_none());
        assert!(props.lookup("gc}|\\p{Greek", None).is_none());
    }

    #[test]
    fn decimal_numbers() {
        let props = StdProperties;
        let nd = props.lookup("Nd", None).unwrap();
        for digit in ['0', '9', '\u{0663}', '\u{0966}', '\u{FF19}', '\u{1D7CE}'] {
            assert!(nd.contains(digit as u32), "{digit:?}");
        }
        assert!(!nd.contains('Ⅷ' as u32));
        assert!(!nd.contains('a' as u32));
        assert_eq!(props.lookup("General_Category", Some("Decimal_Number")), Some(nd));
    }

    #[test]
    fn lookups_are_cached() {
        let props = StdProperties;
        let first = props.lookup("Greek", None);
        let key = ("Greek".to_string(), None);
        assert!(property_cache().lock().unwrap().contains_key(&key));
        assert_eq!(props.lookup("Greek", None), first);
    }
}
