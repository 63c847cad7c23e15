use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Pattern flags, written the way they follow a regular expression literal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// `g`. Recorded, but has no effect on compilation.
        const GLOBAL = 1 << 0;
        /// `i`
        const IGNORE_CASE = 1 << 1;
        /// `m`
        const MULTILINE = 1 << 2;
        /// `s`
        const DOT_ALL = 1 << 3;
        /// `u`
        const UNICODE = 1 << 4;
        /// `y`: only match at the start index.
        const STICKY = 1 << 5;
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagsError {
    #[error("invalid flag {0:?}")]
    InvalidFlag(char),
    #[error("duplicate flag {0:?}")]
    DuplicateFlag(char),
}

impl Flags {
    fn from_char(c: char) -> Option<Self> {
        let flag = match c {
            'g' => Flags::GLOBAL,
            'i' => Flags::IGNORE_CASE,
            'm' => Flags::MULTILINE,
            's' => Flags::DOT_ALL,
            'u' => Flags::UNICODE,
            'y' => Flags::STICKY,
            _ => return None,
        };
        Some(flag)
    }

    pub fn ignore_case(self) -> bool {
        self.contains(Flags::IGNORE_CASE)
    }

    pub fn multiline(self) -> bool {
        self.contains(Flags::MULTILINE)
    }

    pub fn dot_all(self) -> bool {
        self.contains(Flags::DOT_ALL)
    }

    pub fn unicode(self) -> bool {
        self.contains(Flags::UNICODE)
    }

    pub fn sticky(self) -> bool {
        self.contains(Flags::STICKY)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in "gimsuy".chars() {
            if Flags::from_char(c).is_some_and(|flag| self.contains(flag)) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Flags {
    type Err = FlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Flags::empty();
        for c in s.chars() {
            let Some(flag) = Flags::from_char(c) else {
                return Err(FlagsError::InvalidFlag(c));
            };
            if flags.contains(flag) {
                return Err(FlagsError::DuplicateFlag(c));
            }
            flags |= flag;
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!("".parse::<Flags>().unwrap(), Flags::empty());
        assert_eq!(
            "im".parse::<Flags>().unwrap(),
            Flags::IGNORE_CASE | Flags::MULTILINE
        );
        assert!("gimsuy".parse::<Flags>().unwrap().sticky());
        assert_eq!("yig".parse::<Flags>().unwrap().to_string(), "giy");

        // Error
        assert_eq!("ix".parse::<Flags>(), Err(FlagsError::InvalidFlag('x')));
        assert_eq!("gg".parse::<Flags>(), Err(FlagsError::DuplicateFlag('g')));
    }
}
