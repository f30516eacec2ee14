use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four retailer back-office sources.
///
/// Declaration order is the merge priority: Kyobo joins first and keeps its
/// column names unsuffixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retailer {
    Kyobo,
    Aladin,
    Youngpoong,
    Yes24,
}

impl Retailer {
    pub const ALL: [Retailer; 4] = [
        Retailer::Kyobo,
        Retailer::Aladin,
        Retailer::Youngpoong,
        Retailer::Yes24,
    ];

    /// Short ASCII tag used for column suffixes and object keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Retailer::Kyobo => "kyobo",
            Retailer::Aladin => "aladin",
            Retailer::Youngpoong => "youngpoong",
            Retailer::Yes24 => "yes24",
        }
    }

    /// Ledger sheet name used by the back office.
    pub fn display_name(&self) -> &'static str {
        match self {
            Retailer::Kyobo => "교보문고",
            Retailer::Aladin => "알라딘",
            Retailer::Youngpoong => "영풍문고",
            Retailer::Yes24 => "YES24",
        }
    }

    /// Header of this retailer's total column in the integrated table.
    pub fn total_header(&self) -> &'static str {
        match self {
            Retailer::Kyobo => "교보계",
            Retailer::Aladin => "알라딘",
            Retailer::Youngpoong => "영풍",
            Retailer::Yes24 => "YES24",
        }
    }

    /// Bookstore label written to the downstream store.
    pub fn store_label(&self) -> &'static str {
        match self {
            Retailer::Kyobo => "교보",
            Retailer::Aladin => "알라딘",
            Retailer::Youngpoong => "영풍",
            Retailer::Yes24 => "YES24",
        }
    }

    /// Internal name of this retailer's total quantity column.
    pub fn total_column(&self) -> &'static str {
        match self {
            Retailer::Kyobo => "kyobo_total",
            Retailer::Aladin => "aladin_total",
            Retailer::Youngpoong => "youngpoong_total",
            Retailer::Yes24 => "yes24_total",
        }
    }

    pub fn priority(&self) -> usize {
        Self::ALL
            .iter()
            .position(|r| r == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for Retailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Retailer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| {
                r.tag().eq_ignore_ascii_case(needle)
                    || r.display_name() == needle
                    || r.store_label() == needle
            })
            .ok_or_else(|| anyhow!("Unknown retailer: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_tags_and_sheet_names() {
        assert_eq!("kyobo".parse::<Retailer>().unwrap(), Retailer::Kyobo);
        assert_eq!("YES24".parse::<Retailer>().unwrap(), Retailer::Yes24);
        assert_eq!("영풍문고".parse::<Retailer>().unwrap(), Retailer::Youngpoong);
        assert_eq!("알라딘".parse::<Retailer>().unwrap(), Retailer::Aladin);
        assert!("bandi".parse::<Retailer>().is_err());
    }

    #[test]
    fn test_priority_follows_declaration_order() {
        let priorities: Vec<usize> = Retailer::ALL.iter().map(|r| r.priority()).collect();
        assert_eq!(priorities, vec![0, 1, 2, 3]);
        assert!(Retailer::Kyobo < Retailer::Yes24);
    }
}
