//! Inum selection grammar: `all`, single values, comma-separated inclusive
//! ranges (`0-11,24-34,40`).

use std::ops::RangeInclusive;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InumSelector {
    All,
    Ranges(Vec<RangeInclusive<u64>>),
}

impl InumSelector {
    /// Concrete inum list, capped at `record_count` for the `all` form.
    pub fn resolve(&self, record_count: u64) -> Vec<u64> {
        match self {
            Self::All => (0..record_count).collect(),
            Self::Ranges(ranges) => ranges.iter().flat_map(|r| r.clone()).collect(),
        }
    }

    pub fn contains(&self, inum: u64) -> bool {
        match self {
            Self::All => true,
            Self::Ranges(ranges) => ranges.iter().any(|r| r.contains(&inum)),
        }
    }
}

impl FromStr for InumSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(format!("empty range in inum selector '{s}'"));
            }
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: u64 = lo
                        .trim()
                        .parse()
                        .map_err(|_| format!("invalid inum '{lo}'"))?;
                    let hi: u64 = hi
                        .trim()
                        .parse()
                        .map_err(|_| format!("invalid inum '{hi}'"))?;
                    if lo > hi {
                        return Err(format!("descending range '{part}'"));
                    }
                    ranges.push(lo..=hi);
                }
                None => {
                    let n: u64 = part.parse().map_err(|_| format!("invalid inum '{part}'"))?;
                    ranges.push(n..=n);
                }
            }
        }
        Ok(Self::Ranges(ranges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_keyword() {
        let sel: InumSelector = "all".parse().unwrap();
        assert_eq!(sel, InumSelector::All);
        assert_eq!(sel.resolve(3), vec![0, 1, 2]);
    }

    #[test]
    fn test_single_inum() {
        let sel: InumSelector = "42".parse().unwrap();
        assert_eq!(sel.resolve(1000), vec![42]);
        assert!(sel.contains(42));
        assert!(!sel.contains(41));
    }

    #[test]
    fn test_chained_ranges() {
        let sel: InumSelector = "0-3,24-26,40".parse().unwrap();
        assert_eq!(sel.resolve(1000), vec![0, 1, 2, 3, 24, 25, 26, 40]);
    }

    #[test]
    fn test_inclusive_bounds() {
        let sel: InumSelector = "5-5".parse().unwrap();
        assert_eq!(sel.resolve(10), vec![5]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<InumSelector>().is_err());
        assert!("a-b".parse::<InumSelector>().is_err());
        assert!("9-1".parse::<InumSelector>().is_err());
        assert!("1,,2".parse::<InumSelector>().is_err());
    }
}
