//! Add-on linkage: attach a FIRE SUPP block to the line item it belongs to
//!
//! Strategies are tried in order. The first one that matches exactly one
//! candidate wins; a strategy matching several candidates stops the search.

/// Outcome of resolving one add-on reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linkage {
    /// Index into the candidate list, and the strategy that found it
    Linked { index: usize, strategy: &'static str },
    Ambiguous { candidates: Vec<usize>, strategy: &'static str },
    Unlinked,
}

pub trait LinkStrategy {
    fn name(&self) -> &'static str;

    fn matches(&self, addon: &str, candidate: &str) -> bool;
}

/// Case-insensitive equality after trimming
pub struct ExactCaseInsensitive;

impl LinkStrategy for ExactCaseInsensitive {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn matches(&self, addon: &str, candidate: &str) -> bool {
        addon.trim().eq_ignore_ascii_case(candidate.trim())
    }
}

/// `"1.01"` links to `"1.01a"` and back. Only a single trailing lowercase
/// letter after a digit counts as a variant, so `"30.13A"` and `"30.13B"`
/// stay distinct.
pub struct TrailingLowercaseVariant;

impl TrailingLowercaseVariant {
    fn base(reference: &str) -> Option<&str> {
        let mut chars = reference.char_indices().rev();
        let (last_at, last) = chars.next()?;
        let (_, before) = chars.next()?;
        (last.is_ascii_lowercase() && before.is_ascii_digit()).then(|| &reference[..last_at])
    }
}

impl LinkStrategy for TrailingLowercaseVariant {
    fn name(&self) -> &'static str {
        "trailing-lowercase-variant"
    }

    fn matches(&self, addon: &str, candidate: &str) -> bool {
        let (addon, candidate) = (addon.trim(), candidate.trim());
        Self::base(addon) == Some(candidate) || Self::base(candidate) == Some(addon)
    }
}

/// The built-in strategies, most specific first
pub fn default_strategies() -> Vec<Box<dyn LinkStrategy>> {
    vec![Box::new(ExactCaseInsensitive), Box::new(TrailingLowercaseVariant)]
}

/// Resolve an add-on reference against line-item references
pub fn resolve(addon: &str, candidates: &[&str], strategies: &[Box<dyn LinkStrategy>]) -> Linkage {
    if addon.trim().is_empty() {
        return Linkage::Unlinked;
    }
    for strategy in strategies {
        let hits: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.trim().is_empty() && strategy.matches(addon, c))
            .map(|(i, _)| i)
            .collect();
        match hits.as_slice() {
            [] => continue,
            [index] => {
                return Linkage::Linked {
                    index: *index,
                    strategy: strategy.name(),
                }
            }
            _ => {
                return Linkage::Ambiguous {
                    candidates: hits,
                    strategy: strategy.name(),
                }
            }
        }
    }
    Linkage::Unlinked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(addon: &str, candidates: &[&str]) -> Linkage {
        resolve(addon, candidates, &default_strategies())
    }

    #[test]
    fn test_exact_wins_first() {
        assert_eq!(
            link("1.01a", &["1.01", "1.01a"]),
            Linkage::Linked { index: 1, strategy: "exact" }
        );
        assert_eq!(
            link("x1", &["X1"]),
            Linkage::Linked { index: 0, strategy: "exact" }
        );
    }

    #[test]
    fn test_lowercase_variant() {
        assert_eq!(
            link("1.01", &["1.01a"]),
            Linkage::Linked { index: 0, strategy: "trailing-lowercase-variant" }
        );
        assert_eq!(
            link("1.01a", &["1.01"]),
            Linkage::Linked { index: 0, strategy: "trailing-lowercase-variant" }
        );
    }

    #[test]
    fn test_uppercase_suffixes_are_distinct() {
        assert_eq!(link("30.13A", &["30.13B"]), Linkage::Unlinked);
        assert_eq!(link("30.13", &["30.13B"]), Linkage::Unlinked);
    }

    #[test]
    fn test_sibling_variants_do_not_link() {
        assert_eq!(link("1.01a", &["1.01b"]), Linkage::Unlinked);
    }

    #[test]
    fn test_ambiguous() {
        assert_eq!(
            link("1.01", &["1.01a", "1.01b"]),
            Linkage::Ambiguous {
                candidates: vec![0, 1],
                strategy: "trailing-lowercase-variant"
            }
        );
    }

    #[test]
    fn test_blank_never_links() {
        assert_eq!(link("", &[""]), Linkage::Unlinked);
    }
}
