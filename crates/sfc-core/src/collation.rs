//! Culture-aware string ordering for sorted collections.
//!
//! Keys are compared by their display text. The primary level is a sort key
//! of per-character weights tailored by language (German umlaut expansion,
//! Swedish letters after `z`, Spanish `ñ` between `n` and `o`); accents and
//! case break ties afterwards. With `ignore_case` two texts that differ only
//! in case compare equal, so they collide as keys.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SfcError, SfcResult};

/// A `language[_COUNTRY]` culture tag. The empty language is the invariant culture.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Locale {
    pub language: String,
    pub country: Option<String>,
}

impl Locale {
    pub fn invariant() -> Self {
        Self::default()
    }

    /// Parse `"de_DE"`, `"sv-SE"`, `"en"`. An empty string is the invariant culture.
    pub fn parse(s: &str) -> SfcResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::invariant());
        }
        let mut parts = s.split(['_', '-']);
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SfcError::Config(format!("invalid culture '{s}'")));
        }
        let country = parts
            .next()
            .filter(|c| !c.is_empty())
            .map(str::to_ascii_uppercase);
        debug!(culture = %s, language = %language, "parsed culture");
        Ok(Self { language, country })
    }

    pub fn canonical(&self) -> String {
        match &self.country {
            Some(c) => format!("{}_{c}", self.language),
            None => self.language.clone(),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Serializable collation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollationConfig {
    /// Culture tag; empty for invariant.
    pub culture: String,
    pub ignore_case: bool,
    pub ascending: bool,
}

impl Default for CollationConfig {
    fn default() -> Self {
        Self {
            culture: String::new(),
            ignore_case: false,
            ascending: true,
        }
    }
}

/// Caller-supplied ordering replacing the culture rules.
pub type Comparer = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Ordering used by sorted collections.
#[derive(Clone)]
pub struct Collation {
    locale: Locale,
    ignore_case: bool,
    ascending: bool,
    comparer: Option<Comparer>,
}

impl Collation {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            ignore_case: false,
            ascending: true,
            comparer: None,
        }
    }

    pub fn from_config(config: &CollationConfig) -> SfcResult<Self> {
        Ok(Self::new(Locale::parse(&config.culture)?)
            .with_ignore_case(config.ignore_case)
            .with_ascending(config.ascending))
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn with_ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    /// Replace the culture rules with `comparer`. Direction still applies.
    pub fn with_comparer<F>(mut self, comparer: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.comparer = Some(Arc::new(comparer));
        self
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    pub fn has_comparer(&self) -> bool {
        self.comparer.is_some()
    }

    pub fn compare(&self, left: &str, right: &str) -> Ordering {
        let ordering = match &self.comparer {
            Some(cmp) => cmp(left, right),
            None => self.culture_compare(left, right),
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }

    fn culture_compare(&self, left: &str, right: &str) -> Ordering {
        let primary = sort_key(left, &self.locale).cmp(&sort_key(right, &self.locale));
        let accents = || left.to_lowercase().cmp(&right.to_lowercase());
        if self.ignore_case {
            primary.then_with(accents)
        } else {
            primary.then_with(accents).then_with(|| left.cmp(right))
        }
    }
}

impl Default for Collation {
    fn default() -> Self {
        Self::new(Locale::invariant())
    }
}

impl fmt::Debug for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collation")
            .field("locale", &self.locale.canonical())
            .field("ignore_case", &self.ignore_case)
            .field("ascending", &self.ascending)
            .field("custom_comparer", &self.comparer.is_some())
            .finish()
    }
}

fn sort_key(s: &str, locale: &Locale) -> Vec<u32> {
    s.chars()
        .flat_map(|ch| char_weights(ch, &locale.language))
        .collect()
}

fn lower(ch: char) -> u32 {
    u32::from(ch.to_lowercase().next().unwrap_or(ch))
}

fn char_weights(ch: char, language: &str) -> Vec<u32> {
    match language {
        "de" => match ch {
            'ä' | 'Ä' => vec![u32::from('a'), u32::from('e')],
            'ö' | 'Ö' => vec![u32::from('o'), u32::from('e')],
            'ü' | 'Ü' => vec![u32::from('u'), u32::from('e')],
            'ß' => vec![u32::from('s'), u32::from('s')],
            _ => vec![lower(strip_diacritic(ch))],
        },
        "sv" | "fi" => match ch {
            'å' | 'Å' => vec![u32::from('z') + 1],
            'ä' | 'Ä' => vec![u32::from('z') + 2],
            'ö' | 'Ö' => vec![u32::from('z') + 3],
            _ => vec![lower(strip_diacritic(ch))],
        },
        "es" => match ch {
            'ñ' | 'Ñ' => vec![u32::from('n') + 1],
            _ => vec![lower(strip_diacritic(ch))],
        },
        _ => vec![lower(strip_diacritic(ch))],
    }
}

/// Base letter of common Latin-1 accented characters.
fn strip_diacritic(ch: char) -> char {
    let upper = ch.is_uppercase();
    let base = match ch {
        'À'..='Å' | 'à'..='å' | 'Æ' | 'æ' => 'a',
        'Ç' | 'ç' => 'c',
        'È'..='Ë' | 'è'..='ë' => 'e',
        'Ì'..='Ï' | 'ì'..='ï' => 'i',
        'Ñ' | 'ñ' => 'n',
        'Ò'..='Ö' | 'ò'..='ö' | 'Ø' | 'ø' => 'o',
        'Ù'..='Ü' | 'ù'..='ü' => 'u',
        'Ý' | 'ý' | 'ÿ' => 'y',
        _ => return ch,
    };
    if upper {
        base.to_ascii_uppercase()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collation(culture: &str) -> Collation {
        Collation::new(Locale::parse(culture).unwrap())
    }

    #[test]
    fn locale_parse_normalizes_case() {
        let l = Locale::parse("de-de").unwrap();
        assert_eq!(l.language, "de");
        assert_eq!(l.country.as_deref(), Some("DE"));
        assert_eq!(l.canonical(), "de_DE");
        assert_eq!(Locale::parse("").unwrap(), Locale::invariant());
        assert!(Locale::parse("x").is_err());
        assert!(Locale::parse("1234").is_err());
    }

    #[test]
    fn case_sensitivity_toggle() {
        let sensitive = Collation::default();
        assert_ne!(sensitive.compare("Orders", "orders"), Ordering::Equal);
        let insensitive = Collation::default().with_ignore_case(true);
        assert_eq!(insensitive.compare("Orders", "orders"), Ordering::Equal);
        assert_eq!(insensitive.compare("a", "B"), Ordering::Less);
    }

    #[test]
    fn accents_sort_next_to_base_letter() {
        let c = Collation::default().with_ignore_case(true);
        assert_eq!(c.compare("école", "ecole"), Ordering::Greater);
        assert_eq!(c.compare("école", "ed"), Ordering::Less);
    }

    #[test]
    fn german_and_swedish_tailoring() {
        assert_eq!(collation("de_DE").compare("ad", "ä"), Ordering::Less);
        assert_eq!(collation("de_DE").compare("ä", "af"), Ordering::Less);
        assert_eq!(collation("sv_SE").compare("z", "å"), Ordering::Less);
        assert_eq!(collation("en_US").compare("å", "z"), Ordering::Less);
    }

    #[test]
    fn descending_reverses() {
        let c = Collation::default().with_ascending(false);
        assert_eq!(c.compare("a", "b"), Ordering::Greater);
    }

    #[test]
    fn custom_comparer_wins() {
        let by_len = Collation::default().with_comparer(|a, b| a.len().cmp(&b.len()).then(a.cmp(b)));
        assert_eq!(by_len.compare("zz", "aaa"), Ordering::Less);
        assert!(by_len.has_comparer());
    }

    #[test]
    fn config_builds_collation() {
        let cfg = CollationConfig {
            culture: "sv_SE".into(),
            ignore_case: true,
            ascending: false,
        };
        let c = Collation::from_config(&cfg).unwrap();
        assert_eq!(c.locale().language, "sv");
        assert!(c.ignore_case());
        assert!(!c.ascending());
    }

    proptest! {
        #[test]
        fn case_sensitive_equality_is_identity(a in "[a-zA-Zéè]{0,6}", b in "[a-zA-Zéè]{0,6}") {
            let c = Collation::default();
            prop_assert_eq!(c.compare(&a, &b) == Ordering::Equal, a == b);
            prop_assert_eq!(c.compare(&a, &b), c.compare(&b, &a).reverse());
        }
    }
}
