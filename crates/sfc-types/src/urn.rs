//! Hierarchical object addresses.
//!
//! A URN is a `/`-separated list of segments, each a type name optionally
//! qualified by attribute filters:
//!
//! ```text
//! Catalog[@Name='main']/Database[@Name='sales']/Table[@Name='orders' and @Schema='dbo']
//! ```
//!
//! Single quotes inside attribute values are escaped by doubling them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One level of a [`Urn`]: a type name plus attribute filters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UrnSegment {
    type_name: String,
    attributes: BTreeMap<String, String>,
}

impl UrnSegment {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Returns `true` if `other` has the same type and carries every
    /// attribute of `self` with an equal value.
    pub fn filter_matches(&self, other: &UrnSegment) -> bool {
        self.type_name == other.type_name
            && self
                .attributes
                .iter()
                .all(|(k, v)| other.attributes.get(k) == Some(v))
    }
}

impl fmt::Display for UrnSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        if self.attributes.is_empty() {
            return Ok(());
        }
        write!(f, "[")?;
        for (i, (name, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "@{}='{}'", name, value.replace('\'', "''"))?;
        }
        write!(f, "]")
    }
}

/// A hierarchical, attribute-qualified address from a domain root to a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Urn {
    segments: Vec<UrnSegment>,
}

impl Urn {
    /// Build a URN from segments. An empty vector yields an empty URN, which
    /// only appears as the parent of a root.
    pub fn from_segments(segments: Vec<UrnSegment>) -> Self {
        Self { segments }
    }

    /// Parse URN text.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        Parser::new(text).parse()
    }

    pub fn segments(&self) -> &[UrnSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn leaf(&self) -> Option<&UrnSegment> {
        self.segments.last()
    }

    /// The URN one level up, or `None` at the root.
    pub fn parent(&self) -> Option<Urn> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Urn::from_segments(
            self.segments[..self.segments.len() - 1].to_vec(),
        ))
    }

    /// Append a segment, yielding the child address.
    pub fn child(&self, segment: UrnSegment) -> Urn {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Urn::from_segments(segments)
    }

    /// Leaf type name.
    pub fn type_name(&self) -> Option<&str> {
        self.leaf().map(UrnSegment::type_name)
    }

    pub fn root_type(&self) -> Option<&str> {
        self.segments.first().map(UrnSegment::type_name)
    }

    /// Returns `true` if every segment of `self` equals the corresponding
    /// leading segment of `other`. A URN is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Urn) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Urn {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Urn::parse(s)
    }
}

/// A URN used as a query: segment attributes act as equality filters, and a
/// segment without attributes matches every object of its type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryExpression {
    urn: Urn,
}

impl QueryExpression {
    pub fn new(urn: Urn) -> Self {
        Self { urn }
    }

    pub fn parse(text: &str) -> Result<Self, TypeError> {
        Ok(Self::new(Urn::parse(text)?))
    }

    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Returns `true` if `candidate` has the same depth and satisfies every
    /// segment filter.
    pub fn matches(&self, candidate: &Urn) -> bool {
        self.urn.len() == candidate.len()
            && self
                .urn
                .segments()
                .iter()
                .zip(candidate.segments())
                .all(|(filter, seg)| filter.filter_matches(seg))
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn)
    }
}

impl From<Urn> for QueryExpression {
    fn from(urn: Urn) -> Self {
        Self::new(urn)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.trim().chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> TypeError {
        TypeError::InvalidUrn {
            urn: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), TypeError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!(
                "expected '{expected}' at {}, found '{c}'",
                self.pos
            ))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn parse(mut self) -> Result<Urn, TypeError> {
        if self.chars.is_empty() {
            return Err(self.error("empty urn"));
        }
        let mut segments = Vec::new();
        loop {
            segments.push(self.segment()?);
            match self.peek() {
                None => break,
                Some('/') => {
                    self.pos += 1;
                    if self.peek().is_none() {
                        return Err(self.error("trailing '/'"));
                    }
                }
                Some(c) => {
                    return Err(self.error(format!("unexpected '{c}' at {}", self.pos)));
                }
            }
        }
        Ok(Urn::from_segments(segments))
    }

    fn segment(&mut self) -> Result<UrnSegment, TypeError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '[' && c != '/') {
            self.pos += 1;
        }
        let type_name: String = self.chars[start..self.pos].iter().collect();
        let type_name = type_name.trim();
        if type_name.is_empty() {
            return Err(self.error(format!("empty segment type at {start}")));
        }
        let mut segment = UrnSegment::new(type_name);
        if self.peek() == Some('[') {
            self.pos += 1;
            self.filter(&mut segment)?;
        }
        Ok(segment)
    }

    fn filter(&mut self, segment: &mut UrnSegment) -> Result<(), TypeError> {
        loop {
            self.skip_ws();
            self.expect('@')?;
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                self.pos += 1;
            }
            let name: String = self.chars[start..self.pos].iter().collect();
            if name.is_empty() {
                return Err(self.error(format!("empty attribute name at {start}")));
            }
            self.skip_ws();
            self.expect('=')?;
            self.skip_ws();
            let value = self.quoted()?;
            if segment.attributes.insert(name.clone(), value).is_some() {
                return Err(self.error(format!("duplicate attribute '@{name}'")));
            }
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some('a') if self.keyword("and") => continue,
                Some(c) => {
                    return Err(self.error(format!("unexpected '{c}' in filter at {}", self.pos)));
                }
                None => return Err(self.error("unterminated filter")),
            }
        }
    }

    fn keyword(&mut self, word: &str) -> bool {
        let end = self.pos + word.chars().count();
        if end > self.chars.len() {
            return false;
        }
        let found: String = self.chars[self.pos..end].iter().collect();
        if found == word {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn quoted(&mut self) -> Result<String, TypeError> {
        self.expect('\'')?;
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('\'') => {
                    if self.chars.get(self.pos + 1) == Some(&'\'') {
                        value.push('\'');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        return Ok(value);
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table_urn() -> Urn {
        Urn::from_segments(vec![
            UrnSegment::new("Catalog").with_attribute("Name", "main"),
            UrnSegment::new("Database").with_attribute("Name", "sales"),
            UrnSegment::new("Table")
                .with_attribute("Name", "orders")
                .with_attribute("Schema", "dbo"),
        ])
    }

    #[test]
    fn renders_canonical_text() {
        assert_eq!(
            table_urn().to_string(),
            "Catalog[@Name='main']/Database[@Name='sales']/Table[@Name='orders' and @Schema='dbo']"
        );
    }

    #[test]
    fn parses_rendered_text() {
        let urn = table_urn();
        assert_eq!(Urn::parse(&urn.to_string()).unwrap(), urn);
    }

    #[test]
    fn parse_tolerates_spaces_and_escaped_quotes() {
        let urn = Urn::parse("Catalog[@Name = 'it''s']/Login").unwrap();
        assert_eq!(urn.segments()[0].attribute("Name"), Some("it's"));
        assert_eq!(urn.type_name(), Some("Login"));
        assert!(!urn.leaf().unwrap().has_attributes());
    }

    #[test]
    fn slash_inside_value_is_not_a_separator() {
        let urn = Urn::parse("Catalog[@Name='a/b']").unwrap();
        assert_eq!(urn.len(), 1);
        assert_eq!(urn.segments()[0].attribute("Name"), Some("a/b"));
    }

    #[test]
    fn malformed_text_is_rejected() {
        for bad in [
            "",
            "Catalog/",
            "Catalog[@Name='x'",
            "Catalog[Name='x']",
            "Catalog[@Name='x' or @Id='1']",
            "Catalog[@Name='x' and @Name='y']",
            "/Catalog",
        ] {
            assert!(
                matches!(Urn::parse(bad), Err(TypeError::InvalidUrn { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn navigation() {
        let urn = table_urn();
        let parent = urn.parent().unwrap();
        assert_eq!(parent.type_name(), Some("Database"));
        assert_eq!(urn.root_type(), Some("Catalog"));
        assert!(parent.is_prefix_of(&urn));
        assert!(urn.is_prefix_of(&urn));
        assert!(!urn.is_prefix_of(&parent));
        assert!(Urn::parse("Catalog[@Name='main']").unwrap().parent().is_none());
        assert_eq!(
            parent.child(UrnSegment::new("Table")).to_string(),
            "Catalog[@Name='main']/Database[@Name='sales']/Table"
        );
    }

    #[test]
    fn query_expression_filters() {
        let q = QueryExpression::parse("Catalog[@Name='main']/Database[@Name='sales']/Table").unwrap();
        assert!(q.matches(&table_urn()));

        let q = QueryExpression::parse("Catalog/Database[@Name='hr']/Table").unwrap();
        assert!(!q.matches(&table_urn()));

        let q = QueryExpression::parse("Catalog/Database").unwrap();
        assert!(!q.matches(&table_urn()));
    }

    proptest! {
        #[test]
        fn rendered_segments_parse_back(
            names in proptest::collection::vec("[A-Za-z][A-Za-z0-9]{0,8}", 1..4),
            values in proptest::collection::vec("[ -~]{0,12}", 1..4),
        ) {
            let segments: Vec<UrnSegment> = names
                .iter()
                .zip(values.iter().cycle())
                .map(|(n, v)| UrnSegment::new(n.clone()).with_attribute("Name", v.clone()))
                .collect();
            let urn = Urn::from_segments(segments);
            prop_assert_eq!(Urn::parse(&urn.to_string()).unwrap(), urn);
        }
    }
}
