//! Canonical fragment identifiers.
//!
//! A location is written as `epubcfi(/6/4[chap01]!/4/2/1:12)`: the package
//! path selects the spine item (`/6` is the spine, `/4` its second itemref),
//! `!` steps into the content document, and `:12` is a character offset.
//! Ranges are written `epubcfi(parent,start,end)` with relative start/end.
//!
//! Reference: <https://idpf.org/epub/linking/cfi/epub-cfi.html>

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "epubcfi(";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfiError {
    #[error("malformed location identifier `{0}`")]
    Malformed(String),

    #[error("location identifier `{0}` does not address a spine item")]
    NoSpineItem(String),
}

/// A point inside one spine section: content-document element steps and an
/// optional character offset on the last step.
#[derive(Debug, Clone, Default)]
struct Point {
    steps: Vec<u32>,
    offset: Option<u32>,
}

impl Point {
    fn cmp_position(&self, other: &Point) -> Ordering {
        // A missing step sorts before any present one; a missing offset
        // behaves as offset 0.
        self.steps
            .cmp(&other.steps)
            .then_with(|| self.offset.unwrap_or(0).cmp(&other.offset.unwrap_or(0)))
    }
}

/// Portable, layout-independent reading position.
///
/// Equality and ordering follow reading order: spine position first, then the
/// content path, then the character offset. Id assertions (`[chap01]`) are
/// kept in the serialized form but never affect comparison. A range orders by
/// its start, and after a point at the same start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationId {
    raw: String,
    spine_index: usize,
    start: Point,
    end: Option<Point>,
}

impl LocationId {
    pub fn parse(input: &str) -> Result<Self, CfiError> {
        let trimmed = input.trim();
        let inner = trimmed
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| CfiError::Malformed(input.to_string()))?;

        let mut parts = split_top_level(inner).into_iter();
        let parent = parts
            .next()
            .ok_or_else(|| CfiError::Malformed(input.to_string()))?;
        let parent = PathParser::new(parent, input).parse()?;
        let relative: Vec<&str> = parts.collect();

        let spine_index = parent
            .spine_index()
            .ok_or_else(|| CfiError::NoSpineItem(input.to_string()))?;

        let (start, end) = match relative.as_slice() {
            [] => (parent.point(), None),
            [start, end] => {
                let start = PathParser::new(start, input).parse()?;
                let end = PathParser::new(end, input).parse()?;
                (parent.extend(&start), Some(parent.extend(&end)))
            }
            _ => return Err(CfiError::Malformed(input.to_string())),
        };

        Ok(Self {
            raw: trimmed.to_string(),
            spine_index,
            start,
            end,
        })
    }

    /// Location of the start of a spine section, before any content.
    pub fn section_start(spine_index: usize) -> Self {
        Self::from_steps(spine_index, None, &[], None)
    }

    /// Builds a point location from content-document steps. Each step is a
    /// child index (even for elements, odd for text) with an optional id
    /// assertion.
    pub fn from_steps(
        spine_index: usize,
        itemref_id: Option<&str>,
        steps: &[(u32, Option<String>)],
        offset: Option<u32>,
    ) -> Self {
        let mut raw = format!("{PREFIX}/6/{}", (spine_index + 1) * 2);
        if let Some(id) = itemref_id {
            raw.push_str(&format!("[{id}]"));
        }
        raw.push('!');
        for (index, id) in steps {
            raw.push_str(&format!("/{index}"));
            if let Some(id) = id {
                raw.push_str(&format!("[{id}]"));
            }
        }
        if let Some(offset) = offset {
            raw.push_str(&format!(":{offset}"));
        }
        raw.push(')');

        Self {
            raw,
            spine_index,
            start: Point {
                steps: steps.iter().map(|(index, _)| *index).collect(),
                offset,
            },
            end: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn spine_index(&self) -> usize {
        self.spine_index
    }

    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// Character offset of the start point, if any.
    pub fn offset(&self) -> Option<u32> {
        self.start.offset
    }

    /// Whether both start points address the same node, offsets aside.
    pub fn same_node(&self, other: &LocationId) -> bool {
        self.spine_index == other.spine_index && self.start.steps == other.start.steps
    }
}

impl PartialEq for LocationId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LocationId {}

impl PartialOrd for LocationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.spine_index
            .cmp(&other.spine_index)
            .then_with(|| self.start.cmp_position(&other.start))
            .then_with(|| match (&self.end, &other.end) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp_position(b),
            })
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for LocationId {
    type Err = CfiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LocationId {
    type Error = CfiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LocationId> for String {
    fn from(value: LocationId) -> Self {
        value.raw
    }
}

/// Splits on commas that are not inside an assertion bracket.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut escaped = false;
    let mut last = 0;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '^' => escaped = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[last..]);
    parts
}

#[derive(Debug, Default)]
struct ParsedPath {
    package: Vec<u32>,
    content: Option<Vec<u32>>,
    offset: Option<u32>,
}

impl ParsedPath {
    fn spine_index(&self) -> Option<usize> {
        // `/6/N`: N is the even, one-based position of the itemref.
        let itemref = *self.package.get(1)?;
        if itemref < 2 || itemref % 2 != 0 {
            return None;
        }
        Some((itemref / 2 - 1) as usize)
    }

    fn point(&self) -> Point {
        Point {
            steps: self.content.clone().unwrap_or_default(),
            offset: self.offset,
        }
    }

    fn extend(&self, relative: &ParsedPath) -> Point {
        let mut steps = self.content.clone().unwrap_or_default();
        steps.extend(relative.package.iter().copied());
        if let Some(content) = &relative.content {
            steps.extend(content.iter().copied());
        }
        Point {
            steps,
            offset: relative.offset,
        }
    }
}

struct PathParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    original: &'a str,
}

impl<'a> PathParser<'a> {
    fn new(path: &'a str, original: &'a str) -> Self {
        Self {
            bytes: path.as_bytes(),
            pos: 0,
            original,
        }
    }

    fn malformed(&self) -> CfiError {
        CfiError::Malformed(self.original.to_string())
    }

    fn parse(mut self) -> Result<ParsedPath, CfiError> {
        let mut path = ParsedPath::default();
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            match b {
                b'/' => {
                    if path.offset.is_some() {
                        return Err(self.malformed());
                    }
                    let index = self.number()?;
                    self.skip_assertion()?;
                    match path.content.as_mut() {
                        Some(content) => content.push(index),
                        None => path.package.push(index),
                    }
                }
                b'!' => {
                    if path.content.is_some() {
                        return Err(self.malformed());
                    }
                    path.content = Some(Vec::new());
                }
                b':' => {
                    path.offset = Some(self.number()?);
                    self.skip_assertion()?;
                }
                b'~' | b'@' => {
                    // Temporal and spatial offsets do not take part in ordering.
                    while let Some(&c) = self.bytes.get(self.pos) {
                        if c.is_ascii_digit() || c == b'.' || c == b':' {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    self.skip_assertion()?;
                }
                _ => return Err(self.malformed()),
            }
        }
        Ok(path)
    }

    fn number(&mut self) -> Result<u32, CfiError> {
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.malformed());
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.malformed())
    }

    fn skip_assertion(&mut self) -> Result<(), CfiError> {
        if self.bytes.get(self.pos) != Some(&b'[') {
            return Ok(());
        }
        self.pos += 1;
        let mut escaped = false;
        while let Some(&c) = self.bytes.get(self.pos) {
            self.pos += 1;
            if escaped {
                escaped = false;
            } else if c == b'^' {
                escaped = true;
            } else if c == b']' {
                return Ok(());
            }
        }
        Err(self.malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> LocationId {
        LocationId::parse(s).unwrap()
    }

    #[test]
    fn test_spine_index_extraction() {
        assert_eq!(loc("epubcfi(/6/2!/4/2)").spine_index(), 0);
        assert_eq!(loc("epubcfi(/6/4[chap02]!/4/2/1:3)").spine_index(), 1);
        assert_eq!(loc("epubcfi(/6/14!)").spine_index(), 6);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(LocationId::parse("/6/4!/4").is_err());
        assert!(LocationId::parse("epubcfi(/6/4!/x)").is_err());
        assert!(LocationId::parse("epubcfi(/6/4[unterminated!/4)").is_err());
        assert!(matches!(
            LocationId::parse("epubcfi(/6/3!/4)"),
            Err(CfiError::NoSpineItem(_))
        ));
        assert!(LocationId::parse("epubcfi(/6/4!/4,/1:0)").is_err());
    }

    #[test]
    fn test_ordering_follows_reading_order() {
        let a = loc("epubcfi(/6/2!/4/10/1:40)");
        let b = loc("epubcfi(/6/4!/4/2)");
        let c = loc("epubcfi(/6/4!/4/2/1:5)");
        let d = loc("epubcfi(/6/4!/4/6)");
        let e = loc("epubcfi(/6/4!/4/6:12)");

        let mut shuffled = vec![e.clone(), b.clone(), d.clone(), a.clone(), c.clone()];
        shuffled.sort();
        assert_eq!(shuffled, vec![a, b, c, d, e]);
    }

    #[test]
    fn test_assertions_do_not_affect_equality() {
        assert_eq!(
            loc("epubcfi(/6/4[chap02]!/4/2[intro])"),
            loc("epubcfi(/6/4!/4/2)")
        );
        assert_eq!(loc("epubcfi(/6/4!/4/2:0)"), loc("epubcfi(/6/4!/4/2)"));
    }

    #[test]
    fn test_section_start_precedes_content() {
        let start = LocationId::section_start(1);
        assert_eq!(start.as_str(), "epubcfi(/6/4!)");
        assert!(start < loc("epubcfi(/6/4!/4/2)"));
        assert!(start > loc("epubcfi(/6/2!/4/99:1000)"));
    }

    #[test]
    fn test_range_orders_by_start() {
        let range = loc("epubcfi(/6/4!/4/2,/1:5,/1:20)");
        assert!(range.is_range());
        assert_eq!(range.offset(), Some(5));
        assert!(range > loc("epubcfi(/6/4!/4/2/1:4)"));
        assert!(range < loc("epubcfi(/6/4!/4/2/1:6)"));
        assert!(range > loc("epubcfi(/6/4!/4/2/1:5)"));
    }

    #[test]
    fn test_from_steps_serializes_assertions() {
        let built = LocationId::from_steps(
            2,
            Some("ch3"),
            &[(4, None), (6, Some("sec2".to_string()))],
            None,
        );
        assert_eq!(built.as_str(), "epubcfi(/6/6[ch3]!/4/6[sec2])");
        assert_eq!(built, loc("epubcfi(/6/6!/4/6)"));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let original = loc("epubcfi(/6/4!/4/2/1:3)");
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "\"epubcfi(/6/4!/4/2/1:3)\"");
        let back: LocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), original.as_str());
        assert!(serde_json::from_str::<LocationId>("\"nope\"").is_err());
    }
}
