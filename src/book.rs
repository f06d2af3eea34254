use crate::archive::Archive;
use crate::codec::{LocationId, ReadingDirection};
use serde::{Deserialize, Serialize};

/// A title or other metadata string, possibly given per language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageMap {
    Plain(String),
    Localized(Vec<(String, String)>),
}

impl LanguageMap {
    /// Display form: the plain value, or the first localized value.
    pub fn format(&self) -> &str {
        match self {
            LanguageMap::Plain(value) => value,
            LanguageMap::Localized(values) => values.first().map(|(_, v)| v.as_str()).unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub title: Option<LanguageMap>,
    pub creator: Option<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
    pub direction: ReadingDirection,
}

impl BookMetadata {
    pub fn display_title(&self) -> &str {
        self.title.as_ref().map(LanguageMap::format).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    pub idref: String,
    /// Archive-absolute path of the content document.
    pub href: String,
    pub media_type: String,
    pub linear: bool,
}

/// One navigation entry. Children keep document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub id: String,
    pub label: String,
    /// Archive-absolute target, optionally with a `#fragment`.
    pub href: String,
    /// Resolved position of the target, when its resource is in the spine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subitems: Vec<TocEntry>,
}

impl TocEntry {
    pub fn new(id: impl Into<String>, label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            href: href.into(),
            location: None,
            subitems: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_subitems(mut self, subitems: Vec<TocEntry>) -> Self {
        self.subitems = subitems;
        self
    }

    /// Target resource without the fragment.
    pub fn resource(&self) -> &str {
        split_fragment(&self.href).0
    }

    pub fn fragment(&self) -> Option<&str> {
        split_fragment(&self.href).1
    }
}

pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// Depth-first, pre-order walk: every entry precedes its subitems, which
/// precede the entry's next sibling.
pub fn flatten_toc(entries: &[TocEntry]) -> Vec<&TocEntry> {
    let mut flat = Vec::new();
    fn walk<'a>(entries: &'a [TocEntry], out: &mut Vec<&'a TocEntry>) {
        for entry in entries {
            out.push(entry);
            walk(&entry.subitems, out);
        }
    }
    walk(entries, &mut flat);
    flat
}

/// One non-blank text node of a section.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Location of the text node itself, without an offset.
    pub location: LocationId,
    /// Characters in the section before this node.
    pub chars_before: u64,
    pub chars: u64,
}

/// The text runs of one spine section, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionText {
    runs: Vec<TextRun>,
    chars: u64,
}

impl SectionText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next text node. Runs must arrive in document order.
    pub fn push(&mut self, location: LocationId, chars: u64) {
        self.runs.push(TextRun {
            location,
            chars_before: self.chars,
            chars,
        });
        self.chars += chars;
    }

    pub fn chars(&self) -> u64 {
        self.chars
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    /// Characters of this section that come before `location`.
    pub fn chars_before(&self, location: &LocationId) -> u64 {
        let after = self.runs.partition_point(|run| run.location <= *location);
        let Some(run) = after.checked_sub(1).map(|i| &self.runs[i]) else {
            return 0;
        };
        if run.location.same_node(location) {
            let offset = u64::from(location.offset().unwrap_or(0));
            run.chars_before + offset.min(run.chars)
        } else {
            run.chars_before + run.chars
        }
    }
}

/// Character-weighted progress lookup over the whole spine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationIndex {
    sections: Vec<SectionText>,
    section_starts: Vec<u64>,
    total: u64,
}

impl LocationIndex {
    pub fn from_sections(sections: Vec<SectionText>) -> Self {
        let mut section_starts = Vec::with_capacity(sections.len());
        let mut total = 0u64;
        for section in &sections {
            section_starts.push(total);
            total += section.chars();
        }
        Self {
            sections,
            section_starts,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn total_chars(&self) -> u64 {
        self.total
    }

    /// Fractions at which a section starts and ends.
    pub fn section_bounds(&self, spine_index: usize) -> Option<(f64, f64)> {
        if self.total == 0 {
            return None;
        }
        let start = *self.section_starts.get(spine_index)?;
        let size = self.sections[spine_index].chars();
        let total = self.total as f64;
        Some((start as f64 / total, (start + size) as f64 / total))
    }

    /// Whole-book fraction of a location, to the character.
    pub fn fraction_of(&self, location: &LocationId) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let spine_index = location.spine_index();
        let section = self.sections.get(spine_index)?;
        let before = self.section_starts[spine_index] + section.chars_before(location);
        Some((before as f64 / self.total as f64).clamp(0.0, 1.0))
    }

    /// Whole-book fraction with the section part taken from `section_fraction`.
    pub fn fraction(&self, location: &LocationId, section_fraction: f64) -> Option<f64> {
        let (start, end) = self.section_bounds(location.spine_index())?;
        let within = if section_fraction.is_finite() {
            section_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some((start + within * (end - start)).clamp(0.0, 1.0))
    }

    /// Progress after a relocation.
    ///
    /// In order of preference: the engine's position inside the section
    /// scaled into this index, the engine's whole-book fraction, then this
    /// index's own lookup of the location.
    pub fn progress(
        &self,
        location: &LocationId,
        fraction: Option<f64>,
        section_fraction: Option<f64>,
    ) -> Option<f64> {
        section_fraction
            .filter(|f| f.is_finite())
            .and_then(|within| self.fraction(location, within))
            .or_else(|| {
                fraction
                    .filter(|f| f.is_finite())
                    .map(|f| f.clamp(0.0, 1.0))
            })
            .or_else(|| self.fraction_of(location))
    }
}

/// Parsed book handle, exclusively owned by the session.
#[derive(Debug)]
pub struct Book {
    pub metadata: BookMetadata,
    pub spine: Vec<SpineItem>,
    pub toc: Vec<TocEntry>,
    pub locations: LocationIndex,
    archive: Option<Archive>,
}

impl Book {
    pub fn new(
        metadata: BookMetadata,
        spine: Vec<SpineItem>,
        toc: Vec<TocEntry>,
        locations: LocationIndex,
    ) -> Self {
        Self {
            metadata,
            spine,
            toc,
            locations,
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: Archive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn archive(&self) -> Option<&Archive> {
        self.archive.as_ref()
    }

    pub fn direction(&self) -> ReadingDirection {
        self.metadata.direction
    }

    pub fn section_href(&self, spine_index: usize) -> Option<&str> {
        self.spine.get(spine_index).map(|item| item.href.as_str())
    }

    pub fn spine_index_of(&self, href: &str) -> Option<usize> {
        let (path, _) = split_fragment(href);
        self.spine.iter().position(|item| item.href == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, children: Vec<TocEntry>) -> TocEntry {
        TocEntry::new(label, label, format!("{label}.xhtml")).with_subitems(children)
    }

    #[test]
    fn test_flatten_is_preorder() {
        let toc = vec![
            entry("a", vec![entry("a1", vec![entry("a1x", vec![])]), entry("a2", vec![])]),
            entry("b", vec![]),
        ];
        let labels: Vec<_> = flatten_toc(&toc).iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "a1", "a1x", "a2", "b"]);
    }

    #[test]
    fn test_resource_and_fragment() {
        let e = TocEntry::new("n1", "Intro", "OEBPS/ch1.xhtml#intro");
        assert_eq!(e.resource(), "OEBPS/ch1.xhtml");
        assert_eq!(e.fragment(), Some("intro"));
        assert_eq!(TocEntry::new("n2", "Two", "OEBPS/ch2.xhtml").fragment(), None);
    }

    fn loc(raw: &str) -> LocationId {
        LocationId::parse(raw).unwrap()
    }

    /// Three sections of 100, 300 and 100 characters. The middle one has
    /// a heading and two paragraphs.
    fn index() -> LocationIndex {
        let mut first = SectionText::new();
        first.push(loc("epubcfi(/6/2!/4/2/1)"), 100);
        let mut middle = SectionText::new();
        middle.push(loc("epubcfi(/6/4!/4/2/1)"), 20);
        middle.push(loc("epubcfi(/6/4!/4/4/1)"), 180);
        middle.push(loc("epubcfi(/6/4!/4/6/1)"), 100);
        let mut last = SectionText::new();
        last.push(loc("epubcfi(/6/6!/4/2/1)"), 100);
        LocationIndex::from_sections(vec![first, middle, last])
    }

    #[test]
    fn test_section_bounds() {
        let index = index();
        assert_eq!(index.total_chars(), 500);
        assert_eq!(index.section_bounds(0), Some((0.0, 0.2)));
        assert_eq!(index.section_bounds(1), Some((0.2, 0.8)));
        assert_eq!(index.section_bounds(3), None);
    }

    #[test]
    fn test_fraction_reaches_inside_sections() {
        let index = index();
        assert_eq!(index.fraction_of(&LocationId::section_start(1)), Some(0.2));
        assert_eq!(index.fraction_of(&loc("epubcfi(/6/4!/4/2/1:0)")), Some(0.2));
        // 100 + 20 + 30 characters in.
        let mid = index.fraction_of(&loc("epubcfi(/6/4!/4/4/1:30)")).unwrap();
        assert!((mid - 0.3).abs() < 1e-9);
        // An element after the second paragraph sits past all of its text.
        let after = index.fraction_of(&loc("epubcfi(/6/4!/4/5)")).unwrap();
        assert!((after - 0.6).abs() < 1e-9);
        // Offsets past the end of a node stop at the node's end.
        let clamped = index.fraction_of(&loc("epubcfi(/6/4!/4/2/1:999)")).unwrap();
        assert!((clamped - 0.24).abs() < 1e-9);
    }

    #[test]
    fn test_fraction_grows_through_a_section() {
        let index = index();
        let fractions: Vec<f64> = [
            "epubcfi(/6/4!/4/2/1:5)",
            "epubcfi(/6/4!/4/4/1:0)",
            "epubcfi(/6/4!/4/4/1:90)",
            "epubcfi(/6/4!/4/6/1:50)",
        ]
        .iter()
        .map(|raw| index.fraction_of(&loc(raw)).unwrap())
        .collect();
        assert!(fractions.windows(2).all(|w| w[0] < w[1]), "{fractions:?}");
    }

    #[test]
    fn test_progress_preference() {
        let index = index();
        let at = loc("epubcfi(/6/4!/4/4/1:30)");

        let half = index.progress(&at, Some(0.9), Some(0.5)).unwrap();
        assert!((half - 0.5).abs() < 1e-9);
        assert_eq!(index.progress(&at, Some(0.45), None), Some(0.45));
        assert_eq!(index.progress(&at, Some(7.0), None), Some(1.0));
        let looked_up = index.progress(&at, None, None).unwrap();
        assert!((looked_up - 0.3).abs() < 1e-9);
        let looked_up = index.progress(&at, Some(f64::NAN), Some(f64::NAN)).unwrap();
        assert!((looked_up - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_empty_index_has_no_fraction() {
        let index = LocationIndex::from_sections(vec![SectionText::new(), SectionText::new()]);
        let loc = LocationId::section_start(0);
        assert!(index.is_empty());
        assert_eq!(index.fraction_of(&loc), None);
        assert_eq!(index.progress(&loc, None, Some(0.5)), None);
        assert_eq!(index.progress(&loc, Some(0.25), Some(0.5)), Some(0.25));
    }

    #[test]
    fn test_language_map_formatting() {
        let plain = LanguageMap::Plain("Dune".to_string());
        let localized = LanguageMap::Localized(vec![
            ("ja".to_string(), "砂の惑星".to_string()),
            ("en".to_string(), "Dune".to_string()),
        ]);
        assert_eq!(plain.format(), "Dune");
        assert_eq!(localized.format(), "砂の惑星");
        assert_eq!(LanguageMap::Localized(vec![]).format(), "");
    }
}
