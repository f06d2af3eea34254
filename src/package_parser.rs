use crate::archive::Archive;
use crate::book::{
    Book, BookMetadata, LanguageMap, LocationIndex, SectionText, SpineItem, TocEntry, split_fragment,
};
use crate::codec::{LocationId, ReadingDirection};
use crate::error::{Result, SessionError};
use log::{debug, info, warn};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashMap;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const OPS_NS: &str = "http://www.idpf.org/2007/ops";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Turns an opened archive into a book handle.
///
/// The session depends only on this trait; EPUB container details stay behind it.
pub trait BookParser {
    fn parse(&self, archive: Archive) -> Result<Book>;
}

#[derive(Debug, Clone)]
struct ManifestItem {
    href: String,
    media_type: String,
    properties: String,
}

/// Reads the OCF container, the OPF package and the navigation document.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubPackageParser;

impl EpubPackageParser {
    pub fn new() -> Self {
        Self
    }
}

impl BookParser for EpubPackageParser {
    fn parse(&self, archive: Archive) -> Result<Book> {
        let container = archive
            .load_text(CONTAINER_PATH)
            .ok_or_else(|| SessionError::unsupported("missing META-INF/container.xml"))?;
        let opf_path = find_rootfile(&container)?;
        debug!("Package document at {opf_path}");

        let opf_text = archive
            .load_text(&opf_path)
            .ok_or_else(|| SessionError::unsupported(format!("missing package {opf_path}")))?;
        let opf = parse_xml(&opf_text)?;

        let metadata_node = child_element(opf.root_element(), "metadata");
        let manifest = read_manifest(&opf, &opf_path);
        let spine_node = child_element(opf.root_element(), "spine")
            .ok_or_else(|| SessionError::unsupported("package has no spine"))?;

        let spine = read_spine(spine_node, &manifest);
        if spine.is_empty() {
            return Err(SessionError::unsupported("spine has no readable items"));
        }

        let mut metadata = metadata_node.map(read_metadata).unwrap_or_default();
        metadata.direction =
            ReadingDirection::from_page_progression(spine_node.attribute("page-progression-direction"));

        let mut toc = read_nav_toc(&archive, &manifest)
            .or_else(|| read_ncx_toc(&archive, spine_node, &manifest))
            .unwrap_or_default();

        let mut sections = SectionCache::new(&archive, &spine);
        resolve_toc_locations(&mut toc, &mut sections);

        let locations = LocationIndex::from_sections(
            (0..spine.len()).map(|index| sections.text_runs(index)).collect(),
        );

        info!(
            "Parsed \"{}\": {} spine items, {} top-level toc entries, direction {:?}",
            metadata.display_title(),
            spine.len(),
            toc.len(),
            metadata.direction
        );

        Ok(Book::new(metadata, spine, toc, locations).with_archive(archive))
    }
}

fn parse_xml(text: &str) -> Result<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

fn find_rootfile(container: &str) -> Result<String> {
    let doc = parse_xml(container)?;
    doc.descendants()
        .find(|n| n.has_tag_name("rootfile"))
        .and_then(|n| n.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| SessionError::unsupported("container.xml names no rootfile"))
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn element_text(node: Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read_metadata(node: Node) -> BookMetadata {
    let mut titles = Vec::new();
    let mut metadata = BookMetadata::default();

    for child in node.children().filter(|n| n.is_element()) {
        let value = element_text(child);
        if value.is_empty() {
            continue;
        }
        match child.tag_name().name() {
            "title" => {
                let lang = child.attribute((XML_NS, "lang")).unwrap_or_default();
                titles.push((lang.to_string(), value));
            }
            "creator" if metadata.creator.is_none() => metadata.creator = Some(value),
            "language" if metadata.language.is_none() => metadata.language = Some(value),
            "identifier" if metadata.identifier.is_none() => metadata.identifier = Some(value),
            _ => {}
        }
    }

    metadata.title = match titles.len() {
        0 => None,
        1 => titles.pop().map(|(_, title)| LanguageMap::Plain(title)),
        _ => Some(LanguageMap::Localized(titles)),
    };
    metadata
}

fn read_manifest(opf: &Document, opf_path: &str) -> HashMap<String, ManifestItem> {
    let Some(manifest) = child_element(opf.root_element(), "manifest") else {
        warn!("Package has no manifest");
        return HashMap::new();
    };
    manifest
        .children()
        .filter(|n| n.has_tag_name("item"))
        .filter_map(|item| {
            let id = item.attribute("id")?;
            let href = item.attribute("href")?;
            Some((
                id.to_string(),
                ManifestItem {
                    href: resolve_href(opf_path, href),
                    media_type: item.attribute("media-type").unwrap_or_default().to_string(),
                    properties: item.attribute("properties").unwrap_or_default().to_string(),
                },
            ))
        })
        .collect()
}

fn read_spine(spine: Node, manifest: &HashMap<String, ManifestItem>) -> Vec<SpineItem> {
    spine
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "itemref")
        .filter_map(|itemref| {
            let idref = itemref.attribute("idref")?;
            let Some(item) = manifest.get(idref) else {
                warn!("Spine references unknown manifest item {idref}");
                return None;
            };
            Some(SpineItem {
                idref: idref.to_string(),
                href: item.href.clone(),
                media_type: item.media_type.clone(),
                linear: itemref.attribute("linear") != Some("no"),
            })
        })
        .collect()
}

fn read_nav_toc(archive: &Archive, manifest: &HashMap<String, ManifestItem>) -> Option<Vec<TocEntry>> {
    let nav = manifest
        .values()
        .find(|item| item.properties.split_whitespace().any(|p| p == "nav"))?;
    let text = archive.load_text(&nav.href)?;
    let doc = match parse_xml(&text) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Failed to parse navigation document {}: {e}", nav.href);
            return None;
        }
    };

    let navs: Vec<Node> = doc.descendants().filter(|n| n.has_tag_name("nav")).collect();
    let toc_nav = navs
        .iter()
        .find(|n| {
            n.attribute((OPS_NS, "type"))
                .is_some_and(|t| t.split_whitespace().any(|v| v == "toc"))
        })
        .or_else(|| navs.first())?;

    let list = toc_nav
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "ol")?;
    let mut counter = 0usize;
    let entries = read_nav_list(list, &nav.href, &mut counter);
    debug!("Navigation document yielded {counter} entries");
    (!entries.is_empty()).then_some(entries)
}

fn read_nav_list(list: Node, nav_href: &str, counter: &mut usize) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    for li in list
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "li")
    {
        let Some(label_node) = li
            .children()
            .find(|n| n.is_element() && matches!(n.tag_name().name(), "a" | "span"))
        else {
            continue;
        };
        *counter += 1;
        let id = li
            .attribute("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("toc-{counter}"));
        let href = label_node
            .attribute("href")
            .map(|h| resolve_href(nav_href, h))
            .unwrap_or_default();
        let subitems = li
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "ol")
            .map(|ol| read_nav_list(ol, nav_href, counter))
            .unwrap_or_default();

        entries.push(TocEntry::new(id, element_text(label_node), href).with_subitems(subitems));
    }
    entries
}

fn read_ncx_toc(
    archive: &Archive,
    spine: Node,
    manifest: &HashMap<String, ManifestItem>,
) -> Option<Vec<TocEntry>> {
    let ncx = spine
        .attribute("toc")
        .and_then(|id| manifest.get(id))
        .or_else(|| manifest.values().find(|item| item.media_type == NCX_MEDIA_TYPE))?;
    let text = archive.load_text(&ncx.href)?;
    let doc = match parse_xml(&text) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Failed to parse NCX {}: {e}", ncx.href);
            return None;
        }
    };
    let nav_map = doc.descendants().find(|n| n.has_tag_name("navMap"))?;
    let entries = read_nav_points(nav_map, &ncx.href);
    (!entries.is_empty()).then_some(entries)
}

fn read_nav_points(parent: Node, ncx_href: &str) -> Vec<TocEntry> {
    parent
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "navPoint")
        .map(|point| {
            let label = point
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "navLabel")
                .map(element_text)
                .unwrap_or_default();
            let href = point
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "content")
                .and_then(|c| c.attribute("src"))
                .map(|src| resolve_href(ncx_href, src))
                .unwrap_or_default();
            let id = point.attribute("id").unwrap_or_default();
            TocEntry::new(id, label, href).with_subitems(read_nav_points(point, ncx_href))
        })
        .collect()
}

/// Lazily parsed spine sections, keyed by spine index.
struct SectionCache<'a> {
    archive: &'a Archive,
    spine: &'a [SpineItem],
    texts: HashMap<usize, Option<String>>,
}

impl<'a> SectionCache<'a> {
    fn new(archive: &'a Archive, spine: &'a [SpineItem]) -> Self {
        Self {
            archive,
            spine,
            texts: HashMap::new(),
        }
    }

    fn spine_index_of(&self, resource: &str) -> Option<usize> {
        self.spine.iter().position(|item| item.href == resource)
    }

    /// Parses the section at `spine_index` and runs `f` on it. `None` when
    /// the section is missing or not well-formed.
    fn with_document<R>(
        &mut self,
        spine_index: usize,
        f: impl FnOnce(&Document) -> R,
    ) -> Option<R> {
        let archive = self.archive;
        let href = &self.spine[spine_index].href;
        let text = self
            .texts
            .entry(spine_index)
            .or_insert_with(|| archive.load_text(href))
            .as_deref()?;
        match parse_xml(text) {
            Ok(doc) => Some(f(&doc)),
            Err(e) => {
                debug!("Section {href} is not well-formed XML: {e}");
                None
            }
        }
    }

    fn locate(&mut self, spine_index: usize, fragment: Option<&str>) -> LocationId {
        let located = self
            .with_document(spine_index, |doc| element_steps(doc, fragment))
            .flatten();
        let idref = self.spine[spine_index].idref.as_str();
        match located {
            Some(steps) => LocationId::from_steps(spine_index, Some(idref), &steps, None),
            None => LocationId::section_start(spine_index),
        }
    }

    /// Every non-blank text node of the section with its location and length.
    fn text_runs(&mut self, spine_index: usize) -> SectionText {
        let idref = self.spine[spine_index].idref.clone();
        self.with_document(spine_index, |doc| {
            let mut section = SectionText::new();
            let Some(body) = doc.descendants().find(|n| n.has_tag_name("body")) else {
                return section;
            };
            for node in body.descendants().filter(|n| n.is_text()) {
                let Some(text) = node.text().filter(|t| !t.trim().is_empty()) else {
                    continue;
                };
                if let Some(steps) = node_steps(doc, node) {
                    let location =
                        LocationId::from_steps(spine_index, Some(idref.as_str()), &steps, None);
                    section.push(location, text.chars().count() as u64);
                }
            }
            section
        })
        .unwrap_or_default()
    }
}

/// Element steps from the root element down to the target: the element with
/// the given id, or `body` when there is no fragment.
fn element_steps(doc: &Document, fragment: Option<&str>) -> Option<Vec<(u32, Option<String>)>> {
    let target = match fragment {
        Some(id) => doc.descendants().find(|n| n.attribute("id") == Some(id))?,
        None => doc.descendants().find(|n| n.has_tag_name("body"))?,
    };
    node_steps(doc, target)
}

/// Child steps from the root element down to `target`. Elements take even
/// indices; a text node takes the odd index after the elements before it.
fn node_steps<'a, 'input>(
    doc: &'a Document<'input>,
    target: Node<'a, 'input>,
) -> Option<Vec<(u32, Option<String>)>> {
    let root = doc.root_element();
    let mut steps = Vec::new();
    let mut node = target;
    while node != root {
        let parent = node.parent_element()?;
        let elements_before = parent
            .children()
            .take_while(|n| *n != node)
            .filter(|n| n.is_element())
            .count() as u32;
        let index = if node.is_element() {
            (elements_before + 1) * 2
        } else {
            elements_before * 2 + 1
        };
        steps.push((index, node.attribute("id").map(str::to_string)));
        node = parent;
    }
    steps.reverse();
    Some(steps)
}

fn resolve_toc_locations(entries: &mut [TocEntry], sections: &mut SectionCache) {
    for entry in entries.iter_mut() {
        let (resource, fragment) = split_fragment(&entry.href);
        entry.location = sections
            .spine_index_of(resource)
            .map(|index| sections.locate(index, fragment));
        if entry.location.is_none() && !entry.href.is_empty() {
            debug!("Toc entry {} targets {} outside the spine", entry.label, entry.href);
        }
        resolve_toc_locations(&mut entry.subitems, sections);
    }
}

/// Resolves `href` relative to the document at `base`, yielding an
/// archive-absolute path. The fragment is kept.
pub fn resolve_href(base: &str, href: &str) -> String {
    let (path, fragment) = split_fragment(href);
    let decoded = percent_encoding::percent_decode_str(path).decode_utf8_lossy();

    let resolved = if decoded.is_empty() {
        base.to_string()
    } else {
        let mut parts: Vec<&str> = match base.rsplit_once('/') {
            Some((dir, _)) if !decoded.starts_with('/') => dir.split('/').collect(),
            _ => Vec::new(),
        };
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                s => parts.push(s),
            }
        }
        parts.join("/")
    };

    match fragment {
        Some(fragment) => format!("{resolved}#{fragment}"),
        None => resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS/content.opf", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/text/nav.xhtml", "../images/a.png"), "OEBPS/images/a.png");
        assert_eq!(resolve_href("OEBPS/text/ch1.xhtml", "#note"), "OEBPS/text/ch1.xhtml#note");
        assert_eq!(resolve_href("content.opf", "ch%201.xhtml#a"), "ch 1.xhtml#a");
        assert_eq!(resolve_href("OEBPS/toc.ncx", "/root.xhtml"), "root.xhtml");
    }

    #[test]
    fn test_element_steps_follow_child_positions() {
        let xhtml = r#"<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>x</title></head>
<body>
  <h1 id="top">Top</h1>
  <p>text</p>
  <section id="s1"><h2 id="s1h">One</h2></section>
</body>
</html>"#;
        let doc = parse_xml(xhtml).unwrap();

        let body = element_steps(&doc, None).unwrap();
        assert_eq!(body, vec![(4, None)]);

        let section = element_steps(&doc, Some("s1")).unwrap();
        assert_eq!(section, vec![(4, None), (6, Some("s1".to_string()))]);

        let heading = element_steps(&doc, Some("s1h")).unwrap();
        assert_eq!(
            heading,
            vec![(4, None), (6, Some("s1".to_string())), (2, Some("s1h".to_string()))]
        );

        assert!(element_steps(&doc, Some("missing")).is_none());
    }

    #[test]
    fn test_text_nodes_take_odd_steps() {
        let xhtml = r#"<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>x</title></head>
<body>
  <p>one <em>two</em> three</p>
</body>
</html>"#;
        let doc = parse_xml(xhtml).unwrap();
        let steps: Vec<Vec<u32>> = doc
            .descendants()
            .filter(|n| n.is_text() && !n.text().unwrap_or_default().trim().is_empty())
            .map(|n| node_steps(&doc, n).unwrap().into_iter().map(|(i, _)| i).collect())
            .collect();
        assert_eq!(
            steps,
            vec![vec![2, 2, 1], vec![4, 2, 1], vec![4, 2, 2, 1], vec![4, 2, 3]]
        );
    }

    #[test]
    fn test_localized_titles() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/">
<metadata>
  <dc:title xml:lang="fr">Le Livre</dc:title>
  <dc:title xml:lang="en">The Book</dc:title>
  <dc:creator>Anon</dc:creator>
  <dc:language>fr</dc:language>
</metadata>
</package>"#;
        let doc = parse_xml(opf).unwrap();
        let metadata = read_metadata(child_element(doc.root_element(), "metadata").unwrap());
        assert_eq!(metadata.display_title(), "Le Livre");
        assert_eq!(metadata.creator.as_deref(), Some("Anon"));
        assert_eq!(metadata.language.as_deref(), Some("fr"));
    }
}
