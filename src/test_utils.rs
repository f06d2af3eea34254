use crate::annotations::Annotation;
use crate::appearance::Appearance;
use crate::archive::BookFile;
use crate::book::Book;
use crate::codec::{FrameGeometry, LocationId, NavPrimitive, ScreenPoint, Viewport};
use crate::error::{Result, SessionError};
use crate::view::{
    DocumentId, EventKind, ListenerId, ListenerTarget, NavTarget, OverlayPrimitive, PointerKind,
    RenderingView, SelectionRange,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::rc::Rc;
use zip::write::FileOptions;

/// Every command the session sent to a [`RecordingView`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCall {
    Open { title: String },
    Close,
    GoLeft,
    GoRight,
    GoTo(NavTarget),
    AddAnnotation(Annotation),
    DeleteAnnotation(LocationId),
    DrawOverlay(LocationId, OverlayPrimitive),
    SetStyles(Appearance),
    HostPointer(PointerKind, ScreenPoint),
}

/// Headless rendering view that records commands and tracks listeners.
///
/// Frames, selections and the CFIs returned for selected text are scripted
/// by the test.
#[derive(Debug)]
pub struct RecordingView {
    calls: Vec<ViewCall>,
    listeners: HashMap<ListenerId, (ListenerTarget, EventKind)>,
    next_listener_id: u64,
    frames: HashMap<DocumentId, FrameGeometry>,
    selections: HashMap<DocumentId, SelectionRange>,
    selection_cfis: HashMap<String, LocationId>,
    viewport: Viewport,
    fail_next_open: bool,
}

impl Default for RecordingView {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingView {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            listeners: HashMap::new(),
            next_listener_id: 0,
            frames: HashMap::new(),
            selections: HashMap::new(),
            selection_cfis: HashMap::new(),
            viewport: Viewport::new(800.0, 600.0),
            fail_next_open: false,
        }
    }

    /// A view ready to hand to `Session::render`.
    pub fn shared() -> Rc<RefCell<RecordingView>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn calls(&self) -> &[ViewCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<ViewCall> {
        std::mem::take(&mut self.calls)
    }

    /// Page-turn primitives issued so far.
    pub fn primitives(&self) -> Vec<NavPrimitive> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ViewCall::GoLeft => Some(NavPrimitive::GoLeft),
                ViewCall::GoRight => Some(NavPrimitive::GoRight),
                _ => None,
            })
            .collect()
    }

    pub fn listener_count(&self, target: ListenerTarget) -> usize {
        self.listeners.values().filter(|(t, _)| *t == target).count()
    }

    pub fn live_listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn has_listener(&self, target: ListenerTarget, kind: EventKind) -> bool {
        self.listeners.values().any(|entry| *entry == (target, kind))
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_frame(&mut self, doc: DocumentId, frame: FrameGeometry) {
        self.frames.insert(doc, frame);
    }

    /// Scripts the live selection in `doc` and the location the engine
    /// reports for it.
    pub fn select(&mut self, doc: DocumentId, range: SelectionRange, location: LocationId) {
        self.selection_cfis.insert(range.text.clone(), location);
        self.selections.insert(doc, range);
    }

    pub fn clear_selection(&mut self, doc: DocumentId) {
        self.selections.remove(&doc);
    }

    pub fn fail_next_open(&mut self) {
        self.fail_next_open = true;
    }
}

impl RenderingView for RecordingView {
    fn open(&mut self, book: &Book) -> Result<()> {
        if std::mem::take(&mut self.fail_next_open) {
            return Err(SessionError::unsupported("renderer rejected the book"));
        }
        self.calls.push(ViewCall::Open {
            title: book.metadata.display_title().to_string(),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(ViewCall::Close);
    }

    fn go_left(&mut self) {
        self.calls.push(ViewCall::GoLeft);
    }

    fn go_right(&mut self) {
        self.calls.push(ViewCall::GoRight);
    }

    fn go_to(&mut self, target: &NavTarget) {
        self.calls.push(ViewCall::GoTo(target.clone()));
    }

    fn get_cfi(&self, index: usize, range: Option<&SelectionRange>) -> Option<LocationId> {
        match range {
            Some(range) => self.selection_cfis.get(&range.text).cloned(),
            None => Some(LocationId::section_start(index)),
        }
    }

    fn add_annotation(&mut self, annotation: &Annotation) {
        self.calls.push(ViewCall::AddAnnotation(annotation.clone()));
    }

    fn delete_annotation(&mut self, location: &LocationId) {
        self.calls.push(ViewCall::DeleteAnnotation(location.clone()));
    }

    fn draw_overlay(&mut self, location: &LocationId, primitive: OverlayPrimitive) {
        self.calls
            .push(ViewCall::DrawOverlay(location.clone(), primitive));
    }

    fn set_styles(&mut self, appearance: &Appearance) {
        self.calls.push(ViewCall::SetStyles(appearance.clone()));
    }

    fn add_listener(&mut self, target: ListenerTarget, kind: EventKind) -> ListenerId {
        self.next_listener_id += 1;
        let id = ListenerId(self.next_listener_id);
        self.listeners.insert(id, (target, kind));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    fn frame_geometry(&self, doc: DocumentId) -> Option<FrameGeometry> {
        self.frames.get(&doc).cloned()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn selection(&self, doc: DocumentId) -> Option<SelectionRange> {
        self.selections.get(&doc).cloned()
    }

    fn dispatch_host_pointer(&mut self, kind: PointerKind, point: ScreenPoint) {
        self.calls.push(ViewCall::HostPointer(kind, point));
    }
}

#[derive(Debug, Clone)]
struct FixtureChapter {
    title: String,
    sections: Vec<String>,
    paragraphs: usize,
}

/// Builds small EPUB archives in memory.
///
/// Chapter `n` (1-based) lives at `OEBPS/text/ch{n}.xhtml` with an `h1` of id
/// `ch{n}` followed by one `section` per named subsection.
#[derive(Debug, Clone)]
pub struct EpubFixture {
    title: String,
    chapters: Vec<FixtureChapter>,
    rtl: bool,
    nav: bool,
    ncx: bool,
}

impl EpubFixture {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            chapters: Vec::new(),
            rtl: false,
            nav: true,
            ncx: false,
        }
    }

    /// "Three Chapters": chapters One, Two (with subsections a and b) and
    /// Three.
    pub fn three_chapters() -> Self {
        Self::new("Three Chapters")
            .chapter("One", &[])
            .chapter("Two", &["a", "b"])
            .chapter("Three", &[])
    }

    pub fn chapter(mut self, title: &str, sections: &[&str]) -> Self {
        self.chapters.push(FixtureChapter {
            title: title.to_string(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
            paragraphs: 3,
        });
        self
    }

    /// Pads the last chapter added so it weighs more in the location index.
    pub fn with_paragraphs(mut self, paragraphs: usize) -> Self {
        if let Some(chapter) = self.chapters.last_mut() {
            chapter.paragraphs = paragraphs;
        }
        self
    }

    pub fn rtl(mut self) -> Self {
        self.rtl = true;
        self
    }

    /// Navigation from an NCX only, no EPUB 3 nav document.
    pub fn ncx_only(mut self) -> Self {
        self.nav = false;
        self.ncx = true;
        self
    }

    pub fn chapter_href(number: usize) -> String {
        format!("OEBPS/text/ch{number}.xhtml")
    }

    pub fn book_file(&self) -> BookFile {
        BookFile::new(format!("{}.epub", self.title), self.build())
    }

    pub fn build(&self) -> Vec<u8> {
        let mut entries: Vec<(String, String)> = vec![
            ("META-INF/container.xml".to_string(), CONTAINER_XML.to_string()),
            ("OEBPS/content.opf".to_string(), self.package_document()),
        ];
        if self.nav {
            entries.push(("OEBPS/nav.xhtml".to_string(), self.nav_document()));
        }
        if self.ncx {
            entries.push(("OEBPS/toc.ncx".to_string(), self.ncx_document()));
        }
        for (i, chapter) in self.chapters.iter().enumerate() {
            entries.push((
                format!("OEBPS/text/ch{}.xhtml", i + 1),
                chapter_document(i + 1, chapter),
            ));
        }

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("mimetype", stored).expect("zip mimetype entry");
        zip.write_all(b"application/epub+zip").expect("zip mimetype data");
        for (name, content) in entries {
            zip.start_file(name, deflated).expect("zip entry");
            zip.write_all(content.as_bytes()).expect("zip entry data");
        }
        zip.finish().expect("finish zip").into_inner()
    }

    fn package_document(&self) -> String {
        let mut manifest = String::new();
        let mut spine = String::new();
        if self.nav {
            manifest.push_str(
                r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
"#,
            );
        }
        if self.ncx {
            manifest.push_str(
                r#"    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
"#,
            );
        }
        for n in 1..=self.chapters.len() {
            manifest.push_str(&format!(
                "    <item id=\"ch{n}\" href=\"text/ch{n}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
            ));
            spine.push_str(&format!("    <itemref idref=\"ch{n}\"/>\n"));
        }
        let direction = if self.rtl { "rtl" } else { "ltr" };
        let toc_attr = if self.ncx { r#" toc="ncx""# } else { "" };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:fixture-{slug}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>Fixture Author</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine page-progression-direction="{direction}"{toc_attr}>
{spine}  </spine>
</package>
"#,
            slug = self.title.to_lowercase().replace(' ', "-"),
            title = self.title,
        )
    }

    fn nav_document(&self) -> String {
        let mut items = String::new();
        for (i, chapter) in self.chapters.iter().enumerate() {
            let n = i + 1;
            items.push_str(&format!(
                "      <li><a href=\"text/ch{n}.xhtml\">{}</a>",
                chapter.title
            ));
            if !chapter.sections.is_empty() {
                items.push_str("\n        <ol>\n");
                for section in &chapter.sections {
                    items.push_str(&format!(
                        "          <li><a href=\"text/ch{n}.xhtml#{section}\">{} {section}</a></li>\n",
                        chapter.title
                    ));
                }
                items.push_str("        </ol>\n      ");
            }
            items.push_str("</li>\n");
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head><title>Contents</title></head>
  <body>
    <nav epub:type="toc" id="toc">
      <h1>Contents</h1>
      <ol>
{items}      </ol>
    </nav>
  </body>
</html>
"#
        )
    }

    fn ncx_document(&self) -> String {
        let mut points = String::new();
        let mut order = 0;
        for (i, chapter) in self.chapters.iter().enumerate() {
            let n = i + 1;
            order += 1;
            points.push_str(&format!(
                "    <navPoint id=\"np-{n}\" playOrder=\"{order}\">\n      <navLabel><text>{}</text></navLabel>\n      <content src=\"text/ch{n}.xhtml\"/>\n",
                chapter.title
            ));
            for section in &chapter.sections {
                order += 1;
                points.push_str(&format!(
                    "      <navPoint id=\"np-{n}-{section}\" playOrder=\"{order}\">\n        <navLabel><text>{} {section}</text></navLabel>\n        <content src=\"text/ch{n}.xhtml#{section}\"/>\n      </navPoint>\n",
                    chapter.title
                ));
            }
            points.push_str("    </navPoint>\n");
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head/>
  <docTitle><text>{}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
            self.title
        )
    }
}

fn chapter_document(number: usize, chapter: &FixtureChapter) -> String {
    let paragraph = "<p>Lorem ipsum dolor sit amet, consectetur adipiscing elit.</p>\n";
    let mut body = format!(
        "<h1 id=\"ch{number}\">{}</h1>\n{}",
        chapter.title,
        paragraph.repeat(chapter.paragraphs.max(1))
    );
    for section in &chapter.sections {
        body.push_str(&format!(
            "<section id=\"{section}\"><h2>{} {section}</h2>\n{}</section>\n",
            chapter.title,
            paragraph.repeat(chapter.paragraphs.max(1))
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>
{body}</body>
</html>
"#,
        chapter.title
    )
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;
