use reading_session::book::flatten_toc;
use reading_session::codec::ReadingDirection;
use reading_session::package_parser::{BookParser, EpubPackageParser};
use reading_session::test_utils::EpubFixture;
use reading_session::{Archive, Book, BookFile, LocationId};
use std::io::{Cursor, Write};
use zip::write::FileOptions;

fn parse(fixture: &EpubFixture) -> Book {
    let archive = Archive::open(fixture.book_file()).unwrap();
    EpubPackageParser::new().parse(archive).unwrap()
}

fn zip_with(entries: &[(&str, &str)]) -> BookFile {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    BookFile::new("broken.epub", zip.finish().unwrap().into_inner())
}

#[test]
fn test_metadata_and_spine() {
    let book = parse(&EpubFixture::three_chapters());

    assert_eq!(book.metadata.display_title(), "Three Chapters");
    assert_eq!(book.metadata.creator.as_deref(), Some("Fixture Author"));
    assert_eq!(book.metadata.language.as_deref(), Some("en"));
    assert_eq!(book.direction(), ReadingDirection::Ltr);

    let hrefs: Vec<&str> = book.spine.iter().map(|item| item.href.as_str()).collect();
    assert_eq!(
        hrefs,
        vec![
            EpubFixture::chapter_href(1),
            EpubFixture::chapter_href(2),
            EpubFixture::chapter_href(3)
        ]
    );
    assert_eq!(book.spine_index_of(&EpubFixture::chapter_href(2)), Some(1));
    assert!(book.archive().is_some());
}

#[test]
fn test_nav_document_toc_with_locations() {
    let book = parse(&EpubFixture::three_chapters());

    let labels: Vec<&str> = book.toc.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["One", "Two", "Three"]);

    let two = &book.toc[1];
    assert_eq!(two.href, EpubFixture::chapter_href(2));
    assert_eq!(
        two.location.as_ref().map(LocationId::as_str),
        Some("epubcfi(/6/4[ch2]!/4)")
    );

    let subsections: Vec<(&str, Option<&str>)> = two
        .subitems
        .iter()
        .map(|e| (e.label.as_str(), e.location.as_ref().map(LocationId::as_str)))
        .collect();
    // h1 and three paragraphs come first, so the sections are the 5th and 6th elements.
    assert_eq!(
        subsections,
        vec![
            ("Two a", Some("epubcfi(/6/4[ch2]!/4/10[a])")),
            ("Two b", Some("epubcfi(/6/4[ch2]!/4/12[b])")),
        ]
    );
}

#[test]
fn test_toc_locations_follow_reading_order() {
    let book = parse(&EpubFixture::three_chapters());
    let locations: Vec<&LocationId> = flatten_toc(&book.toc)
        .into_iter()
        .filter_map(|entry| entry.location.as_ref())
        .collect();

    assert_eq!(locations.len(), 5);
    assert!(locations.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_ncx_fallback() {
    let book = parse(&EpubFixture::three_chapters().ncx_only());

    assert_eq!(book.toc.len(), 3);
    assert_eq!(book.toc[0].id, "np-1");
    assert_eq!(book.toc[1].subitems.len(), 2);
    assert_eq!(book.toc[1].subitems[1].label, "Two b");
    assert_eq!(book.toc[1].subitems[1].fragment(), Some("b"));
    assert_eq!(
        book.toc[2].location.as_ref().map(LocationId::as_str),
        Some("epubcfi(/6/6[ch3]!/4)")
    );
}

#[test]
fn test_rtl_page_progression() {
    let book = parse(&EpubFixture::three_chapters().rtl());
    assert_eq!(book.direction(), ReadingDirection::Rtl);
    assert_eq!(book.metadata.direction, ReadingDirection::Rtl);
}

#[test]
fn test_location_index_weighs_sections_by_size() {
    let book = parse(
        &EpubFixture::new("Uneven")
            .chapter("Short", &[])
            .with_paragraphs(1)
            .chapter("Long", &[])
            .with_paragraphs(40),
    );

    assert_eq!(book.locations.section_count(), 2);
    let (_, short_end) = book.locations.section_bounds(0).unwrap();
    assert!(short_end < 0.25, "{short_end}");

    let halfway = book
        .locations
        .fraction(&LocationId::section_start(1), 0.5)
        .unwrap();
    assert!(halfway > short_end && halfway < 1.0);
}

#[test]
fn test_location_index_reaches_inside_a_section() {
    let book = parse(&EpubFixture::three_chapters());
    let (start, end) = book.locations.section_bounds(1).unwrap();

    // h1 text, part way into the first paragraph, the second paragraph,
    // then the heading inside section b.
    let fractions: Vec<f64> = [
        "epubcfi(/6/4!/4/2/1:0)",
        "epubcfi(/6/4!/4/4/1:10)",
        "epubcfi(/6/4!/4/6/1:0)",
        "epubcfi(/6/4!/4/12/2/1:0)",
    ]
    .iter()
    .map(|raw| {
        let location = LocationId::parse(raw).unwrap();
        book.locations.fraction_of(&location).unwrap()
    })
    .collect();

    assert_eq!(fractions[0], start);
    assert!(fractions.windows(2).all(|w| w[0] < w[1]), "{fractions:?}");
    assert!(*fractions.last().unwrap() < end);
}

#[test]
fn test_not_a_zip_is_unsupported() {
    let err = Archive::open(BookFile::new("plain.txt", b"hello".to_vec())).unwrap_err();
    assert!(err.is_unsupported_format());
}

#[test]
fn test_missing_container_is_unsupported() {
    let file = zip_with(&[("mimetype", "application/epub+zip"), ("OEBPS/content.opf", "<package/>")]);
    let err = EpubPackageParser::new()
        .parse(Archive::open(file).unwrap())
        .unwrap_err();
    assert!(err.is_unsupported_format());
}

#[test]
fn test_package_without_spine_is_unsupported() {
    let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
    let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata/>
  <manifest/>
</package>"#;
    let file = zip_with(&[("META-INF/container.xml", container), ("content.opf", opf)]);
    let err = EpubPackageParser::new()
        .parse(Archive::open(file).unwrap())
        .unwrap_err();
    assert!(err.is_unsupported_format());
}

#[test]
fn test_malformed_package_xml_is_unsupported() {
    let container = r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="content.opf"/></rootfiles>
</container>"#;
    let file = zip_with(&[("META-INF/container.xml", container), ("content.opf", "<package><spine>")]);
    let err = EpubPackageParser::new()
        .parse(Archive::open(file).unwrap())
        .unwrap_err();
    assert!(err.is_unsupported_format());
}
