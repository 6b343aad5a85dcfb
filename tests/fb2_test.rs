//! FB2 driver tests, plain and zipped.

use std::io::Write;

use tempfile::NamedTempFile;
use tome::{EbookDriver, Fb2Driver, StyleKind};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const BOOK: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
 <stylesheet type="text/css">p { text-indent: 1em; }</stylesheet>
 <description>
  <title-info>
   <author><first-name>Eric</first-name><last-name>Weiner</last-name></author>
   <book-title>The Geography of Bliss</book-title>
   <annotation><p>One grump.</p><empty-line/></annotation>
   <lang>en</lang>
   <coverpage><image l:href="#cover.jpg"/></coverpage>
  </title-info>
  <publish-info>
   <publisher>Twelve</publisher>
   <year>2008</year>
   <isbn>9780446511070</isbn>
  </publish-info>
 </description>
 <body>
  <section>
   <title><p>Chapter One</p></title>
   <epigraph><p>Quoted wisdom.</p><text-author>A. Sage</text-author></epigraph>
   <p>First paragraph.</p>
   <cite><p>Inner quote.</p></cite>
   <poem><stanza><v>roses are red</v><v>violets are blue</v></stanza></poem>
  </section>
  <section>
   <title>Two</title>
   <p>Second.</p>
  </section>
 </body>
 <binary id="cover.jpg" content-type="image/jpeg">/9j/4AAQSkZJRg==</binary>
</FictionBook>"##;

fn plain_fixture(xml_text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(xml_text.as_bytes()).expect("write fixture");
    file
}

fn zipped_fixture(xml_text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    {
        let mut zip = ZipWriter::new(&mut file);
        zip.start_file("book.fb2", SimpleFileOptions::default()).unwrap();
        zip.write_all(xml_text.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    file
}

#[test]
fn plain_and_zipped_sources_probe_true() {
    for file in [plain_fixture(BOOK), zipped_fixture(BOOK)] {
        let mut driver = Fb2Driver::new(file.path());
        assert!(driver.is_valid());
    }
}

#[test]
fn meta_fields() {
    for file in [plain_fixture(BOOK), zipped_fixture(BOOK)] {
        let mut driver = Fb2Driver::new(file.path());
        let meta = driver.meta().unwrap();

        assert_eq!(meta.title, "The Geography of Bliss");
        assert_eq!(meta.author.as_deref(), Some("Eric Weiner"));
        assert_eq!(meta.publisher.as_deref(), Some("Twelve"));
        assert_eq!(meta.isbn.as_deref(), Some("9780446511070"));
        assert_eq!(meta.description.as_deref(), Some("<p>One grump.</p>"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.license, None); // FB2 has no license field
        assert_eq!(meta.publish_year, Some(2008));
        assert_eq!(meta.publish_month, None);
        assert_eq!(meta.publish_day, None);
    }
}

#[test]
fn nickname_is_the_author_fallback() {
    let book = BOOK.replace(
        "<author><first-name>Eric</first-name><last-name>Weiner</last-name></author>",
        "<author><nickname>X</nickname></author>",
    );
    let file = plain_fixture(&book);
    let mut driver = Fb2Driver::new(file.path());
    assert_eq!(driver.meta().unwrap().author.as_deref(), Some("X"));
}

#[test]
fn missing_publish_info_leaves_fields_null() {
    let book = BOOK.replace(
        "<publish-info>\n   <publisher>Twelve</publisher>\n   <year>2008</year>\n   <isbn>9780446511070</isbn>\n  </publish-info>",
        "",
    );
    let file = plain_fixture(&book);
    let mut driver = Fb2Driver::new(file.path());
    let meta = driver.meta().unwrap();
    assert_eq!(meta.publisher, None);
    assert_eq!(meta.isbn, None);
    assert_eq!(meta.publish_year, None);
}

#[test]
fn sections_assemble_text_with_nested_structures() {
    let file = plain_fixture(BOOK);
    let mut driver = Fb2Driver::new(file.path());
    let data = driver.data().unwrap();

    assert_eq!(data.len(), 2);

    let first = &data[0];
    assert_eq!(first.title.as_deref(), Some("Chapter One"));
    assert_eq!(
        first.text,
        "<p>First paragraph.</p>\
         <blockquote><p>Inner quote.</p></blockquote>\
         <p>roses are red</p><p>violets are blue</p>"
    );
    assert_eq!(first.navigation, None);

    assert_eq!(first.epigraphs.len(), 1);
    assert_eq!(first.epigraphs[0].text, "<p>Quoted wisdom.</p>");
    assert_eq!(first.epigraphs[0].authors, vec!["A. Sage\n"]);

    let second = &data[1];
    assert_eq!(second.title.as_deref(), Some("Two"));
    assert_eq!(second.text, "<p>Second.</p>");
    assert!(second.epigraphs.is_empty());
}

#[test]
fn stylesheet_is_shared_by_all_sections() {
    let file = plain_fixture(BOOK);
    let mut driver = Fb2Driver::new(file.path());
    let data = driver.data().unwrap();

    for entry in &data {
        assert_eq!(entry.styles.len(), 1);
        assert_eq!(entry.styles[0].kind, StyleKind::Css);
        assert_eq!(entry.styles[0].content, "p { text-indent: 1em; }");
    }
}

#[test]
fn document_without_stylesheet_has_no_styles() {
    let book = BOOK.replace(
        r#"<stylesheet type="text/css">p { text-indent: 1em; }</stylesheet>"#,
        "",
    );
    let file = plain_fixture(&book);
    let mut driver = Fb2Driver::new(file.path());
    let data = driver.data().unwrap();
    assert!(data[0].styles.is_empty());
}

#[test]
fn cover_decodes_inline_binary() {
    let file = plain_fixture(BOOK);
    let mut driver = Fb2Driver::new(file.path());
    let cover = driver.cover().unwrap().expect("cover");
    assert_eq!(cover.mime, "image/jpeg");
    assert!(cover.data.starts_with(&[0xFF, 0xD8, 0xFF, 0xE0]));
}

#[test]
fn cover_is_none_without_coverpage() {
    let book = BOOK.replace(r##"<coverpage><image l:href="#cover.jpg"/></coverpage>"##, "");
    let file = plain_fixture(&book);
    let mut driver = Fb2Driver::new(file.path());
    assert!(driver.cover().unwrap().is_none());
}

#[test]
fn missing_description_is_fatal() {
    let file = plain_fixture("<FictionBook><body><section><p>x</p></section></body></FictionBook>");
    let mut driver = Fb2Driver::new(file.path());
    assert!(!driver.is_valid());
    assert!(driver.meta().is_err());
}

#[test]
fn fake_files_probe_false_and_fail_typed() {
    let mut fake_xml = NamedTempFile::new().unwrap();
    fake_xml.write_all(b"<fake>\xFF\xFE</fake>").unwrap();
    let mut fake_zip = NamedTempFile::new().unwrap();
    {
        let mut zip = ZipWriter::new(&mut fake_zip);
        zip.start_file("fake.bin", SimpleFileOptions::default()).unwrap();
        zip.write_all(&[0xFF, 0xFE, 0x00, 0x01]).unwrap();
        zip.finish().unwrap();
    }

    for file in [&fake_xml, &fake_zip] {
        let mut driver = Fb2Driver::new(file.path());
        assert!(!driver.is_valid());
        assert!(driver.meta().is_err());
    }
}
