//! Plain-text driver tests.

use std::io::Write;

use tempfile::NamedTempFile;
use tome::{EbookDriver, TxtDriver};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn plain_fixture(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content).expect("write fixture");
    file
}

fn zipped_fixture(entries: &[(&str, &[u8])]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    {
        let mut zip = ZipWriter::new(&mut file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }
    file
}

#[test]
fn utf8_text_probes_true() {
    let file = plain_fixture("First line\nSecond line\n".as_bytes());
    let mut driver = TxtDriver::new(file.path());
    assert!(driver.is_valid());
}

#[test]
fn binary_content_probes_false() {
    let file = plain_fixture(&[0xFF, 0xFE, 0x00, 0x01, b'\n', 0x80, b'\n']);
    let mut driver = TxtDriver::new(file.path());
    assert!(!driver.is_valid());
}

#[test]
fn title_is_the_first_nonempty_line() {
    let file = plain_fixture(b"\n\n  The Title  \nBody line 1\nBody line 2\n");
    let mut driver = TxtDriver::new(file.path());
    let meta = driver.meta().unwrap();
    assert_eq!(meta.title, "The Title");
    assert_eq!(meta.author, None);
}

#[test]
fn data_is_the_whole_trimmed_text() {
    let file = plain_fixture(b"\n\n  The Title  \nBody line 1\nBody line 2\n");
    let mut driver = TxtDriver::new(file.path());
    let data = driver.data().unwrap();

    assert_eq!(data.len(), 1);
    assert_eq!(data[0].text, "The Title  \nBody line 1\nBody line 2");
    assert_eq!(data[0].title.as_deref(), Some("The Title"));
    assert!(data[0].styles.is_empty());
    assert_eq!(data[0].navigation, None);
}

#[test]
fn single_line_has_no_data_title() {
    let file = plain_fixture(b"Only one line, no break");
    let mut driver = TxtDriver::new(file.path());
    let data = driver.data().unwrap();
    assert_eq!(data[0].title, None);
    assert_eq!(data[0].text, "Only one line, no break");
}

#[test]
fn zipped_text_uses_the_first_txt_entry() {
    let file = zipped_fixture(&[
        ("notes.md", b"# not this one"),
        ("story.txt", b"Zipped Title\nZipped body\n"),
    ]);
    let mut driver = TxtDriver::new(file.path());
    assert!(driver.is_valid());
    assert_eq!(driver.meta().unwrap().title, "Zipped Title");
}

#[test]
fn zip_without_txt_entry_fails() {
    let file = zipped_fixture(&[("story.md", b"markdown only")]);
    let mut driver = TxtDriver::new(file.path());
    assert!(!driver.is_valid());
    assert!(driver.meta().is_err());
}

#[test]
fn cover_comes_from_well_known_archive_names() {
    let jpeg: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];
    let file = zipped_fixture(&[
        ("story.txt", b"Title\nBody\n"),
        ("cover.jpg", jpeg),
    ]);
    let mut driver = TxtDriver::new(file.path());
    let cover = driver.cover().unwrap().expect("cover");
    assert_eq!(cover.mime, "image/jpeg");
    assert_eq!(cover.data, jpeg);
}

#[test]
fn unrelated_archive_images_are_ignored() {
    let file = zipped_fixture(&[
        ("story.txt", b"Title\nBody\n"),
        ("illustration.jpg", &[0xFF, 0xD8, 0xFF, 0xE0]),
    ]);
    let mut driver = TxtDriver::new(file.path());
    assert!(driver.cover().unwrap().is_none());
}

#[test]
fn plain_file_has_no_cover() {
    let file = plain_fixture(b"Title\nBody\n");
    let mut driver = TxtDriver::new(file.path());
    assert!(driver.cover().unwrap().is_none());
}
