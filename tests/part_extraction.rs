mod common;

use std::time::Duration;

use common::*;
use mailsift::config::SubjectlessPolicy;
use mailsift::extract::{safe_filename, PartExtractor};
use mailsift::naming::{FolderNamer, MailFolder};
use mailsift::types::{Header, LeafPart, MimePart, PartBody};

fn folder(root: &std::path::Path, subject: &str) -> MailFolder {
    FolderNamer::new(root, SubjectlessPolicy::Unique)
        .allocate(Some(subject))
        .unwrap()
}

#[tokio::test]
async fn nested_tree_writes_each_attachment_and_one_html_body() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Quarterly report");
    let source = FakeMailbox::new();

    let parts = vec![container(
        "multipart/mixed",
        vec![
            container(
                "multipart/alternative",
                vec![
                    plain("hello"),
                    container(
                        "multipart/related",
                        vec![html("<p>hello</p>"), inline_attachment("logo.png", b"PNG")],
                    ),
                ],
            ),
            inline_attachment("q3.pdf", b"%PDF-1.4 q3"),
            inline_attachment("q4.pdf", b"%PDF-1.4 q4"),
        ],
    )];

    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.attachments_written, 3);
    assert_eq!(report.html_written, 1);
    assert_eq!(report.text_parts, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(
        file_names(&folder.path),
        vec!["Quarterly_report.html", "logo.png", "q3.pdf", "q4.pdf"]
    );
    assert_eq!(
        std::fs::read(folder.path.join("Quarterly_report.html")).unwrap(),
        b"<p>hello</p>"
    );
    assert_eq!(std::fs::read(folder.path.join("q3.pdf")).unwrap(), b"%PDF-1.4 q3");
    assert_eq!(source.attachment_calls(), 0);
}

#[tokio::test]
async fn remote_attachment_is_fetched_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Invoice");
    let payload = b"\x00\x01binary invoice\xff";
    let source = FakeMailbox::new().with_attachment("m1", "ANGjdJ8", payload);

    let parts = vec![remote_attachment("invoice.pdf", "ANGjdJ8", payload.len() as u64)];
    let report = PartExtractor::new(&source, 2)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(source.attachment_calls(), 1);
    assert_eq!(report.attachments_written, 1);
    assert_eq!(std::fs::read(folder.path.join("invoice.pdf")).unwrap(), payload);
}

#[tokio::test]
async fn plain_text_and_unflagged_parts_are_not_written() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Text only");
    let source = FakeMailbox::new();

    let calendar = MimePart::Leaf(LeafPart {
        mime_type: "text/calendar".into(),
        filename: None,
        body: PartBody::Inline(encode(b"BEGIN:VCALENDAR")),
        size: 15,
        headers: vec![Header::new("Content-Type", "text/calendar")],
    });
    let parts = vec![plain("just words"), calendar];

    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.text_parts, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.files_written(), 0);
    assert!(file_names(&folder.path).is_empty());
}

#[tokio::test]
async fn attachment_without_filename_is_reported_and_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Nameless");
    let source = FakeMailbox::new();

    let nameless = MimePart::Leaf(LeafPart {
        mime_type: "application/octet-stream".into(),
        filename: None,
        body: PartBody::Inline(encode(b"data")),
        size: 4,
        headers: vec![Header::new("content-disposition", "ATTACHMENT")],
    });

    let report = PartExtractor::new(&source, 0)
        .extract("m1", &[nameless], &folder)
        .await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.attachments_written, 0);
    assert!(file_names(&folder.path).is_empty());
}

#[tokio::test]
async fn attachment_names_cannot_escape_the_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Sneaky");
    let source = FakeMailbox::new();

    let parts = vec![inline_attachment("../../evil.sh", b"#!/bin/sh")];
    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.attachments_written, 1);
    assert_eq!(file_names(&folder.path), vec!["evil.sh"]);
    assert!(!tmp.path().join("evil.sh").exists());
}

#[tokio::test]
async fn attachments_never_replace_the_body_or_each_other() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "News");
    let source = FakeMailbox::new();

    let parts = vec![
        html("<p>body</p>"),
        inline_attachment("News.html", b"ATTACHMENT"),
        inline_attachment("a.pdf", b"one"),
        inline_attachment("a.pdf", b"two"),
    ];
    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.files_written(), 4);
    assert_eq!(
        file_names(&folder.path),
        vec!["News.html", "News_1.html", "a.pdf", "a_1.pdf"]
    );
    let read = |name: &str| std::fs::read(folder.path.join(name)).unwrap();
    assert_eq!(read("News.html"), b"<p>body</p>");
    assert_eq!(read("News_1.html"), b"ATTACHMENT");
    assert_eq!(read("a.pdf"), b"one");
    assert_eq!(read("a_1.pdf"), b"two");
}

#[tokio::test]
async fn attachment_named_like_the_body_leaves_room_for_a_later_body() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "News");
    let source = FakeMailbox::new();

    let parts = vec![
        inline_attachment("News.html", b"ATTACHMENT"),
        html("<p>body</p>"),
    ];
    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.failures, 0);
    assert_eq!(file_names(&folder.path), vec!["News.html", "News_1.html"]);
    assert_eq!(
        std::fs::read(folder.path.join("News.html")).unwrap(),
        b"<p>body</p>"
    );
}

#[test]
fn safe_filename_keeps_only_the_last_component() {
    assert_eq!(safe_filename("report.pdf"), Some("report.pdf"));
    assert_eq!(safe_filename("dir/sub/report.pdf"), Some("report.pdf"));
    assert_eq!(safe_filename("C:\\Users\\x\\report.pdf"), Some("report.pdf"));
    assert_eq!(safe_filename(".."), None);
    assert_eq!(safe_filename("trailing/"), None);
    assert_eq!(safe_filename("  "), None);
}

#[tokio::test]
async fn only_the_first_html_body_is_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Twice");
    let source = FakeMailbox::new();

    let parts = vec![html("<p>first</p>"), html("<p>second</p>")];
    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.html_written, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        std::fs::read_to_string(folder.path.join("Twice.html")).unwrap(),
        "<p>first</p>"
    );
}

#[tokio::test]
async fn transient_attachment_errors_are_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Flaky");
    let source = FakeMailbox::new()
        .with_attachment("m1", "a1", b"finally")
        .failing_attachments(2);

    let parts = vec![remote_attachment("flaky.bin", "a1", 7)];
    let report = PartExtractor::new(&source, 2)
        .with_retry_delay(Duration::ZERO)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(source.attachment_calls(), 3);
    assert_eq!(report.attachments_written, 1);
    assert_eq!(std::fs::read(folder.path.join("flaky.bin")).unwrap(), b"finally");
}

#[tokio::test]
async fn retries_are_bounded_and_permanent_errors_are_not_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Broken");

    let flaky = FakeMailbox::new()
        .with_attachment("m1", "a1", b"never")
        .failing_attachments(10);
    let report = PartExtractor::new(&flaky, 1)
        .with_retry_delay(Duration::ZERO)
        .extract("m1", &[remote_attachment("a.bin", "a1", 5)], &folder)
        .await;
    assert_eq!(flaky.attachment_calls(), 2);
    assert_eq!(report.failures, 1);

    let gone = FakeMailbox::new().attachment_status(404);
    let report = PartExtractor::new(&gone, 3)
        .with_retry_delay(Duration::ZERO)
        .extract("m1", &[remote_attachment("b.bin", "a2", 5)], &folder)
        .await;
    assert_eq!(gone.attachment_calls(), 1);
    assert_eq!(report.failures, 1);
    assert!(file_names(&folder.path).is_empty());
}

#[tokio::test]
async fn undecodable_html_does_not_stop_the_walk() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = folder(tmp.path(), "Garbled");
    let source = FakeMailbox::new();

    let garbled = MimePart::Leaf(LeafPart {
        mime_type: "text/html".into(),
        filename: None,
        body: PartBody::Inline("***not base64***".into()),
        size: 16,
        headers: Vec::new(),
    });
    let parts = vec![garbled, inline_attachment("kept.txt", b"ok")];

    let report = PartExtractor::new(&source, 0)
        .extract("m1", &parts, &folder)
        .await;

    assert_eq!(report.failures, 1);
    assert_eq!(file_names(&folder.path), vec!["kept.txt"]);
}
