//! Maildir delivery.

use gangway::mail::MailSink;
use gangway_types::{EmailAddress, EmailMessage, EmailSession};

#[tokio::test]
async fn delivery_lands_in_new_and_leaves_tmp_empty() {
    let dir = tempfile::tempdir().unwrap();
    let sink = MailSink::new(dir.path());

    let email = EmailMessage {
        date: 816416724 * 1_000_000_000,
        to: vec![EmailAddress { name: "Bob".into(), address: "bob@example.org".into() }],
        from: EmailAddress { name: String::new(), address: "alice@example.org".into() },
        subject: "Hello".into(),
        text: Some("body text".into()),
        ..EmailMessage::default()
    };
    sink.send(email).await.unwrap();

    let tmp_entries: Vec<_> = std::fs::read_dir(dir.path().join("tmp"))
        .unwrap()
        .collect();
    assert!(tmp_entries.is_empty(), "tmp must be empty after rename");

    let new_entries: Vec<_> = std::fs::read_dir(dir.path().join("new"))
        .unwrap()
        .map(|entry| entry.unwrap())
        .collect();
    assert_eq!(new_entries.len(), 1);

    let name = new_entries[0].file_name().into_string().unwrap();
    assert!(name.starts_with('_'));

    let text = std::fs::read_to_string(new_entries[0].path()).unwrap();
    assert!(text.contains("To: Bob <bob@example.org>"));
    assert!(text.contains("From: alice@example.org"));
    assert!(text.contains("Subject: Hello"));
    assert!(text.contains("Date: Wed, 15 Nov 1995 06:25:24 +0000"));
    assert!(text.contains("multipart/alternative"));
    assert!(text.contains("body text"));
}

#[tokio::test]
async fn each_message_gets_its_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = MailSink::new(dir.path());

    for i in 0..3 {
        let email = EmailMessage {
            subject: format!("msg {i}"),
            text: Some("x".into()),
            ..EmailMessage::default()
        };
        sink.send(email).await.unwrap();
    }

    let count = std::fs::read_dir(dir.path().join("new")).unwrap().count();
    assert_eq!(count, 3);
}
