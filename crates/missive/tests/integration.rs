//! Integration tests for message composition.
//!
//! Messages are built with the fluent builder, delivered to an in-memory
//! transport, and inspected as MIME trees, wire bytes and JSON.

#![allow(clippy::unwrap_used)]

use missive::{
    Address, Attachment, ContentDisposition, EmailMessage, Error, MailMessage, MemoryTransport,
    MessageKind, MessagePriority, RootContentType, TeraTemplate, parse_message,
};
use missive_mime::Part;
use proptest::prelude::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

fn essence(part: &Part) -> String {
    part.content_type().unwrap().essence()
}

fn children(part: &Part) -> Vec<String> {
    part.parts().iter().map(essence).collect()
}

fn base() -> (MemoryTransport, MailMessage) {
    let outbox = MemoryTransport::new();
    let mut mail = MailMessage::with_transport(outbox.clone());
    mail.from("Sender <sender@example.com>")
        .unwrap()
        .to("recipient@example.com")
        .unwrap();
    (outbox, mail)
}

mod tree {
    use super::*;

    #[test]
    fn test_text_only_message() {
        let (outbox, mut mail) = base();
        mail.body_text("Just text").send().unwrap();

        let root = outbox.last().unwrap().mime.root;
        assert_eq!(essence(&root), "multipart/mixed");
        assert_eq!(root.leaves().len(), 1);
        assert_eq!(children(&root), vec!["text/plain"]);
    }

    #[test]
    fn test_html_with_inline_image() {
        let (outbox, mut mail) = base();
        mail.attach_bytes("logo.png", "image/png", ContentDisposition::Inline, vec![137, 80])
            .body_html_template(TeraTemplate::new(
                r#"<img src="{{ mailContext["logo.png"] }}">"#,
            ));
        mail.send().unwrap();

        let root = outbox.last().unwrap().mime.root;
        assert_eq!(children(&root), vec!["multipart/related"]);
        let related = &root.parts()[0];
        assert_eq!(children(related), vec!["text/html", "image/png"]);

        let image = &related.parts()[1];
        let html = related.parts()[0].body_text().unwrap();
        assert!(html.contains(&format!("cid:{}", image.content_id().unwrap())));
    }

    #[test]
    fn test_full_layout() {
        let (outbox, mut mail) = base();
        mail.body_html_text_alt("<p>Hello</p>", "Hello")
            .attach_bytes("report.pdf", "application/pdf", ContentDisposition::Attachment, vec![1])
            .attach_bytes("logo.png", "image/png", ContentDisposition::Inline, vec![2]);
        mail.send().unwrap();

        let root = outbox.last().unwrap().mime.root;
        assert_eq!(children(&root), vec!["multipart/related", "application/pdf"]);
        let related = &root.parts()[0];
        assert_eq!(children(related), vec!["multipart/alternative", "image/png"]);
        assert_eq!(children(&related.parts()[0]), vec!["text/plain", "text/html"]);
    }

    #[test]
    fn test_root_content_type_is_honored() {
        let (outbox, mut mail) = base();
        mail.content_type(RootContentType::Related).body_text("x");
        mail.send().unwrap();
        assert_eq!(essence(&outbox.last().unwrap().mime.root), "multipart/related");
    }
}

mod headers {
    use super::*;

    fn priority_headers(priority: MessagePriority) -> Vec<Option<String>> {
        let (outbox, mut mail) = base();
        mail.importance(priority).body_text("x");
        mail.send().unwrap();
        let headers = outbox.last().unwrap().mime.headers;
        ["X-Priority", "Priority", "Importance"]
            .iter()
            .map(|name| headers.get(name).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_priority_headers() {
        let some = |v: &str| Some(v.to_string());
        assert_eq!(
            priority_headers(MessagePriority::High),
            vec![some("1"), some("urgent"), some("high")]
        );
        assert_eq!(
            priority_headers(MessagePriority::Low),
            vec![some("5"), some("non-urgent"), some("low")]
        );
        assert_eq!(priority_headers(MessagePriority::Normal), vec![None, None, None]);
    }

    #[test]
    fn test_user_headers_accumulate() {
        let (outbox, mut mail) = base();
        mail.add_header("X-Tag", "a")
            .unwrap()
            .add_header("X-Tag", "b")
            .unwrap()
            .body_text("x");
        mail.send().unwrap();
        assert_eq!(outbox.last().unwrap().mime.headers.get_all("X-Tag"), vec!["a", "b"]);
    }

    #[test]
    fn test_receipts_and_bcc() {
        let (outbox, mut mail) = base();
        mail.bcc("hidden@example.com")
            .unwrap()
            .delivery_receipt("receipts@example.com")
            .unwrap()
            .read_receipt("Reader <reader@example.com>")
            .unwrap()
            .body_text("x");
        mail.send().unwrap();

        let assembled = outbox.last().unwrap();
        let headers = &assembled.mime.headers;
        assert_eq!(headers.get("Return-Receipt-To"), Some("<receipts@example.com>"));
        assert_eq!(headers.get("Disposition-Notification-To"), Some("<reader@example.com>"));
        assert_eq!(headers.get("Bcc"), Some("hidden@example.com"));

        let wire = String::from_utf8(assembled.to_transport_bytes().unwrap()).unwrap();
        assert!(!wire.contains("hidden@example.com"));
        assert!(assembled
            .envelope
            .recipients
            .iter()
            .any(|r| r.email() == "hidden@example.com"));
    }
}

mod round_trip {
    use super::*;

    fn rich_message() -> EmailMessage {
        let mut mail = MailMessage::new();
        mail.from("Jürgen Müller <juergen@example.com>")
            .unwrap()
            .to_all(["\"Doe, Jane\" <jane@example.com>", "bob@example.com"])
            .unwrap()
            .cc("carol@example.com")
            .unwrap()
            .reply_to("replies@example.com")
            .unwrap()
            .subject("Grüße aus Köln")
            .body_html_text_alt("<p>Grüße</p>", "Grüße")
            .importance(MessagePriority::Low)
            .message_id("fixed-id@example.com")
            .add_header("X-Campaign", "spring")
            .unwrap()
            .attach_bytes("report.pdf", "application/pdf", ContentDisposition::Attachment, vec![0, 1, 2, 255])
            .attach_bytes("logo.png", "image/png", ContentDisposition::Inline, vec![9, 8, 7]);
        mail.merge_templates().unwrap().clone()
    }

    #[test]
    fn test_json_round_trip() {
        let message = rich_message();
        let json = message.to_json().unwrap();
        let back = EmailMessage::from_json(&json).unwrap();

        assert_eq!(back, message);
        assert_eq!(back.kind, MessageKind::Standard);
        assert_eq!(back.charset, "UTF-8");
        assert_eq!(back.attachments[1].file_name(), Some("logo.png"));
    }

    #[test]
    fn test_wire_round_trip() {
        let original = rich_message();
        let outbox = MemoryTransport::new();
        MailMessage::with_transport(outbox.clone())
            .set_email_message(original.clone())
            .send()
            .unwrap();

        let bytes = outbox.last().unwrap().mime.to_bytes().unwrap();
        let parsed = parse_message(&bytes).unwrap();

        assert_eq!(parsed.subject, original.subject);
        assert_eq!(parsed.text_body, original.text_body);
        assert_eq!(parsed.html_body, original.html_body);
        assert_eq!(parsed.from, original.from);
        assert_eq!(parsed.to, original.to);
        assert_eq!(parsed.cc, original.cc);
        assert_eq!(parsed.reply_to, original.reply_to);
        assert_eq!(parsed.message_id.as_deref(), Some("fixed-id@example.com"));
        assert_eq!(parsed.importance, MessagePriority::Low);
        assert_eq!(parsed.headers[0].name, "X-Campaign");

        // Tree order: the inline image sits inside the related container,
        // ahead of the root-level attachment.
        let names: Vec<_> = parsed.attachments.iter().map(|a| a.file_name()).collect();
        assert_eq!(names, vec![Some("logo.png"), Some("report.pdf")]);
        assert_eq!(parsed.attachments[0].disposition(), ContentDisposition::Inline);
        assert_eq!(
            parsed.attachments[0].content_id(),
            original.attachments[1].content_id()
        );
        assert_eq!(parsed.attachments[1].mime_type(), "application/pdf");
        assert_eq!(parsed.attachments[1].bytes(), &[0, 1, 2, 255]);
    }
}

mod json_validation {
    use super::*;

    fn rejected(json: &str) -> bool {
        matches!(EmailMessage::from_json(json), Err(Error::Serde(_)))
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        assert!(rejected(r#"{"to":[{"email":"woo foo @bar.com"}]}"#));
        assert!(rejected(r#"{"from":[{"email":"a@b.com\r\nX-Injected: yes"}]}"#));
        assert!(rejected(r#"{"cc":[{"email":"a@b.com","name":"A\r\nBcc: evil@example.com"}]}"#));
        assert!(rejected(r#"{"envelopeFrom":{"email":"not-an-address"}}"#));
    }

    #[test]
    fn test_header_with_line_break_is_rejected() {
        assert!(rejected(
            r#"{"headers":[{"name":"X-Note","value":"ok\r\nBcc: evil@example.com"}]}"#
        ));
        assert!(rejected(r#"{"headers":[{"name":"X:Note","value":"ok"}]}"#));
    }

    #[test]
    fn test_attachment_mime_type_with_line_break_is_rejected() {
        let mut message = EmailMessage::new();
        message.add_attachment(Attachment::new(
            "a.pdf",
            "application/pdf",
            ContentDisposition::Attachment,
            vec![1],
        ));
        let json = message.to_json().unwrap().replace(
            "\"application/pdf\"",
            r#""application/pdf; x=\"a\r\nX-Evil: 1\"""#,
        );
        assert!(rejected(&json));
    }

    #[test]
    fn test_valid_json_still_reaches_the_wire_cleanly() {
        let json = r#"{
            "from": [{"email": "sender@example.com", "name": "Sender"}],
            "to": [{"email": "recipient@example.com"}],
            "subject": "Hello",
            "textBody": "Hi",
            "headers": [{"name": "X-Note", "value": "ok"}]
        }"#;
        let message = EmailMessage::from_json(json).unwrap();
        let outbox = MemoryTransport::new();
        MailMessage::with_transport(outbox.clone())
            .set_email_message(message)
            .send()
            .unwrap();

        let wire = String::from_utf8(outbox.last().unwrap().to_transport_bytes().unwrap()).unwrap();
        let (head, _) = wire.split_once("\r\n\r\n").unwrap();
        assert!(head.lines().any(|l| l == "X-Note: ok"));
        assert!(head.lines().any(|l| l == "To: recipient@example.com"));
    }

    #[test]
    fn test_mime_type_with_line_break_fails_send() {
        let (outbox, mut mail) = base();
        mail.body_text("x").attach_bytes(
            "a.pdf",
            "application/pdf; x=\"a\r\nX-Evil: 1\"",
            ContentDisposition::Attachment,
            vec![1],
        );
        let err = mail.send().unwrap_err();
        assert!(err.to_string().contains("attachment a.pdf"), "{err}");
        assert!(outbox.is_empty());
    }
}

mod url_attachment {
    use super::*;

    /// Serves a single HTTP response on a loopback port and returns its URL.
    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(&response).unwrap();
        });
        format!("http://{addr}/files/logo.png")
    }

    #[test]
    fn test_fetches_body_and_type() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 3\r\nConnection: close\r\n\r\n\x01\x02\x03"
                .to_vec(),
        );
        let attachment = Attachment::from_url(&url, "logo.png", ContentDisposition::Inline).unwrap();
        assert_eq!(attachment.mime_type(), "image/png");
        assert_eq!(attachment.bytes(), &[1, 2, 3]);
        assert_eq!(attachment.file_name(), Some("logo.png"));
    }

    #[test]
    fn test_error_status_fails() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        );
        let err = Attachment::from_url(&url, "logo.png", ContentDisposition::Inline).unwrap_err();
        assert!(matches!(err, Error::Attachment { .. }));
        assert!(err.to_string().contains(&url));
    }
}

fn name_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        "[A-Z][a-z]{1,8}( [A-Z][a-z]{1,8})?".prop_map(Some),
        "[A-Z][a-z]{1,8}, [A-Z][a-z]{1,8}".prop_map(Some),
        "[A-Z][a-zäöü]{1,8}".prop_map(Some),
    ]
}

proptest! {
    #[test]
    fn test_address_canonical_form_round_trips(
        local in "[a-z][a-z0-9]{0,10}(\\.[a-z0-9]{1,5})?",
        domain in "[a-z]{1,10}\\.(com|org|net)",
        name in name_strategy(),
    ) {
        let email = format!("{local}@{domain}");
        let literal = match &name {
            Some(name) => format!("{name} <{email}>"),
            None => email.clone(),
        };
        let literal = if name.as_deref().is_some_and(|n| n.contains(',')) {
            format!("\"{}\" <{email}>", name.as_deref().unwrap_or_default())
        } else {
            literal
        };

        let parsed = Address::parse(&literal).unwrap();
        prop_assert_eq!(parsed.email(), email.as_str());
        prop_assert_eq!(parsed.name(), name.as_deref());

        let canonical = parsed.to_string();
        let reparsed = Address::parse(&canonical).unwrap();
        prop_assert_eq!(&reparsed, &parsed);
        prop_assert_eq!(reparsed.to_string(), canonical);

        let header = parsed.to_header_value("UTF-8").unwrap();
        prop_assert_eq!(Address::parse(&header).unwrap(), parsed.clone());

        let json = serde_json::to_string(&parsed).unwrap();
        prop_assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), parsed);
    }

    #[test]
    fn test_malformed_addresses_fail(
        local in "[a-z]{1,8}",
        domain in "[a-z]{1,8}\\.com",
        junk in "[a-z]{1,8}",
    ) {
        let spaced = format!("{junk} {local} @{domain}");
        let is_invalid = matches!(Address::parse(&spaced), Err(Error::InvalidAddress { .. }));
        prop_assert!(is_invalid);
        let missing_at = format!("{local}{domain}");
        prop_assert!(Address::parse(&missing_at).is_err());
    }
}
