//! Composes a templated message with an inline image and prints the wire form.
//!
//! Run with `RUST_LOG=missive=debug` to see assembly logs.

use missive::{ContentDisposition, MailMessage, MemoryTransport, TeraTemplate};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> missive::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "missive=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let outbox = MemoryTransport::new();
    let mut mail = MailMessage::with_transport(outbox.clone());
    mail.from("Newsletter <news@example.com>")?
        .to("Reader <reader@example.com>")?
        .put("name", "Reader")?
        .subject_template(TeraTemplate::new("Hello {{ name }}"))
        .body_html_text_alt_template(
            TeraTemplate::new(r#"<p>Hi {{ name }}</p><img src="{{ insert(name="dot.png") }}">"#),
            TeraTemplate::new("Hi {{ name }}"),
        )
        .attach_bytes(
            "dot.png",
            "image/png",
            ContentDisposition::Inline,
            vec![0x89, b'P', b'N', b'G'],
        );

    let sent = mail.send()?;
    println!("Sent {}", sent.message_id.unwrap_or_default());

    if let Some(assembled) = outbox.last() {
        let bytes = assembled.to_transport_bytes()?;
        println!("{}", String::from_utf8_lossy(&bytes));
    }
    Ok(())
}
