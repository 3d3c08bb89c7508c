//! Per-recipient MIME rendering.
//!
//! A [`Template`] is built once per broadcast: line endings are normalised
//! and bodies are quoted-printable encoded up front. Footers stay unencoded
//! until [`Template::render`] substitutes the recipient's unsubscribe URL.
//!
//! ```text
//! From / To / Subject
//! [List-Unsubscribe / List-Unsubscribe-Post]
//! MIME-Version: 1.0
//! text/plain                        (no HTML body)
//! multipart/alternative             (HTML body)
//! ├── text/plain
//! └── text/html
//! ```

mod encoding;
mod writer;

use std::io::Write;

pub use encoding::{encode_header, encode_mailbox, normalize_crlf, quoted_printable};
pub use writer::FailFastWriter;

use crate::{Message, error::RenderError, message::UNSUBSCRIBE_URL, recipient::Recipient};

/// A message prepared for rendering to many recipients.
#[derive(Debug, Clone)]
pub struct Template {
    from: String,
    subject: String,
    text_body: String,
    text_footer: String,
    html: Option<HtmlPart>,
}

#[derive(Debug, Clone)]
struct HtmlPart {
    body: String,
    footer: String,
}

impl Template {
    #[must_use]
    pub fn new(message: &Message) -> Self {
        let html = message.html_body.as_deref().map(|body| HtmlPart {
            body: quoted_printable(&normalize_crlf(body)),
            footer: normalize_crlf(message.html_footer.as_deref().unwrap_or_default()),
        });

        Self {
            from: encode_mailbox(&message.from),
            subject: encode_header(&message.subject),
            text_body: quoted_printable(&normalize_crlf(&message.text_body)),
            text_footer: normalize_crlf(&message.text_footer),
            html,
        }
    }

    /// Render the complete message for `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the output could not be written.
    pub fn render(&self, recipient: &Recipient) -> Result<Vec<u8>, RenderError> {
        self.render_to(recipient, Vec::with_capacity(self.size_hint()))
    }

    /// Render into `out`, returning it once complete.
    ///
    /// # Errors
    ///
    /// Returns the first write error; nothing is written after it.
    pub fn render_to<W: Write>(&self, recipient: &Recipient, out: W) -> Result<W, RenderError> {
        let mut w = FailFastWriter::new(out);

        w.put_fmt(format_args!("From: {}\r\n", self.from));
        w.put_fmt(format_args!("To: {}\r\n", recipient.email));
        w.put_fmt(format_args!("Subject: {}\r\n", self.subject));
        if let Some(unsubscribe) = &recipient.unsubscribe {
            w.put_fmt(format_args!("List-Unsubscribe: {}\r\n", unsubscribe.header));
            w.put("List-Unsubscribe-Post: List-Unsubscribe=One-Click\r\n");
        }
        w.put("MIME-Version: 1.0\r\n");

        let url = recipient.unsubscribe_url().unwrap_or_default();
        match &self.html {
            None => {
                write_part_headers(&mut w, "text/plain");
                w.put("\r\n");
                w.put(&with_footer(&self.text_body, &self.text_footer, url));
            }
            Some(html) => {
                let boundary = format!("----=_Part_{}", ulid::Ulid::new());
                w.put_fmt(format_args!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
                ));

                w.put_fmt(format_args!("--{boundary}\r\n"));
                write_part_headers(&mut w, "text/plain");
                w.put("\r\n");
                w.put(&with_footer(&self.text_body, &self.text_footer, url));

                w.put_fmt(format_args!("\r\n--{boundary}\r\n"));
                write_part_headers(&mut w, "text/html");
                w.put("\r\n");
                w.put(&with_footer(&html.body, &html.footer, url));

                w.put_fmt(format_args!("\r\n--{boundary}--\r\n"));
            }
        }

        w.into_inner().map_err(RenderError::from)
    }

    fn size_hint(&self) -> usize {
        let html = self
            .html
            .as_ref()
            .map_or(0, |html| html.body.len() + html.footer.len() + 256);
        self.text_body.len() + self.text_footer.len() + html + 512
    }
}

fn write_part_headers<W: Write>(w: &mut FailFastWriter<W>, content_type: &str) {
    w.put_fmt(format_args!(
        "Content-Type: {content_type}; charset=utf-8\r\n\
         Content-Transfer-Encoding: quoted-printable\r\n"
    ));
}

/// The encoded body followed by the footer with `url` substituted once.
fn with_footer(body: &str, footer: &str, url: &str) -> String {
    let footer = quoted_printable(&footer.replacen(UNSUBSCRIBE_URL, url, 1));
    let mut out = String::with_capacity(body.len() + footer.len() + 3);
    encoding::join_encoded(body, &footer, &mut out);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io;

    use mailparse::{MailHeaderMap, parse_mail};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::recipient::UnsubscribeLinks;

    const UID: Uuid = Uuid::from_u128(42);

    fn text_message() -> Message {
        Message {
            from: "F".to_string(),
            subject: "S".to_string(),
            text_body: "Hi\n".to_string(),
            ..Message::default()
        }
    }

    fn list_message() -> Message {
        Message {
            from: "Acme News <news@acme.io>".to_string(),
            subject: "Spring issue".to_string(),
            text_body: "Hello reader,\nthings happened.\n".to_string(),
            text_footer: format!("Unsubscribe: {UNSUBSCRIBE_URL}\n"),
            html_body: Some("<p>Hello reader,</p>\n<p>things happened.</p>\n".to_string()),
            html_footer: Some(format!("<a href=\"{UNSUBSCRIBE_URL}\">Unsubscribe</a>\n")),
        }
    }

    fn subscriber() -> Recipient {
        let links = UnsubscribeLinks::new("unsubscribe@acme.io", "https://api.acme.io").unwrap();
        Recipient {
            email: "reader@acme.io".to_string(),
            uid: Some(UID),
            unsubscribe: Some(crate::recipient::Unsubscribe {
                url: links.url("reader@acme.io", UID),
                header: links.header("reader@acme.io", UID),
            }),
        }
    }

    #[test]
    fn test_plain_message_without_unsubscribe() {
        let template = Template::new(&text_message());
        let raw = template.render(&Recipient::new("a@acme.io")).unwrap();

        assert_eq!(
            String::from_utf8(raw.clone()).unwrap(),
            "From: F\r\n\
             To: a@acme.io\r\n\
             Subject: S\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: quoted-printable\r\n\
             \r\n\
             Hi\r\n"
        );

        let mail = parse_mail(&raw).unwrap();
        assert!(mail.subparts.is_empty());
        assert!(mail.headers.get_first_value("List-Unsubscribe").is_none());
        assert_eq!(mail.ctype.mimetype, "text/plain");
        assert_eq!(mail.get_body().unwrap(), "Hi\r\n");
    }

    #[test]
    fn test_text_message_with_unsubscribe() {
        let message = Message {
            html_body: None,
            html_footer: None,
            ..list_message()
        };
        let recipient = subscriber();
        let raw = Template::new(&message).render(&recipient).unwrap();
        let mail = parse_mail(&raw).unwrap();

        assert!(mail.subparts.is_empty());
        assert_eq!(
            mail.headers.get_first_value("List-Unsubscribe").unwrap(),
            recipient.unsubscribe.as_ref().unwrap().header
        );
        assert_eq!(
            mail.headers.get_first_value("List-Unsubscribe-Post").unwrap(),
            "List-Unsubscribe=One-Click"
        );
        assert_eq!(
            mail.get_body().unwrap(),
            format!(
                "Hello reader,\r\nthings happened.\r\nUnsubscribe: {}\r\n",
                recipient.unsubscribe_url().unwrap()
            )
        );
    }

    #[test]
    fn test_html_message_has_two_parts() {
        let recipient = subscriber();
        let raw = Template::new(&list_message()).render(&recipient).unwrap();
        let mail = parse_mail(&raw).unwrap();
        let url = recipient.unsubscribe_url().unwrap();

        assert_eq!(mail.ctype.mimetype, "multipart/alternative");
        assert_eq!(mail.subparts.len(), 2);

        let text = &mail.subparts[0];
        assert_eq!(text.ctype.mimetype, "text/plain");
        assert_eq!(text.ctype.charset, "utf-8");
        assert_eq!(
            text.headers
                .get_first_value("Content-Transfer-Encoding")
                .unwrap(),
            "quoted-printable"
        );
        assert!(text.get_body().unwrap().contains(&format!("Unsubscribe: {url}")));

        let html = &mail.subparts[1];
        assert_eq!(html.ctype.mimetype, "text/html");
        assert_eq!(
            html.get_body().unwrap().trim_end(),
            format!(
                "<p>Hello reader,</p>\r\n<p>things happened.</p>\r\n<a href=\"{url}\">Unsubscribe</a>"
            )
        );
    }

    #[test]
    fn test_placeholder_replaced_once() {
        let message = Message {
            text_footer: format!("{UNSUBSCRIBE_URL} {UNSUBSCRIBE_URL}"),
            ..text_message()
        };
        let recipient = subscriber();
        let raw = Template::new(&message).render(&recipient).unwrap();
        let body = parse_mail(&raw).unwrap().get_body().unwrap();

        assert_eq!(body.matches(UNSUBSCRIBE_URL).count(), 1);
        assert_eq!(body.matches(recipient.unsubscribe_url().unwrap()).count(), 1);
    }

    #[test]
    fn test_non_ascii_content() {
        let message = Message {
            subject: "Nouvelles du café".to_string(),
            text_body: "Déjà vu = encore\n".to_string(),
            ..text_message()
        };
        let raw = Template::new(&message)
            .render(&Recipient::new("a@acme.io"))
            .unwrap();

        assert!(raw.is_ascii());
        let mail = parse_mail(&raw).unwrap();
        assert_eq!(
            mail.headers.get_first_value("Subject").unwrap(),
            "Nouvelles du café"
        );
        assert_eq!(mail.get_body().unwrap(), "Déjà vu = encore\r\n");
    }

    #[test]
    fn test_non_ascii_sender_name_is_encoded() {
        let message = Message {
            from: "Jöhn Døe <john@acme.io>".to_string(),
            ..text_message()
        };
        let raw = Template::new(&message)
            .render(&Recipient::new("a@acme.io"))
            .unwrap();

        assert!(raw.is_ascii());
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("From: =?utf-8?q?J=C3=B6hn_D=C3=B8e?= <john@acme.io>\r\n"));
    }

    #[test]
    fn test_line_breaks_cannot_add_headers() {
        let message = Message {
            subject: "Hello\r\nBcc: someone@elsewhere.test".to_string(),
            ..text_message()
        };
        let raw = Template::new(&message)
            .render(&Recipient::new("a@acme.io"))
            .unwrap();

        let mail = parse_mail(&raw).unwrap();
        assert!(mail.headers.get_first_value("Bcc").is_none());
        assert_eq!(mail.headers.get_all_values("Subject").len(), 1);
        assert_eq!(mail.get_body().unwrap(), "Hi\r\n");
    }

    #[test]
    fn test_long_lines_are_wrapped() {
        let message = Message {
            text_body: "word ".repeat(60),
            ..text_message()
        };
        let raw = Template::new(&message)
            .render(&Recipient::new("a@acme.io"))
            .unwrap();

        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.split("\r\n").all(|line| line.len() <= 76));
        assert_eq!(
            parse_mail(&raw).unwrap().get_body().unwrap(),
            "word ".repeat(60)
        );
    }

    #[test]
    fn test_write_failure_is_reported() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("broken pipe"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let result = Template::new(&text_message()).render_to(&Recipient::new("a@acme.io"), Broken);
        assert!(matches!(result, Err(RenderError::Io(_))));
    }
}
