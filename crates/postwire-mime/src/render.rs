//! RFC 5322 / MIME serialization of an [`Email`] for the SMTP DATA phase.

use crate::address::join_header_values;
use crate::email::Email;
use crate::encoding::{encode_base64_wrapped, encode_quoted_printable, encode_rfc2047};
use crate::header::Headers;

/// Appended to every rendered message: the CRLF before the bare-dot line.
/// The command encoder supplies the CRLF that closes the dot line.
pub const DATA_TERMINATOR: &str = "\r\n.";

const TEXT_PLAIN: &str = "text/plain; charset=\"UTF-8\"";
const TEXT_HTML: &str = "text/html; charset=\"UTF-8\"";
const QUOTED_PRINTABLE: &str = "quoted-printable";

/// Generates a fresh multipart boundary: 32 random lowercase hex digits.
#[must_use]
pub fn generate_boundary() -> String {
    format!("{:032x}", rand::random::<u128>())
}

impl Email {
    /// Renders the message, terminated with [`DATA_TERMINATOR`].
    ///
    /// A new boundary is generated on every call when the message has
    /// attachments.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        self.render_with_boundary(&generate_boundary())
    }

    /// Renders the message with a caller-chosen multipart boundary.
    ///
    /// The boundary is ignored for messages without attachments.
    #[must_use]
    pub fn render_with_boundary(&self, boundary: &str) -> Vec<u8> {
        let mut headers = self.headers();
        let mut out = String::new();

        if self.attachments().is_empty() {
            headers.add("Content-Type", self.body_content_type());
            headers.add("Content-Transfer-Encoding", QUOTED_PRINTABLE);
            out.push_str(&headers.to_string());
            out.push_str("\r\n");
            out.push_str(&self.encoded_body());
        } else {
            headers.add(
                "Content-Type",
                format!("multipart/mixed; boundary=\"{boundary}\""),
            );
            out.push_str(&headers.to_string());
            out.push_str("\r\n");
            self.write_parts(&mut out, boundary);
        }

        out.push_str(DATA_TERMINATOR);
        out.into_bytes()
    }

    /// Builds the top-level headers, everything except `Content-Type`.
    #[must_use]
    pub fn headers(&self) -> Headers {
        let mut headers = Headers::new();

        headers.add("From", self.from().to_header_value());
        if !self.to().is_empty() {
            headers.add("To", join_header_values(self.to()));
        }
        if !self.cc().is_empty() {
            headers.add("Cc", join_header_values(self.cc()));
        }
        if let Some(reply_to) = self.reply_to() {
            headers.add("Reply-To", reply_to.to_header_value());
        }
        headers.add("Subject", Headers::encode_value(self.subject()));
        headers.add("Date", self.date());
        headers.add("Message-ID", self.message_id());
        if let Some(reference) = self.reference() {
            headers.add("In-Reply-To", reference);
            headers.add("References", reference);
        }
        headers.add("MIME-Version", "1.0");

        headers
    }

    const fn body_content_type(&self) -> &'static str {
        if self.is_html() { TEXT_HTML } else { TEXT_PLAIN }
    }

    fn encoded_body(&self) -> String {
        dot_stuff(&encode_quoted_printable(self.body()))
    }

    fn write_parts(&self, out: &mut String, boundary: &str) {
        let mut body_headers = Headers::new();
        body_headers.add("Content-Type", self.body_content_type());
        body_headers.add("Content-Transfer-Encoding", QUOTED_PRINTABLE);

        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str(&body_headers.to_string());
        out.push_str("\r\n");
        out.push_str(&self.encoded_body());
        out.push_str("\r\n");

        for attachment in self.attachments() {
            let filename: String = attachment.name().chars().filter(|c| *c != '"').collect();
            let filename = encode_rfc2047(&filename, "utf-8");

            let mut part_headers = Headers::new();
            part_headers.add("Content-Type", attachment.content_type());
            part_headers.add("Content-Transfer-Encoding", "base64");
            part_headers.add(
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            );

            out.push_str(&format!("--{boundary}\r\n"));
            out.push_str(&part_headers.to_string());
            out.push_str("\r\n");
            out.push_str(&encode_base64_wrapped(attachment.data()));
            out.push_str("\r\n");
        }

        out.push_str(&format!("--{boundary}--"));
    }
}

/// Dot-stuffs CRLF-separated lines that start with `.` so body text can
/// never end the DATA phase early.
fn dot_stuff(body: &str) -> String {
    body.split("\r\n")
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::address::EmailAddress;
    use crate::attachment::Attachment;
    use crate::encoding::{decode_base64, decode_quoted_printable};
    use chrono::{FixedOffset, TimeZone};
    use proptest::prelude::*;

    const BOUNDARY: &str = "0123456789abcdef0123456789abcdef";

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::new(s).unwrap()
    }

    fn fixed(builder: crate::EmailBuilder) -> Email {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 9, 30, 0)
            .unwrap();
        builder
            .date(date)
            .message_id("1709285400000.1@example.com")
            .build()
            .unwrap()
    }

    fn rendered(email: &Email) -> String {
        String::from_utf8(email.render_with_boundary(BOUNDARY)).unwrap()
    }

    /// Pulls the base64 payload of the attachment part out of a rendered message.
    fn attachment_payload(text: &str) -> String {
        let part = text
            .split(&format!("--{BOUNDARY}\r\n"))
            .last()
            .unwrap();
        let (_, body) = part.split_once("\r\n\r\n").unwrap();
        body.split(&format!("\r\n--{BOUNDARY}--"))
            .next()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_plain_message_layout() {
        let email = fixed(
            Email::builder(EmailAddress::with_name("john@example.com", "John Doe").unwrap())
                .to(addr("ben@example.com"))
                .subject("Greetings")
                .text_body("Hello Ben"),
        );

        let expected = concat!(
            "From: John Doe <john@example.com>\r\n",
            "To: ben@example.com\r\n",
            "Subject: Greetings\r\n",
            "Date: Fri, 01 Mar 2024 09:30:00 +0000\r\n",
            "Message-ID: <1709285400000.1@example.com>\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: text/plain; charset=\"UTF-8\"\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "Hello Ben",
            "\r\n."
        );
        assert_eq!(rendered(&email), expected);
    }

    #[test]
    fn test_html_content_type() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("ben@example.com"))
                .html_body("<b>Hi</b>"),
        );
        let text = rendered(&email);
        assert!(text.contains(concat!(
            "Content-Type: text/html; charset=\"UTF-8\"\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "<b>Hi</b>"
        )));
    }

    #[test]
    fn test_header_order_with_optional_fields() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("to@example.com"))
                .cc(addr("cc@example.com"))
                .bcc(addr("hidden@example.com"))
                .reply_to(addr("replies@example.com"))
                .reference("<parent@example.com>")
                .subject("Re: thread"),
        );
        let text = rendered(&email);
        let headers = Headers::parse(&text).unwrap();

        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "From",
                "To",
                "Cc",
                "Reply-To",
                "Subject",
                "Date",
                "Message-ID",
                "In-Reply-To",
                "References",
                "MIME-Version",
                "Content-Type",
                "Content-Transfer-Encoding"
            ]
        );
        assert_eq!(headers.get("In-Reply-To"), Some("<parent@example.com>"));
        assert!(!text.contains("hidden@example.com"));
    }

    #[test]
    fn test_headers_round_trip() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .to(EmailAddress::with_name("b@example.com", "Bee").unwrap())
                .subject("Quarterly numbers"),
        );
        let headers = Headers::parse(&rendered(&email)).unwrap();

        assert_eq!(headers.get("From"), Some("john@example.com"));
        assert_eq!(headers.get("To"), Some("a@example.com, Bee <b@example.com>"));
        assert_eq!(headers.get("Subject"), Some("Quarterly numbers"));
    }

    #[test]
    fn test_non_ascii_subject_round_trip() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .subject("Überraschung"),
        );
        let headers = Headers::parse(&rendered(&email)).unwrap();
        let subject = headers.get("Subject").unwrap();

        assert!(subject.starts_with("=?utf-8?B?"));
        assert_eq!(Headers::decode_value(subject).unwrap(), "Überraschung");
    }

    #[test]
    fn test_render_is_deterministic_with_fixed_inputs() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .attach(Attachment::new("a.txt", "text/plain", b"abc".to_vec())),
        );
        assert_eq!(
            email.render_with_boundary(BOUNDARY),
            email.render_with_boundary(BOUNDARY)
        );
    }

    #[test]
    fn test_render_generates_fresh_boundaries() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .attach(Attachment::new("a.txt", "text/plain", b"abc".to_vec())),
        );
        assert_ne!(email.render(), email.render());
    }

    #[test]
    fn test_generate_boundary_format() {
        let boundary = generate_boundary();
        assert_eq!(boundary.len(), 32);
        assert!(
            boundary
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_multipart_layout() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .text_body("See attached")
                .attach(Attachment::new("report.pdf", "application/pdf", b"%PDF".to_vec())),
        );
        let text = rendered(&email);

        assert!(text.contains(&format!(
            "Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\r\n\r\n--{BOUNDARY}\r\n"
        )));
        assert!(text.contains(concat!(
            "Content-Type: text/plain; charset=\"UTF-8\"\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "See attached\r\n"
        )));
        assert!(text.contains(concat!(
            "Content-Type: application/pdf\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
            "\r\n",
            "JVBERg==\r\n"
        )));
        assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n.")));
    }

    #[test]
    fn test_multipart_html_body_part() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .html_body("<i>x</i>")
                .attach(Attachment::new("x.bin", "application/octet-stream", vec![0, 1])),
        );
        assert!(rendered(&email).contains(concat!(
            "Content-Type: text/html; charset=\"UTF-8\"\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "<i>x</i>"
        )));
    }

    #[test]
    fn test_attachment_filename_quotes_stripped() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .attach(Attachment::new("we\"ird.txt", "text/plain", b"x".to_vec())),
        );
        assert!(rendered(&email).contains("filename=\"weird.txt\""));
    }

    #[test]
    fn test_body_line_endings_and_dot_stuffing() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .text_body("line one\n.hidden\r\n..two dots\nend"),
        );
        let text = rendered(&email);
        assert!(text.ends_with("\r\n\r\nline one\r\n..hidden\r\n...two dots\r\nend\r\n."));
    }

    #[test]
    fn test_always_ends_with_terminator() {
        let email = fixed(Email::builder(addr("john@example.com")).to(addr("a@example.com")));
        assert!(rendered(&email).ends_with(DATA_TERMINATOR));
    }

    /// Asserts the SMTP line limit (998 octets before CRLF) and 7-bit output.
    fn assert_wire_safe(text: &str) {
        assert!(text.is_ascii(), "rendered message is not 7-bit");
        for line in text.split("\r\n") {
            assert!(line.len() <= 998, "line of {} bytes", line.len());
        }
    }

    #[test]
    fn test_long_non_ascii_message_is_wire_safe() {
        let subject = "é".repeat(600);
        let body = format!("{}ü", "x".repeat(2000));
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(EmailAddress::with_name("a@example.com", "Ω".repeat(100)).unwrap())
                .cc(addr("b@example.com"))
                .subject(subject.clone())
                .text_body(body.clone()),
        );
        let text = rendered(&email);
        assert_wire_safe(&text);

        let headers = Headers::parse(&text).unwrap();
        assert_eq!(headers.get("Content-Transfer-Encoding"), Some("quoted-printable"));
        assert_eq!(Headers::decode_value(headers.get("Subject").unwrap()).unwrap(), subject);

        let (_, encoded_body) = text.split_once("\r\n\r\n").unwrap();
        let encoded_body = encoded_body.strip_suffix(DATA_TERMINATOR).unwrap();
        assert_eq!(decode_quoted_printable(encoded_body).unwrap(), body);
    }

    #[test]
    fn test_multipart_with_long_lines_is_wire_safe() {
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .subject("Résumé attached")
                .html_body(format!("<p>{}</p>", "ß".repeat(1500)))
                .attach(Attachment::new("résumé.pdf", "application/pdf", vec![0xFF; 5000])),
        );
        let text = rendered(&email);
        assert_wire_safe(&text);
        assert!(text.contains("filename=\"=?utf-8?B?"));
    }

    #[test]
    fn test_dot_stuffing_applies_after_soft_breaks() {
        // 75 characters fill the first encoded line, so the soft break lands
        // right before the dot.
        let body = format!("{}.tail", "x".repeat(75));
        let email = fixed(
            Email::builder(addr("john@example.com"))
                .to(addr("a@example.com"))
                .text_body(body),
        );
        let text = rendered(&email);
        assert!(text.contains(&format!("{}=\r\n..tail", "x".repeat(75))));
    }

    proptest! {
        #[test]
        fn attachment_bytes_survive_rendering(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let email = fixed(
                Email::builder(addr("john@example.com"))
                    .to(addr("a@example.com"))
                    .attach(Attachment::new("blob.bin", "application/octet-stream", data.clone())),
            );
            let payload = attachment_payload(&rendered(&email));
            prop_assert_eq!(decode_base64(&payload).unwrap(), data);
        }
    }
}
