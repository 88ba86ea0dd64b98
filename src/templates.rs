/*
Embedded message templates for lifecycle emails and in-app notifications.

Templates live in a compile-time embedded JSON table keyed by flat names
(`email.expiring.subject`, `notification.expired`, ...). Placeholders use the
single-brace form `{name}`.

Usage:
    let subject = templates::render("email.expired.subject", &[("title", "Flat in Lekki")]);
*/

use std::collections::HashMap;
use std::sync::OnceLock;

static TEMPLATES: OnceLock<HashMap<String, String>> = OnceLock::new();

const EN_JSON: &str = r#"
{
  "email.expiring.subject": "Your listing \"{title}\" expires in {days} day(s)",
  "email.expiring.body": "<p>Hi {name},</p><p>Your listing <strong>{title}</strong> will expire in <strong>{days} day(s)</strong>, on {expiry_date} (UTC).</p><p>Renew it now to keep it visible to buyers and renters.</p><p><a href=\"{link}\">Renew listing</a></p>",
  "email.expired.subject": "Your listing \"{title}\" has expired",
  "email.expired.body": "<p>Hi {name},</p><p>Your listing <strong>{title}</strong> expired on {expiry_date} (UTC) and is no longer visible.</p><p>Pick a plan to publish it again.</p><p><a href=\"{link}\">Reactivate listing</a></p>",
  "notification.expired": "Your listing \"{title}\" has expired and is no longer visible. Renew it to publish it again."
}
"#;

fn build_templates() -> HashMap<String, String> {
    serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse embedded templates: {}", e);
    })
}

fn templates() -> &'static HashMap<String, String> {
    TEMPLATES.get_or_init(build_templates)
}

/// Escape text interpolated into an HTML body.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Look up `key` and substitute `{name}` placeholders. Unknown keys render as the key itself.
pub fn render(key: &str, params: &[(&str, &str)]) -> String {
    let mut s = templates()
        .get(key)
        .cloned()
        .unwrap_or_else(|| key.to_string());
    for (k, v) in params {
        s = s.replace(&format!("{{{}}}", k), v);
    }
    s
}

/// Like [`render`], but HTML-escapes every parameter value first.
pub fn render_html(key: &str, params: &[(&str, &str)]) -> String {
    let escaped: Vec<(&str, String)> = params.iter().map(|(k, v)| (*k, escape_html(v))).collect();
    let borrowed: Vec<(&str, &str)> = escaped.iter().map(|(k, v)| (*k, v.as_str())).collect();
    render(key, &borrowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders() {
        let s = render(
            "email.expiring.subject",
            &[("title", "Flat in Lekki"), ("days", "3")],
        );
        assert_eq!(s, "Your listing \"Flat in Lekki\" expires in 3 day(s)");
    }

    #[test]
    fn html_bodies_escape_user_text() {
        let s = render_html(
            "email.expired.body",
            &[
                ("name", "Ada"),
                ("title", "<script>alert(1)</script>"),
                ("expiry_date", "2025-03-10"),
                ("link", "https://example.com/renew?a=1&b=2"),
            ],
        );
        assert!(s.contains("&lt;script&gt;"));
        assert!(!s.contains("<script>"));
        assert!(s.contains("a=1&amp;b=2"));
    }

    #[test]
    fn missing_key_returns_key() {
        assert_eq!(render("email.unknown", &[]), "email.unknown");
    }

    #[test]
    fn every_email_type_has_subject_and_body() {
        for kind in ["expiring", "expired"] {
            for part in ["subject", "body"] {
                let key = format!("email.{}.{}", kind, part);
                assert_ne!(render(&key, &[]), key);
            }
        }
    }
}
