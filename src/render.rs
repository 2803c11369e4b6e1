//! HTML pages for the upload form and the comparison result.

use std::fmt::Write;

use crate::models::{AggregateResult, Outcome};

const STYLE: &str = "body{font-family:sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem}\
img{max-width:20rem;max-height:20rem;margin:.5rem}\
.warning{color:#a15c00;font-weight:bold}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.25rem .5rem}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = escape(title),
    )
}

pub fn index_page() -> String {
    page(
        "Face comparison",
        "<h1>Face comparison</h1>\n\
         <form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <p><label>First image <input type=\"file\" name=\"image1\" accept=\"image/*\" required></label></p>\n\
         <p><label>Second image <input type=\"file\" name=\"image2\" accept=\"image/*\" required></label></p>\n\
         <p><button type=\"submit\">Compare</button></p>\n\
         </form>\n",
    )
}

pub fn verdict_text(majority: Option<bool>) -> &'static str {
    match majority {
        Some(true) => "Same person",
        Some(false) => "Different people",
        None => "Could not determine",
    }
}

pub fn result_page(result: &AggregateResult) -> String {
    let mut body = String::new();
    body.push_str("<h1>Result</h1>\n");
    let _ = writeln!(
        body,
        "<p class=\"verdict\">Majority verdict: <strong>{}</strong></p>",
        verdict_text(result.majority)
    );
    if result.low_resolution {
        body.push_str(
            "<p class=\"warning\">Warning: at least one image is low resolution; \
             the verdict may be unreliable.</p>\n",
        );
    }

    body.push_str("<div class=\"images\">\n");
    for name in [&result.image1, &result.image2] {
        let _ = writeln!(
            body,
            "<figure><img src=\"/uploads/{src}\" alt=\"{alt}\"><figcaption>{alt}</figcaption></figure>",
            src = escape(&encode_path_segment(name)),
            alt = escape(name),
        );
    }
    body.push_str("</div>\n");

    body.push_str("<table>\n<tr><th>Model</th><th>Verdict</th><th>Distance</th></tr>\n");
    for verdict in &result.verdicts {
        let (label, distance) = match &verdict.outcome {
            Outcome::Determined {
                verified, distance, ..
            } => (
                if *verified { "same" } else { "different" },
                format!("{distance:.4}"),
            ),
            Outcome::Indeterminate { .. } => ("unknown", "-".to_string()),
        };
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{label}</td><td>{distance}</td></tr>",
            escape(verdict.model.as_str())
        );
    }
    body.push_str("</table>\n<p><a href=\"/\">Compare another pair</a></p>\n");

    page("Face comparison result", &body)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelId, ModelVerdict, Verification};

    fn result(majority: Option<bool>, low_resolution: bool) -> AggregateResult {
        AggregateResult {
            majority,
            low_resolution,
            image1: "alice <1>.jpg".to_string(),
            image2: "bob.png".to_string(),
            verdicts: vec![
                ModelVerdict::determined(
                    ModelId::ArcFace,
                    Verification {
                        verified: true,
                        distance: 0.25,
                        threshold: Some(0.68),
                    },
                ),
                ModelVerdict::indeterminate(ModelId::OpenFace, "model missing"),
            ],
        }
    }

    #[test]
    fn index_has_both_file_inputs() {
        let html = index_page();
        assert!(html.contains("name=\"image1\""));
        assert!(html.contains("name=\"image2\""));
        assert!(html.contains("multipart/form-data"));
    }

    #[test]
    fn result_shows_verdict_warning_and_names() {
        let html = result_page(&result(Some(true), true));
        assert!(html.contains("Same person"));
        assert!(html.contains("class=\"warning\""));
        assert!(html.contains("alice &lt;1&gt;.jpg"));
        assert!(html.contains("/uploads/alice%20%3C1%3E.jpg"));
        assert!(html.contains("<td>ArcFace</td><td>same</td><td>0.2500</td>"));
        assert!(html.contains("<td>OpenFace</td><td>unknown</td><td>-</td>"));
    }

    #[test]
    fn undetermined_without_warning() {
        let html = result_page(&result(None, false));
        assert!(html.contains("Could not determine"));
        assert!(!html.contains("class=\"warning\""));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }
}
