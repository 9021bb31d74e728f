//! Text-layer conversion: PDF text → a plain HTML document, no model involved.
//!
//! Each page becomes a `<section class="page" data-page="N">`; blank lines
//! in the extracted text split paragraphs and single newlines become `<br>`.
//! All text is HTML-escaped, so a PDF containing `<script>` stays inert.

/// Assemble a full HTML document from per-page text, in page order.
pub fn pages_to_html(pages: &[String]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
<title>Converted document</title>\n</head>\n<body>\n",
    );

    for (i, text) in pages.iter().enumerate() {
        html.push_str(&format!("<section class=\"page\" data-page=\"{}\">\n", i + 1));
        for paragraph in paragraphs(text) {
            let lines: Vec<String> = paragraph.iter().map(|l| escape_html(l)).collect();
            html.push_str("<p>");
            html.push_str(&lines.join("<br>\n"));
            html.push_str("</p>\n");
        }
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Split text into paragraphs of non-empty, right-trimmed lines.
fn paragraphs(text: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
