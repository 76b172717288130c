//! Minimal HTML rendering.
//!
//! Views are deliberately plain: a shared shell with the flash banner and
//! a per-page body the handlers assemble. Anything user-supplied goes
//! through `escape` before interpolation.

use axum::response::Html;

use crate::flash::Flash;

/// Escape text for safe interpolation into HTML.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

#[derive(Clone, Default)]
pub struct Renderer;

impl Renderer {
    /// Wrap a page body in the site shell, with the flash banner if one
    /// is pending.
    pub fn page(&self, title: &str, flash: Option<&Flash>, body: &str) -> Html<String> {
        let banner = match flash {
            Some(flash) => format!(
                r#"<div class="flash flash-{}">{}</div>"#,
                flash.kind.as_str(),
                escape(&flash.message)
            ),
            None => String::new(),
        };
        Html(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - The Virtual Armory</title>
</head>
<body>
<nav><a href="/">The Virtual Armory</a> <a href="/owner">My Armory</a> <a href="/pricing">Pricing</a></nav>
{banner}
<main>
{body}
</main>
</body>
</html>"#,
            title = escape(title),
            banner = banner,
            body = body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::FlashKind;

    #[test]
    fn escapes_untrusted_text() {
        assert_eq!(
            escape(r#"<script>"x" & 'y'</script>"#),
            "&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn flash_banner_is_included() {
        let flash = Flash {
            message: "Saved!".into(),
            kind: FlashKind::Success,
        };
        let Html(page) = Renderer.page("Guns", Some(&flash), "<p>list</p>");
        assert!(page.contains("flash-success"));
        assert!(page.contains("Saved!"));
    }
}
