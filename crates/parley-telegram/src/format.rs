//! Markdown to Telegram HTML conversion.
//!
//! Applied only to final output (the batch reply and the last edit of a
//! streamed reply). In-progress edits stay plain text: partial markup
//! in an unfinished reply renders incorrectly, so formatting waits
//! until the text is complete.

use std::sync::LazyLock;

use regex::Regex;

/// Escape text for safe inclusion in Telegram HTML.
///
/// Quotes are escaped too: the result may end up inside an
/// `href="..."` attribute.
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Convert model markdown to the HTML subset Telegram accepts:
/// `<b>`, `<i>`, `<code>`, `<pre>`, `<a href="...">`.
pub fn md_to_telegram_html(md: &str) -> String {
    static CODE_BLOCK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```(\w*)\n?([\s\S]*?)```").expect("invalid regex"));
    static INLINE_CODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("invalid regex"));
    static BOLD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("invalid regex"));
    static ITALIC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("invalid regex"));
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("invalid regex"));
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("invalid regex"));

    // Pull code regions out first so later transforms can't touch them.
    // Placeholders use \x00, which never survives html_escape mangling.
    let mut protected: Vec<String> = Vec::new();
    let text = CODE_BLOCK.replace_all(md, |caps: &regex::Captures<'_>| {
        let code = html_escape(caps[2].trim_end_matches('\n'));
        let placeholder = format!("\x00CODE{}\x00", protected.len());
        protected.push(format!("<pre>{code}</pre>"));
        placeholder
    });
    let text = INLINE_CODE.replace_all(&text, |caps: &regex::Captures<'_>| {
        let code = html_escape(&caps[1]);
        let placeholder = format!("\x00CODE{}\x00", protected.len());
        protected.push(format!("<code>{code}</code>"));
        placeholder
    });

    let text = html_escape(&text);

    // Bold first, then italic on whatever single asterisks remain.
    let text = BOLD.replace_all(&text, "<b>$1</b>");
    let text = ITALIC.replace_all(&text, "<i>$1</i>");
    let text = LINK.replace_all(&text, |caps: &regex::Captures<'_>| {
        let label = &caps[1];
        let url = &caps[2];
        // Only link safe schemes; anything else renders as plain text.
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("tg://") {
            format!("<a href=\"{url}\">{label}</a>")
        } else {
            format!("{label} ({url})")
        }
    });
    let text = HEADING.replace_all(&text, "<b>$1</b>");

    let mut text = text.into_owned();
    for (i, block) in protected.iter().enumerate() {
        text = text.replace(&format!("\x00CODE{i}\x00"), block);
    }
    text
}

/// Append closing tags for any tags left open in `html`.
///
/// A reply can end mid-markup (model stopped early, stream cut off);
/// Telegram rejects the whole message if a tag is unbalanced.
pub fn close_open_tags(html: &str) -> String {
    use std::fmt::Write as _;

    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<(/?)(\w+)[^>]*>").expect("invalid regex"));

    let mut open_tags: Vec<String> = Vec::new();
    for cap in TAG_RE.captures_iter(html) {
        let is_close = &cap[1] == "/";
        let name = cap[2].to_lowercase();
        if is_close {
            if let Some(pos) = open_tags.iter().rposition(|t| *t == name) {
                open_tags.remove(pos);
            }
        } else {
            open_tags.push(name);
        }
    }

    if open_tags.is_empty() {
        return html.to_string();
    }
    let mut result = html.to_string();
    for tag in open_tags.into_iter().rev() {
        let _ = write!(result, "</{tag}>");
    }
    result
}
