use chrono::{DateTime, Utc};

/// Feed-level metadata plus its entries, independent of the parser crate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub icon: Option<String>,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    /// RSS `guid` or Atom `id`.
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    /// Raw HTML body or description.
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub thumbnail: Option<String>,
}

impl FeedEntry {
    /// Stable identity used to remember the last seen entry: the guid, else
    /// the link, else the title.
    pub fn entry_id(&self) -> Option<String> {
        [&self.guid, &self.link, &self.title]
            .into_iter()
            .flatten()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Plain text from an HTML fragment: tags dropped, script and style bodies
/// skipped, block ends turned into line breaks, entities decoded, blank runs
/// collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut tag: Option<String> = None;
    let mut hidden: Option<String> = None;

    for c in html.chars() {
        match (&mut tag, c) {
            (None, '<') => tag = Some(String::new()),
            (Some(raw), '>') => {
                let closing = raw.trim_start().starts_with('/');
                let name = raw
                    .trim()
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if let Some(open) = &hidden {
                    if closing && *open == name {
                        hidden = None;
                    }
                } else if !closing && (name == "script" || name == "style") {
                    hidden = Some(name);
                } else {
                    match name.as_str() {
                        "li" if !closing => text.push_str("\n- "),
                        "br" | "p" | "div" | "tr" | "h1" | "h2" | "h3" | "h4" => text.push('\n'),
                        _ => {}
                    }
                }
                tag = None;
            }
            (Some(raw), c) => raw.push(c),
            (None, c) if hidden.is_none() => text.push(c),
            (None, _) => {}
        }
    }

    let decoded = html_escape::decode_html_entities(&text);
    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_prefers_guid_then_link_then_title() {
        let mut entry = FeedEntry {
            guid: Some("guid-1".into()),
            link: Some("https://example.com/1".into()),
            title: Some("First".into()),
            ..Default::default()
        };
        assert_eq!(entry.entry_id().as_deref(), Some("guid-1"));

        entry.guid = Some("  ".into());
        assert_eq!(entry.entry_id().as_deref(), Some("https://example.com/1"));

        entry.link = None;
        assert_eq!(entry.entry_id().as_deref(), Some("First"));

        entry.title = None;
        assert_eq!(entry.entry_id(), None);
    }

    #[test]
    fn html_becomes_readable_text() {
        let html = "<p>Patch &amp; fixes</p><ul><li>Fixed &lt;bug&gt;</li><li>Added &#8220;thing&#x201D;</li></ul><br><br><p></p>";
        assert_eq!(
            html_to_text(html),
            "Patch & fixes\n\n- Fixed <bug>\n- Added \u{201C}thing\u{201D}"
        );
    }

    #[test]
    fn stray_ampersands_survive() {
        assert_eq!(html_to_text("Salt & pepper &unknown;"), "Salt & pepper &unknown;");
    }

    #[test]
    fn named_entities_use_the_full_table() {
        assert_eq!(
            html_to_text("It&rsquo;s done &mdash; see notes&hellip; &eacute;"),
            "It\u{2019}s done \u{2014} see notes\u{2026} \u{e9}"
        );
    }

    #[test]
    fn script_and_style_bodies_are_dropped() {
        let html = "<p>Hi</p><script type=\"text/javascript\">var x = 1;</script><style>p{color:red}</style><p>Bye</p>";
        assert_eq!(html_to_text(html), "Hi\n\nBye");
    }
}
