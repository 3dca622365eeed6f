//! Markdown bodies: the HTML part of a message, and the plain-text rendering
//! used for the text part and for preview checks.

use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, TextMergeStream, html};

static OPTIONS: LazyLock<Options> = LazyLock::new(|| {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
});

fn parse(markdown: &str) -> TextMergeStream<'_, Parser<'_>> {
    TextMergeStream::new(Parser::new_ext(markdown, *OPTIONS))
}

/// Render a Markdown body as HTML.
///
/// Raw HTML in the source is escaped and shown as text rather than passed
/// through to the recipient.
#[must_use]
pub fn to_html(markdown: &str) -> String {
    let events = parse(markdown).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, events);
    output
}

/// A Markdown body reduced to what a reader sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainText {
    /// The visible text; blocks separated by a blank line, markup dropped
    pub text: String,
    /// Destinations of every link, in order of appearance
    pub links: Vec<String>,
}

/// How the text gathered inside a block is laid out once the block closes
fn close(end: TagEnd, inner: &str) -> String {
    match end {
        TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::BlockQuote(_) => {
            let inner = inner.trim_end();
            if inner.is_empty() {
                String::new()
            } else {
                format!("{inner}\n\n")
            }
        }
        TagEnd::List(_) => format!("{}\n\n", inner.trim()),
        TagEnd::Item | TagEnd::TableHead | TagEnd::TableRow => format!("{}\n", inner.trim()),
        TagEnd::Table => format!("{inner}\n"),
        TagEnd::TableCell => format!("{inner} "),
        TagEnd::HtmlBlock => String::new(),
        // Inline markup keeps only its text
        _ => inner.to_string(),
    }
}

/// Reduce a Markdown body to plain text, collecting link destinations on
/// the way.
#[must_use]
pub fn to_plain(markdown: &str) -> PlainText {
    let mut links = Vec::new();
    let mut blocks = vec![String::new()];

    for event in parse(markdown) {
        match event {
            Event::Start(tag) => {
                if let Tag::Link { dest_url, .. } = tag {
                    links.push(dest_url.into_string());
                }
                blocks.push(String::new());
            }
            Event::End(end) => {
                let Some(inner) = blocks.pop() else {
                    continue;
                };
                let closed = close(end, &inner);
                match blocks.last_mut() {
                    Some(parent) => parent.push_str(&closed),
                    None => blocks.push(closed),
                }
            }
            Event::Text(text)
            | Event::Code(text)
            | Event::InlineMath(text)
            | Event::DisplayMath(text) => {
                if let Some(current) = blocks.last_mut() {
                    current.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak | Event::Rule => {
                if let Some(current) = blocks.last_mut() {
                    current.push('\n');
                }
            }
            _ => {}
        }
    }

    PlainText {
        text: blocks.concat().trim_end().to_string(),
        links,
    }
}

/// Shorthand for the text of [`to_plain`]
#[must_use]
pub fn to_text(markdown: &str) -> String {
    to_plain(markdown).text
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const NEWSLETTER: &str =
        "# Welcome\n\nThis is **important**, see [our site](https://example.com).\n\n- one\n- two";

    #[test]
    fn test_markdown_to_html() {
        assert_eq!(
            to_html(NEWSLETTER),
            "<h1>Welcome</h1>\n\
             <p>This is <strong>important</strong>, see <a href=\"https://example.com\">our site</a>.</p>\n\
             <ul>\n<li>one</li>\n<li>two</li>\n</ul>\n"
        );
    }

    #[test]
    fn test_markdown_to_text() {
        assert_eq!(
            to_text(NEWSLETTER),
            "Welcome\n\nThis is important, see our site.\n\none\ntwo"
        );
    }

    #[test]
    fn test_line_breaks_and_paragraphs() {
        assert_eq!(
            to_html("Hello,\nworld\n\n\nBye"),
            "<p>Hello,\nworld</p>\n<p>Bye</p>\n"
        );
        assert_eq!(to_text("Hello,\nworld\n\n\nBye"), "Hello,\nworld\n\nBye");
    }

    #[test]
    fn test_raw_html_is_escaped() {
        assert_eq!(
            to_html("a < b & <b>c</b>"),
            "<p>a &lt; b &amp; &lt;b&gt;c&lt;/b&gt;</p>\n"
        );
        assert_eq!(to_text("Hi <b>there</b>"), "Hi there");
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(to_html(""), "");
        assert_eq!(to_plain("\n\n"), PlainText::default());
    }

    #[test]
    fn test_links_come_from_markdown_links() {
        let plain = to_plain(
            "Read [the guide](https://a.example/one?utm_source=x), \
             <https://b.example/two> and ![logo](https://c.example/logo.png)",
        );

        assert_eq!(
            plain.links,
            vec!["https://a.example/one?utm_source=x", "https://b.example/two"]
        );
        assert_eq!(
            plain.text,
            "Read the guide, https://b.example/two and logo"
        );
    }

    #[test]
    fn test_table_and_code() {
        let plain = to_text("| a | b |\n|---|---|\n| 1 | 2 |\n\n```\nlet x = 1;\n```");
        assert_eq!(plain, "a b\n1 2\n\nlet x = 1;");
    }
}
