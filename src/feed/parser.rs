use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

/// Errors from decoding a response body as an RSS document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not well-formed XML
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// An element was still open when the body ended
    #[error("Unexpected end of document inside <{0}>")]
    UnexpectedEof(String),
    /// Well-formed XML, but no `<channel>` under the root element
    #[error("Document has no <channel> element")]
    MissingChannel,
}

/// In-memory form of one fetched RSS document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

/// One `<item>` as it appears in the document. `pub_date` is the raw
/// `<pubDate>` text; its format is not trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Which text field the reader is currently inside
#[derive(Clone, Copy)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

/// Decode an RSS 2.0 body.
///
/// Reads `<root><channel>` with its `title`, `link`, `description` and any
/// number of `<item>` children (`title`, `link`, `description`, `pubDate`).
/// The root element's name is not checked and unknown elements are ignored.
/// Names are matched with their prefix, so `<atom:link>` is not `<link>`.
///
/// Channel title and description are additionally HTML-entity-decoded;
/// item fields keep whatever the XML layer produced.
pub fn parse_document(bytes: &[u8]) -> Result<RssDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut doc = RssDocument::default();
    let mut saw_channel = false;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut item: Option<RssItem> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if stack.len() == 1 && name == b"channel" {
                    saw_channel = true;
                }
                if stack.len() == 2 && is_channel(&stack) && name == b"item" {
                    item = Some(RssItem::default());
                }
                stack.push(name);
            }
            Event::End(_) => {
                let closed = stack.pop();
                let closed_item = closed.as_deref() == Some(b"item".as_slice());
                if stack.len() == 2 && is_channel(&stack) && closed_item {
                    if let Some(done) = item.take() {
                        doc.items.push(done);
                    }
                }
            }
            Event::Empty(e) => {
                if stack.len() == 1 && e.name().as_ref() == b"channel" {
                    saw_channel = true;
                }
                if stack.len() == 2 && is_channel(&stack) && e.name().as_ref() == b"item" {
                    doc.items.push(RssItem::default());
                }
            }
            Event::Text(e) => {
                if let Some(field) = current_field(&stack) {
                    let text = e.unescape()?;
                    append(&mut doc, item.as_mut(), field, &text);
                }
            }
            Event::CData(e) => {
                if let Some(field) = current_field(&stack) {
                    let raw = e.into_inner();
                    append(&mut doc, item.as_mut(), field, &String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::UnexpectedEof(
            String::from_utf8_lossy(open).into_owned(),
        ));
    }
    if !saw_channel {
        return Err(ParseError::MissingChannel);
    }

    doc.title = unescape_html(&doc.title);
    doc.description = unescape_html(&doc.description);

    Ok(doc)
}

fn is_channel(stack: &[Vec<u8>]) -> bool {
    stack.get(1).map(Vec::as_slice) == Some(b"channel".as_slice())
}

fn current_field(stack: &[Vec<u8>]) -> Option<Field> {
    if !is_channel(stack) {
        return None;
    }
    match (stack.len(), stack.last().map(Vec::as_slice)) {
        (3, Some(b"title")) => Some(Field::ChannelTitle),
        (3, Some(b"link")) => Some(Field::ChannelLink),
        (3, Some(b"description")) => Some(Field::ChannelDescription),
        (4, Some(leaf)) if stack[2] == b"item" => match leaf {
            b"title" => Some(Field::ItemTitle),
            b"link" => Some(Field::ItemLink),
            b"description" => Some(Field::ItemDescription),
            b"pubDate" => Some(Field::ItemPubDate),
            _ => None,
        },
        _ => None,
    }
}

fn append(doc: &mut RssDocument, item: Option<&mut RssItem>, field: Field, text: &str) {
    let target = match (field, item) {
        (Field::ChannelTitle, _) => &mut doc.title,
        (Field::ChannelLink, _) => &mut doc.link,
        (Field::ChannelDescription, _) => &mut doc.description,
        (Field::ItemTitle, Some(item)) => &mut item.title,
        (Field::ItemLink, Some(item)) => &mut item.link,
        (Field::ItemDescription, Some(item)) => &mut item.description,
        (Field::ItemPubDate, Some(item)) => &mut item.pub_date,
        (_, None) => return,
    };
    target.push_str(text);
}

/// HTML entities (`&amp;nbsp;` arrives as `&nbsp;` after XML decoding).
/// Text that does not decode cleanly is kept as-is.
fn unescape_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    htmlescape::decode_html(s).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
    <title>Example &amp;amp; Co</title>
    <link>https://example.com</link>
    <atom:link href="https://example.com/rss" rel="self"/>
    <description>News &amp;amp; notes</description>
    <item>
        <title>First</title>
        <link>https://example.com/1</link>
        <description><![CDATA[<p>Hello</p>]]></description>
        <pubDate>Mon, 02 Jan 2006 15:04:05 MST</pubDate>
    </item>
    <item>
        <title>Second &amp;amp; more</title>
        <link>https://example.com/2</link>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let doc = parse_document(SAMPLE.as_bytes()).unwrap();

        assert_eq!(doc.title, "Example & Co");
        assert_eq!(doc.link, "https://example.com");
        assert_eq!(doc.description, "News & notes");
        assert_eq!(doc.items.len(), 2);
        assert_eq!(
            doc.items[0],
            RssItem {
                title: "First".into(),
                link: "https://example.com/1".into(),
                description: "<p>Hello</p>".into(),
                pub_date: "Mon, 02 Jan 2006 15:04:05 MST".into(),
            }
        );
    }

    #[test]
    fn test_item_fields_not_html_unescaped() {
        let doc = parse_document(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.items[1].title, "Second &amp; more");
        assert_eq!(doc.items[1].description, "");
        assert_eq!(doc.items[1].pub_date, "");
    }

    #[test]
    fn test_empty_channel() {
        let doc = parse_document(br#"<rss version="2.0"><channel></channel></rss>"#).unwrap();
        assert_eq!(doc, RssDocument::default());
    }

    #[test]
    fn test_self_closing_channel() {
        let doc = parse_document(br#"<rss><channel/></rss>"#).unwrap();
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_nested_unknown_elements_ignored() {
        let xml = br#"<rss><channel><image><title>Logo</title></image>
            <item><title>Only</title><source><title>Elsewhere</title></source></item>
            </channel></rss>"#;
        let doc = parse_document(xml).unwrap();
        assert_eq!(doc.title, "");
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "Only");
    }

    #[test]
    fn test_unclosed_tag_is_error() {
        assert!(parse_document(b"<not valid xml").is_err());
    }

    #[test]
    fn test_truncated_document_is_error() {
        let err = parse_document(b"<rss><channel><item><title>x</title>").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof(_)), "got {:?}", err);
    }

    #[test]
    fn test_mismatched_end_tag_is_error() {
        assert!(parse_document(b"<rss><channel></item></rss>").is_err());
    }

    #[test]
    fn test_missing_channel_is_error() {
        let err = parse_document(b"<html><body>hi</body></html>").unwrap_err();
        assert!(matches!(err, ParseError::MissingChannel));
    }
}
