use crate::types::{AggregatorError, FeedDocument, FeedItem, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::BufRead;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    // Qualified names on purpose: `<atom:link href=".."/>` must not land in the channel link.
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Channel,
    Item,
}

struct Capture {
    target: Target,
    field: Field,
    depth: usize,
}

/// Decodes an RSS 2.0 (or RSS 1.0 / RDF) document from raw bytes.
pub fn parse_feed(body: &[u8]) -> Result<FeedDocument> {
    parse_feed_from(body)
}

/// Pull-parses a document from any buffered source.
///
/// Decoding stops as soon as the root element closes, so bytes trailing the
/// document are never read.
pub fn parse_feed_from<R: BufRead>(source: R) -> Result<FeedDocument> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut doc = FeedDocument::default();
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut current_item: Option<(FeedItem, usize)> = None;
    let mut capture: Option<Capture> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();

                if stack.is_empty() {
                    let root = e.local_name();
                    if !matches!(root.as_ref(), b"rss" | b"RDF") {
                        return Err(AggregatorError::Parse(format!(
                            "unexpected root element <{}>",
                            String::from_utf8_lossy(&name)
                        )));
                    }
                }

                let parent = stack.last().map(Vec::as_slice);
                let in_channel = parent == Some(b"channel".as_slice());
                stack.push(name);
                let depth = stack.len();
                let name = &stack[depth - 1];

                if name.as_slice() == b"item"
                    && current_item.is_none()
                    && (in_channel || depth == 2)
                {
                    current_item = Some((FeedItem::default(), depth));
                } else if capture.is_none() {
                    if let Some(field) = Field::from_name(name) {
                        let target = match &current_item {
                            Some((_, item_depth)) if *item_depth + 1 == depth => Some(Target::Item),
                            None if in_channel => Some(Target::Channel),
                            _ => None,
                        };
                        if let Some(target) = target {
                            capture = Some(Capture { target, field, depth });
                            text.clear();
                        }
                    }
                }
            }
            Event::Text(e) => {
                if capture.is_some() {
                    let chunk = e
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                    text.push_str(&chunk);
                }
            }
            Event::CData(e) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                let depth = stack.len();

                if let Some(open) = capture.take() {
                    if open.depth == depth {
                        let value = text.trim().to_string();
                        match open.target {
                            Target::Channel => assign_channel(&mut doc, open.field, value),
                            Target::Item => {
                                if let Some((item, _)) = current_item.as_mut() {
                                    assign_item(item, open.field, value);
                                }
                            }
                        }
                        text.clear();
                    } else {
                        capture = Some(open);
                    }
                }

                if matches!(current_item, Some((_, item_depth)) if item_depth == depth) {
                    if let Some((item, _)) = current_item.take() {
                        doc.items.push(item);
                    }
                }

                stack.pop();
                if stack.is_empty() {
                    break;
                }
            }
            Event::Eof => {
                let message = match stack.last() {
                    None => "document has no root element".to_string(),
                    Some(open) => format!(
                        "unexpected end of document inside <{}>",
                        String::from_utf8_lossy(open)
                    ),
                };
                return Err(AggregatorError::Parse(message));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Decoded feed document with {} items", doc.items.len());
    Ok(doc)
}

fn assign_channel(doc: &mut FeedDocument, field: Field, value: String) {
    match field {
        Field::Title => doc.title = value,
        Field::Link => doc.link = value,
        Field::Description => doc.description = value,
        Field::PubDate => {}
    }
}

fn assign_item(item: &mut FeedItem, field: Field, value: String) {
    match field {
        Field::Title => item.title = value,
        Field::Link => item.link = value,
        Field::Description => item.description = value,
        Field::PubDate => item.pub_date = value,
    }
}
