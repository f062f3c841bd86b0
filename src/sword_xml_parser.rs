use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::{debug, warn};

use crate::errors::{Result, SwordError};
use crate::models::{
    stack_and_save, AcceptPackaging, Collection, DepositReceipt, FeedItem, PropertyValue,
    ServiceDocument,
};

const SWORD_NAMESPACE_PREFIX: &[u8] = b"http://purl.org/net/sword";

/// Child elements of a collection the parser knows how to interpret
#[derive(Debug, Clone, PartialEq)]
enum CollectionElement {
    AcceptPackaging { rank: f32 },
    Title,
    /// Kept in the collection's property bag under its local name
    Other(String),
}

impl CollectionElement {
    fn classify(local: &str, e: &BytesStart) -> Self {
        match local {
            "acceptPackaging" => CollectionElement::AcceptPackaging {
                rank: parse_rank(attribute(e, "q").as_deref()),
            },
            "title" => CollectionElement::Title,
            other => CollectionElement::Other(other.to_string()),
        }
    }
}

/// Capability elements in the SWORD namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolElement {
    Version,
    Verbose,
    NoOp,
    MaxUploadSize,
}

impl ProtocolElement {
    fn from_local_name(local: &str) -> Option<Self> {
        match local {
            "version" => Some(ProtocolElement::Version),
            "verbose" => Some(ProtocolElement::Verbose),
            "noOp" => Some(ProtocolElement::NoOp),
            "maxUploadSize" => Some(ProtocolElement::MaxUploadSize),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum CaptureTarget {
    Collection(CollectionElement),
    Protocol(ProtocolElement),
    RepositoryTitle,
}

/// Text being collected for the element open at `depth`
#[derive(Debug)]
struct Capture {
    target: CaptureTarget,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct ServiceDocumentBuilder {
    document: ServiceDocument,
    collection: Option<(Collection, usize)>,
    capture: Option<Capture>,
}

impl ServiceDocumentBuilder {
    fn open(&mut self, e: &BytesStart, depth: usize, in_sword_namespace: bool) {
        let local = local_name(e);

        if let Some((_, collection_depth)) = &self.collection {
            if depth == collection_depth + 1 {
                self.capture = Some(Capture {
                    target: CaptureTarget::Collection(CollectionElement::classify(&local, e)),
                    depth,
                    text: String::new(),
                });
            }
            return;
        }

        if local == "collection" {
            let href = attribute(e, "href");
            if href.is_none() {
                warn!("Collection element without href at depth {}", depth);
            }
            self.collection = Some((Collection::new(href), depth));
            return;
        }

        let target = match ProtocolElement::from_local_name(&local) {
            Some(element) if in_sword_namespace => CaptureTarget::Protocol(element),
            _ if local == "title" => CaptureTarget::RepositoryTitle,
            _ => return,
        };

        self.capture = Some(Capture {
            target,
            depth,
            text: String::new(),
        });
    }

    fn text(&mut self, text: &str, depth: usize) {
        if let Some(capture) = &mut self.capture {
            if capture.depth == depth {
                capture.text.push_str(text);
            }
        }
    }

    fn close(&mut self, depth: usize) {
        if matches!(&self.capture, Some(capture) if capture.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.finish_capture(capture);
            }
            return;
        }

        if matches!(&self.collection, Some((_, collection_depth)) if *collection_depth == depth) {
            if let Some((collection, _)) = self.collection.take() {
                self.document.collections.push(collection);
            }
        }
    }

    fn finish_capture(&mut self, capture: Capture) {
        let text = capture.text.trim().to_string();

        match capture.target {
            CaptureTarget::Collection(element) => {
                let Some((collection, _)) = self.collection.as_mut() else {
                    return;
                };
                match element {
                    CollectionElement::AcceptPackaging { rank } => {
                        collection.accept_packaging.push(AcceptPackaging { rank, value: text });
                    }
                    CollectionElement::Title => {
                        collection.title = non_empty(text);
                    }
                    CollectionElement::Other(name) => {
                        collection.save_property(&name, text);
                    }
                }
            }
            CaptureTarget::Protocol(element) => match element {
                ProtocolElement::Version => self.document.version = non_empty(text),
                ProtocolElement::Verbose => self.document.verbose = parse_flag(&text),
                ProtocolElement::NoOp => self.document.no_op = parse_flag(&text),
                ProtocolElement::MaxUploadSize => {
                    self.document.max_upload_size = text.parse().ok();
                    if self.document.max_upload_size.is_none() {
                        warn!("Ignoring unreadable maxUploadSize '{}'", text);
                    }
                }
            },
            CaptureTarget::RepositoryTitle => {
                if !text.is_empty() {
                    self.document.repository_name = Some(text);
                }
            }
        }
    }
}

/// Parses a SWORD service document in a single pass, keeping document order.
///
/// `collection` and `app:collection` are treated alike. A collection without
/// `href` is kept with no deposit URL rather than rejected.
pub fn parse_service_document(xml_text: &str) -> Result<ServiceDocument> {
    let mut reader = NsReader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut builder = ServiceDocumentBuilder::default();
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(xml_error(&reader, xml_text, e)),
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                let in_sword_namespace = is_sword_namespace(&reader.resolve_element(e.name()).0);
                builder.open(&e, depth, in_sword_namespace);
            }
            Event::Empty(e) => {
                saw_root = true;
                let in_sword_namespace = is_sword_namespace(&reader.resolve_element(e.name()).0);
                builder.open(&e, depth + 1, in_sword_namespace);
                builder.close(depth + 1);
            }
            Event::Text(e) => {
                let text = unescape_text(&reader, xml_text, &e)?;
                builder.text(&text, depth);
            }
            Event::CData(e) => {
                builder.text(&String::from_utf8_lossy(&e), depth);
            }
            Event::End(_) => {
                builder.close(depth);
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    check_complete(xml_text, saw_root, depth)?;

    let document = builder.document;
    debug!(
        "Parsed service document: {} collections, repository name {:?}",
        document.collections.len(),
        document.repository_name
    );
    Ok(document)
}

/// Parses the Atom entry returned by a successful deposit.
///
/// Namespace declarations on the entry (`xmlns`, `xmlns:*`) are parser
/// artifacts and never reach the receipt.
pub fn parse_deposit_receipt(xml_text: &str) -> Result<DepositReceipt> {
    let mut reader = NsReader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut receipt = DepositReceipt::default();
    let mut fields: BTreeMap<String, PropertyValue> = BTreeMap::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    // Local name and accumulated text of the entry child currently open
    let mut current: Option<(String, String)> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(xml_error(&reader, xml_text, e)),
        };

        let (start, is_empty) = match &event {
            Event::Start(e) => (Some(e.clone()), false),
            Event::Empty(e) => (Some(e.clone()), true),
            _ => (None, false),
        };

        if let Some(e) = start {
            let element_depth = depth + 1;
            let local = local_name(&e);

            if element_depth == 1 {
                saw_root = true;
                if local != "entry" {
                    return Err(SwordError::parse(
                        format!("expected an Atom entry, found <{}>", local),
                        xml_text,
                        0,
                    ));
                }
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    if let Ok(value) = attr.unescape_value() {
                        stack_and_save(&mut fields, &key, value.into_owned());
                    }
                }
            } else if element_depth == 2 {
                match local.as_str() {
                    "content" => receipt.content_src = attribute(&e, "src"),
                    "link" => {
                        if let Some(href) = attribute(&e, "href") {
                            receipt.links.push(href);
                        }
                    }
                    "generator" | "server" => receipt.server_uri = attribute(&e, "uri"),
                    _ => {}
                }
                current = Some((local, String::new()));
            }

            if is_empty {
                if element_depth == 2 {
                    if let Some((name, text)) = current.take() {
                        save_entry_field(&mut receipt, &mut fields, name, text);
                    }
                }
            } else {
                depth += 1;
            }
            continue;
        }

        match event {
            Event::Text(e) => {
                let text = unescape_text(&reader, xml_text, &e)?;
                append_entry_text(&mut current, &text, depth);
            }
            Event::CData(e) => {
                append_entry_text(&mut current, &String::from_utf8_lossy(&e), depth);
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some((name, text)) = current.take() {
                        save_entry_field(&mut receipt, &mut fields, name, text);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    check_complete(xml_text, saw_root, depth)?;

    fields.retain(|key, _| !is_namespace_declaration(key));
    receipt.title = first_field(&fields, "title");
    receipt.id = first_field(&fields, "id");
    receipt.rights = first_field(&fields, "rights");
    receipt.updated = first_field(&fields, "updated").and_then(|value| parse_timestamp(&value));
    receipt.fields = fields;

    Ok(receipt)
}

/// Parses a collection's Atom feed into its entries
pub fn parse_feed(xml_text: &str) -> Result<Vec<FeedItem>> {
    let mut reader = NsReader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut entry: Option<(FeedItem, usize)> = None;
    let mut current_element = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(xml_error(&reader, xml_text, e)),
        };

        let is_start = matches!(event, Event::Start(_));

        match event {
            Event::Start(e) | Event::Empty(e) => {
                saw_root = true;
                let element_depth = depth + 1;
                let local = local_name(&e);

                if local == "entry" && entry.is_none() {
                    entry = Some((FeedItem::default(), element_depth));
                } else if let Some((item, _)) = entry.as_mut() {
                    if local == "link" && item.link.is_none() {
                        item.link = attribute(&e, "href");
                    }
                    current_element = local;
                }

                if is_start {
                    depth = element_depth;
                } else if matches!(&entry, Some((_, entry_depth)) if *entry_depth == element_depth) {
                    // <entry/> carries nothing
                    entry = None;
                }
            }
            Event::Text(e) => {
                let text = unescape_text(&reader, xml_text, &e)?;
                let text = text.trim();
                if let Some((item, _)) = entry.as_mut() {
                    match current_element.as_str() {
                        "id" => item.id = Some(text.to_string()),
                        "updated" => item.updated = Some(text.to_string()),
                        "link" if item.link.is_none() => item.link = Some(text.to_string()),
                        "name" => item.authors.push(text.to_string()),
                        _ => {}
                    }
                }
            }
            Event::End(_) => {
                if matches!(&entry, Some((_, entry_depth)) if *entry_depth == depth) {
                    if let Some((item, _)) = entry.take() {
                        if !item.is_empty() {
                            items.push(item);
                        }
                    }
                }
                current_element.clear();
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    check_complete(xml_text, saw_root, depth)?;
    Ok(items)
}

fn save_entry_field(
    receipt: &mut DepositReceipt,
    fields: &mut BTreeMap<String, PropertyValue>,
    name: String,
    text: String,
) {
    let text = text.trim().to_string();

    match name.as_str() {
        "generator" | "server" if !text.is_empty() => receipt.server_name = Some(text.clone()),
        _ => {}
    }

    // Elements that only carry attributes are saved under their main attribute
    let value = if text.is_empty() {
        match name.as_str() {
            "content" => receipt.content_src.clone(),
            "link" => receipt.links.last().cloned(),
            _ => None,
        }
        .unwrap_or_default()
    } else {
        text
    };

    stack_and_save(fields, &name, value);
}

fn append_entry_text(current: &mut Option<(String, String)>, text: &str, depth: usize) {
    if depth < 2 {
        return;
    }
    if let Some((_, buffer)) = current.as_mut() {
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(text.trim());
    }
}

fn first_field(fields: &BTreeMap<String, PropertyValue>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(|value| value.first())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// `xmlns` and `xmlns:prefix` keys are namespace bindings, not entry data
pub fn is_namespace_declaration(key: &str) -> bool {
    key == "xmlns" || key.contains("xmlns:")
}

fn is_sword_namespace(resolved: &ResolveResult) -> bool {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => ns.starts_with(SWORD_NAMESPACE_PREFIX),
        ResolveResult::Unknown(prefix) => prefix.as_slice() == b"sword",
        ResolveResult::Unbound => false,
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Attribute value by local name; malformed attributes are skipped
fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

fn parse_rank(q: Option<&str>) -> f32 {
    match q.and_then(|value| value.trim().parse::<f32>().ok()) {
        Some(rank) if rank.is_finite() => rank.clamp(0.0, 1.0),
        _ => 1.0,
    }
}

fn parse_flag(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc2822(value.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

fn unescape_text<R>(reader: &NsReader<R>, xml_text: &str, e: &BytesText) -> Result<String> {
    e.unescape()
        .map(|text| text.into_owned())
        .map_err(|err| {
            SwordError::parse(
                format!("XML parsing error: {}", err),
                xml_text,
                reader.buffer_position() as usize,
            )
        })
}

fn xml_error<R>(reader: &NsReader<R>, xml_text: &str, e: quick_xml::Error) -> SwordError {
    SwordError::parse(
        format!("XML parsing error: {}", e),
        xml_text,
        reader.error_position() as usize,
    )
}

fn check_complete(xml_text: &str, saw_root: bool, depth: usize) -> Result<()> {
    if !saw_root {
        return Err(SwordError::parse("document has no root element", xml_text, 0));
    }
    if depth != 0 {
        return Err(SwordError::parse(
            format!("unexpected end of document with {} unclosed elements", depth),
            xml_text,
            xml_text.len(),
        ));
    }
    Ok(())
}
