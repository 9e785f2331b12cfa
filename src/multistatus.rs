use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use std::str;
use tracing::{debug, warn};

use crate::error::{TransferError, TransferResult};
use crate::path::RemotePath;

/// Parsed properties of one remote resource. Produced exclusively by
/// [`parse_multistatus`]; immutable once constructed.
///
/// Every field except the collection flag is optional: servers omit
/// properties freely and a missing one degrades to `None` rather than
/// failing the parse. The CTag in particular only exists for collections on
/// servers that support it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub ctag: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub is_collection: bool,
}

/// One entry of a listing: the resource path and its properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub path: RemotePath,
    pub props: PropertyRecord,
}

/// Result of listing a collection, in document order.
///
/// The first entry is always the queried collection itself, followed by its
/// immediate children in the order the server returned them. One level only;
/// recursive listing is built by the caller out of single-level calls.
#[derive(Debug, Clone, Default)]
pub struct ResourceTree {
    pub entries: Vec<ResourceEntry>,
}

impl ResourceTree {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The queried resource's own entry.
    pub fn root(&self) -> Option<&ResourceEntry> {
        self.entries.first()
    }

    /// The immediate children, excluding the self entry.
    pub fn children(&self) -> &[ResourceEntry] {
        if self.entries.is_empty() {
            &[]
        } else {
            &self.entries[1..]
        }
    }

    /// Strips a server-specific href prefix from every entry, turning full
    /// server paths into paths relative to the DAV base.
    pub fn rebase(mut self, prefix: &str) -> Self {
        for entry in &mut self.entries {
            entry.path = entry.path.relative_to(prefix);
        }
        self
    }
}

/// Properties gathered inside one propstat block, merged into the record
/// only when the block's status is 200.
#[derive(Debug, Default)]
struct PendingProps {
    content_type: Option<String>,
    etag: Option<String>,
    ctag: Option<String>,
    created_raw: Option<String>,
    modified_raw: Option<String>,
    is_collection: bool,
    status_line: Option<String>,
}

impl PendingProps {
    fn merge_into(self, record: &mut PropertyRecord) {
        if self.content_type.is_some() {
            record.content_type = self.content_type;
        }
        if self.etag.is_some() {
            record.etag = self.etag;
        }
        if self.ctag.is_some() {
            record.ctag = self.ctag;
        }
        if let Some(raw) = self.created_raw {
            record.created = parse_dav_date(&raw);
        }
        if let Some(raw) = self.modified_raw {
            record.modified = parse_http_date(&raw);
        }
        if self.is_collection {
            record.is_collection = true;
        }
    }
}

/// Decodes a multistatus body into a [`ResourceTree`].
///
/// Fails with `MalformedResponse` only when the document is not well-formed
/// XML or the root element is not the multistatus container. A propstat
/// whose status is 404 for some property keeps the entry and drops just
/// those property values.
pub fn parse_multistatus(xml_text: &str) -> TransferResult<ResourceTree> {
    let mut reader = Reader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut saw_root = false;
    let mut in_response = false;
    let mut in_propstat = false;
    let mut in_resourcetype = false;
    let mut current_element = String::new();
    let mut current_href: Option<String> = None;
    let mut current_record = PropertyRecord::default();
    let mut pending: PendingProps = PendingProps::default();

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e)?;

                if !saw_root {
                    if name != "multistatus" {
                        return Err(TransferError::MalformedResponse(format!(
                            "root element is '{name}', expected 'multistatus'"
                        )));
                    }
                    saw_root = true;
                    buf.clear();
                    continue;
                }

                match name.as_str() {
                    "response" => {
                        in_response = true;
                        current_href = None;
                        current_record = PropertyRecord::default();
                    }
                    "propstat" => {
                        in_propstat = true;
                        pending = PendingProps::default();
                    }
                    "resourcetype" => {
                        in_resourcetype = true;
                    }
                    _ => {
                        current_element = name;
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(&e)?;
                if !saw_root {
                    if name != "multistatus" {
                        return Err(TransferError::MalformedResponse(format!(
                            "root element is '{name}', expected 'multistatus'"
                        )));
                    }
                    // Self-closed multistatus: a valid, empty document.
                    break;
                }
                if name == "collection" && in_resourcetype {
                    pending.is_collection = true;
                }
                // Other empty elements carry no value; nothing to record.
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| TransferError::MalformedResponse(format!("bad text node: {e}")))?
                    .to_string();
                let text = text.trim();
                if !in_response || text.is_empty() {
                    buf.clear();
                    continue;
                }

                match current_element.as_str() {
                    "href" => current_href = Some(text.to_string()),
                    "getcontenttype" if in_propstat => pending.content_type = Some(text.to_string()),
                    "getetag" if in_propstat => pending.etag = Some(text.to_string()),
                    "getctag" if in_propstat => pending.ctag = Some(text.to_string()),
                    "creationdate" if in_propstat => pending.created_raw = Some(text.to_string()),
                    "getlastmodified" if in_propstat => pending.modified_raw = Some(text.to_string()),
                    "status" if in_propstat => pending.status_line = Some(text.to_string()),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name_end(&e)?;

                match name.as_str() {
                    "response" => {
                        match current_href.take() {
                            Some(href) => {
                                let path = RemotePath::from_encoded(&href)?;
                                entries.push(ResourceEntry {
                                    path,
                                    props: std::mem::take(&mut current_record),
                                });
                            }
                            None => {
                                warn!("multistatus response without an href, skipping entry");
                            }
                        }
                        in_response = false;
                    }
                    "propstat" => {
                        let block = std::mem::take(&mut pending);
                        let ok = block
                            .status_line
                            .as_deref()
                            .map(|status| status.contains("200"))
                            .unwrap_or(false);
                        if ok {
                            block.merge_into(&mut current_record);
                        } else {
                            debug!(
                                "dropping propstat with status {:?}",
                                block.status_line.as_deref().unwrap_or("<none>")
                            );
                        }
                        in_propstat = false;
                    }
                    "resourcetype" => {
                        in_resourcetype = false;
                    }
                    _ => {}
                }

                current_element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TransferError::MalformedResponse(format!("XML parsing error: {e}"))),
            _ => {}
        }

        buf.clear();
    }

    if !saw_root {
        return Err(TransferError::MalformedResponse(
            "document has no multistatus root element".to_string(),
        ));
    }

    Ok(ResourceTree { entries })
}

fn local_name(e: &BytesStart) -> TransferResult<String> {
    let qname = e.name();
    let local = qname.local_name();
    let name = str::from_utf8(local.as_ref())
        .map_err(|e| TransferError::MalformedResponse(format!("invalid UTF-8 in element name: {e}")))?;
    Ok(name.to_string())
}

fn local_name_end(e: &BytesEnd) -> TransferResult<String> {
    let qname = e.name();
    let local = qname.local_name();
    let name = str::from_utf8(local.as_ref())
        .map_err(|e| TransferError::MalformedResponse(format!("invalid UTF-8 in element name: {e}")))?;
    Ok(name.to_string())
}

/// Modification dates arrive as HTTP-dates (RFC 2822 shaped); fall back to
/// RFC 3339 and a bare GMT format for lenient servers.
fn parse_http_date(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(date_str)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(date_str, "%a, %d %b %Y %H:%M:%S GMT")
                .ok()
                .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
        })
}

/// Creation dates are RFC 3339 per the protocol, but some servers emit
/// HTTP-dates there too.
fn parse_dav_date(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_http_date(date_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_listing_in_document_order() {
        let xml = r#"<?xml version="1.0"?>
        <d:multistatus xmlns:d="DAV:" xmlns:cs="http://calendarserver.org/ns/">
            <d:response>
                <d:href>/webdav/Documents/</d:href>
                <d:propstat>
                    <d:prop>
                        <d:resourcetype><d:collection/></d:resourcetype>
                        <d:getetag>"dir-etag"</d:getetag>
                        <cs:getctag>ctag-1</cs:getctag>
                        <d:getlastmodified>Mon, 01 Jan 2024 12:00:00 GMT</d:getlastmodified>
                    </d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
            <d:response>
                <d:href>/webdav/Documents/b.txt</d:href>
                <d:propstat>
                    <d:prop>
                        <d:resourcetype/>
                        <d:getcontenttype>text/plain</d:getcontenttype>
                        <d:getetag>"etag-b"</d:getetag>
                        <d:creationdate>2024-01-01T10:00:00Z</d:creationdate>
                    </d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
            <d:response>
                <d:href>/webdav/Documents/a.pdf</d:href>
                <d:propstat>
                    <d:prop>
                        <d:resourcetype/>
                        <d:getcontenttype>application/pdf</d:getcontenttype>
                        <d:getetag>"etag-a"</d:getetag>
                    </d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
        </d:multistatus>"#;

        let tree = parse_multistatus(xml).unwrap();
        assert_eq!(tree.len(), 3);

        // Document order, self entry first, no sorting applied.
        let root = tree.root().unwrap();
        assert_eq!(root.path.as_str(), "/webdav/Documents");
        assert!(root.props.is_collection);
        assert_eq!(root.props.ctag.as_deref(), Some("ctag-1"));
        assert!(root.props.modified.is_some());

        assert_eq!(tree.children()[0].path.as_str(), "/webdav/Documents/b.txt");
        assert_eq!(tree.children()[1].path.as_str(), "/webdav/Documents/a.pdf");
        assert!(!tree.children()[0].props.is_collection);
        assert!(tree.children()[0].props.created.is_some());
    }

    #[test]
    fn test_missing_ctag_is_absent_not_an_error() {
        let xml = r#"<?xml version="1.0"?>
        <d:multistatus xmlns:d="DAV:" xmlns:cs="http://calendarserver.org/ns/">
            <d:response>
                <d:href>/webdav/Folder/</d:href>
                <d:propstat>
                    <d:prop>
                        <d:resourcetype><d:collection/></d:resourcetype>
                        <d:getetag>"etag"</d:getetag>
                    </d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
                <d:propstat>
                    <d:prop>
                        <cs:getctag/>
                    </d:prop>
                    <d:status>HTTP/1.1 404 Not Found</d:status>
                </d:propstat>
            </d:response>
        </d:multistatus>"#;

        let tree = parse_multistatus(xml).unwrap();
        assert_eq!(tree.len(), 1);
        let entry = tree.root().unwrap();
        assert_eq!(entry.props.etag.as_deref(), Some("\"etag\""));
        assert!(entry.props.ctag.is_none());
        assert!(entry.props.is_collection);
    }

    #[test]
    fn test_values_in_failed_propstat_are_dropped() {
        let xml = r#"<?xml version="1.0"?>
        <d:multistatus xmlns:d="DAV:">
            <d:response>
                <d:href>/webdav/f.txt</d:href>
                <d:propstat>
                    <d:prop><d:getetag>"good"</d:getetag></d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
                <d:propstat>
                    <d:prop><d:getcontenttype>bogus/stale</d:getcontenttype></d:prop>
                    <d:status>HTTP/1.1 404 Not Found</d:status>
                </d:propstat>
            </d:response>
        </d:multistatus>"#;

        let tree = parse_multistatus(xml).unwrap();
        let entry = tree.root().unwrap();
        assert_eq!(entry.props.etag.as_deref(), Some("\"good\""));
        assert!(entry.props.content_type.is_none());
    }

    #[test]
    fn test_url_encoded_hrefs_are_decoded() {
        let xml = r#"<?xml version="1.0"?>
        <d:multistatus xmlns:d="DAV:">
            <d:response>
                <d:href>/webdav/File%20with%20spaces.pdf</d:href>
                <d:propstat>
                    <d:prop><d:getetag>"x"</d:getetag></d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
        </d:multistatus>"#;

        let tree = parse_multistatus(xml).unwrap();
        assert_eq!(
            tree.root().unwrap().path.as_str(),
            "/webdav/File with spaces.pdf"
        );
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        let result = parse_multistatus("<d:multistatus xmlns:d=\"DAV:\"><unclosed");
        assert!(matches!(result, Err(TransferError::MalformedResponse(_))));
    }

    #[test]
    fn test_wrong_root_element_is_rejected() {
        let xml = r#"<?xml version="1.0"?><html><body>not dav</body></html>"#;
        let result = parse_multistatus(xml);
        assert!(matches!(result, Err(TransferError::MalformedResponse(_))));
    }

    #[test]
    fn test_empty_multistatus() {
        let xml = r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:"></d:multistatus>"#;
        let tree = parse_multistatus(xml).unwrap();
        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        assert!(tree.children().is_empty());
    }

    #[test]
    fn test_rebase_strips_server_prefix() {
        let xml = r#"<?xml version="1.0"?>
        <d:multistatus xmlns:d="DAV:">
            <d:response>
                <d:href>/remote.php/dav/files/testuser/Photos/</d:href>
                <d:propstat>
                    <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
            <d:response>
                <d:href>/remote.php/dav/files/testuser/Photos/pic.jpg</d:href>
                <d:propstat>
                    <d:prop><d:getetag>"p"</d:getetag></d:prop>
                    <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
            </d:response>
        </d:multistatus>"#;

        let tree = parse_multistatus(xml)
            .unwrap()
            .rebase("/remote.php/dav/files/testuser");
        assert_eq!(tree.root().unwrap().path.as_str(), "/Photos");
        assert_eq!(tree.children()[0].path.as_str(), "/Photos/pic.jpg");
    }

    #[test]
    fn test_date_parsing_fallbacks() {
        assert!(parse_http_date("Mon, 01 Jan 2024 12:00:00 GMT").is_some());
        assert!(parse_http_date("2024-01-01T12:00:00Z").is_some());
        assert!(parse_http_date("not a date").is_none());
        assert!(parse_dav_date("2024-01-01T12:00:00+02:00").is_some());
        assert!(parse_dav_date("").is_none());
    }
}
