use std::fmt;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use url::Url;

use crate::config::DavConfig;
use crate::error::{TransferError, TransferResult};
use crate::path::RemotePath;

/// The fixed property query sent with every PROPFIND.
///
/// Servers vary in strictness, so the exact same bytes go out on every call:
/// content type, entity tag, collection tag, creation date, modification
/// date, and the resource type that distinguishes files from collections.
pub const PROPFIND_BODY: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
<D:propfind xmlns:D=\"DAV:\" xmlns:CS=\"http://calendarserver.org/ns/\">\
<D:prop>\
<D:getcontenttype/>\
<D:getetag/>\
<CS:getctag/>\
<D:creationdate/>\
<D:getlastmodified/>\
<D:resourcetype/>\
</D:prop>\
</D:propfind>";

/// PROPFIND depth. Listing one level is the unit of work; recursive listing
/// is caller composition, so `infinity` is deliberately not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
}

impl Depth {
    fn header_value(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
        }
    }
}

/// Request body shapes the transport knows how to send.
pub enum RequestBody {
    None,
    Xml(&'static str),
    Bytes(Bytes),
    Stream {
        len: u64,
        stream: BoxStream<'static, std::io::Result<Bytes>>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::None => write!(f, "None"),
            RequestBody::Xml(text) => write!(f, "Xml({} bytes)", text.len()),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Stream { len, .. } => write!(f, "Stream({len} bytes)"),
        }
    }
}

/// A fully-formed protocol request: verb, absolute target, headers, body.
#[derive(Debug)]
pub struct DavRequest {
    pub method: &'static str,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: RequestBody,
}

/// Builds protocol-correct requests from relative paths. No state beyond
/// the resolved base URL.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
}

impl RequestBuilder {
    pub fn new(config: &DavConfig) -> TransferResult<Self> {
        let base_url = config.webdav_url();
        Url::parse(&base_url).map_err(|e| TransferError::InvalidPath {
            path: base_url.clone(),
            reason: format!("base URL does not parse: {e}"),
        })?;
        Ok(Self { base_url })
    }

    /// Absolute, percent-encoded target for a relative path.
    pub fn url_for(&self, path: &RemotePath) -> TransferResult<Url> {
        let encoded = path.encoded();
        let joined = if path.is_root() {
            self.base_url.clone()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                encoded.trim_start_matches('/')
            )
        };
        Url::parse(&joined).map_err(|e| TransferError::InvalidPath {
            path: path.as_str().to_string(),
            reason: format!("does not form a valid URL: {e}"),
        })
    }

    pub fn propfind(&self, path: &RemotePath, depth: Depth) -> TransferResult<DavRequest> {
        Ok(DavRequest {
            method: "PROPFIND",
            url: self.url_for(path)?,
            headers: vec![
                ("Depth", depth.header_value().to_string()),
                ("Content-Type", "application/xml".to_string()),
            ],
            body: RequestBody::Xml(PROPFIND_BODY),
        })
    }

    pub fn mkcol(&self, path: &RemotePath) -> TransferResult<DavRequest> {
        Ok(DavRequest {
            method: "MKCOL",
            url: self.url_for(path)?,
            headers: Vec::new(),
            body: RequestBody::None,
        })
    }

    pub fn delete(&self, path: &RemotePath) -> TransferResult<DavRequest> {
        Ok(DavRequest {
            method: "DELETE",
            url: self.url_for(path)?,
            headers: Vec::new(),
            body: RequestBody::None,
        })
    }

    /// COPY and MOVE differ only in whether the server removes the source;
    /// client-side that is purely verb selection.
    pub fn copy(&self, source: &RemotePath, destination: &RemotePath) -> TransferResult<DavRequest> {
        self.copy_or_move("COPY", source, destination)
    }

    pub fn mv(&self, source: &RemotePath, destination: &RemotePath) -> TransferResult<DavRequest> {
        self.copy_or_move("MOVE", source, destination)
    }

    fn copy_or_move(
        &self,
        method: &'static str,
        source: &RemotePath,
        destination: &RemotePath,
    ) -> TransferResult<DavRequest> {
        let destination_url = self.url_for(destination)?;
        Ok(DavRequest {
            method,
            url: self.url_for(source)?,
            headers: vec![
                ("Destination", destination_url.to_string()),
                ("Overwrite", "T".to_string()),
            ],
            body: RequestBody::None,
        })
    }

    pub fn get(&self, path: &RemotePath) -> TransferResult<DavRequest> {
        Ok(DavRequest {
            method: "GET",
            url: self.url_for(path)?,
            headers: Vec::new(),
            body: RequestBody::None,
        })
    }

    pub fn put(&self, path: &RemotePath, body: RequestBody) -> TransferResult<DavRequest> {
        Ok(DavRequest {
            method: "PUT",
            url: self.url_for(path)?,
            headers: Vec::new(),
            body,
        })
    }

    /// PUT for one piece of a chunked upload; marked with the chunked-v1
    /// protocol header so the server routes it to reassembly.
    pub fn put_chunk(&self, chunk_path: &RemotePath, body: RequestBody) -> TransferResult<DavRequest> {
        Ok(DavRequest {
            method: "PUT",
            url: self.url_for(chunk_path)?,
            headers: vec![("OC-Chunked", "1".to_string())],
            body,
        })
    }
}
