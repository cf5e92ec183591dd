//! Blob service REST transport authorised by a shared access signature.
//!
//! Every request is anonymous: the access grant travels in the query string
//! of the container URL, and per-request parameters are appended to it.
//! Uploads larger than one block are staged with Put Block and committed
//! with Put Block List, so sources are streamed rather than buffered whole.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::store::{BlobDownload, BlobStore, ListPage, RemoteObject, StoreError};

const API_VERSION: &str = "2021-08-06";
const OCTET_STREAM: &str = "application/octet-stream";
const BLOB_NOT_FOUND: &str = "BlobNotFound";
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;
pub const MAX_BLOCK_SIZE: usize = 4000 * 1024 * 1024;

pub struct SasContainer {
    client: Client,
    container_url: Url,
    block_size: usize,
    page_size: Option<u32>,
}

impl SasContainer {
    pub fn new(client: Client, container_url: Url) -> Self {
        Self {
            client,
            container_url,
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: None,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.clamp(1, MAX_BLOCK_SIZE);
        self
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    fn blob_url(&self, key: &str) -> Url {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let mut url = self.container_url.clone();
        let path = format!(
            "{}/{}",
            self.container_url.path().trim_end_matches('/'),
            encoded.join("/")
        );
        url.set_path(&path);
        url
    }

    fn list_url(&self, prefix: &str, delimiter: Option<&str>, marker: Option<&str>) -> Url {
        let mut url = self.container_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("restype", "container")
                .append_pair("comp", "list")
                .append_pair("prefix", prefix);
            if let Some(delimiter) = delimiter {
                query.append_pair("delimiter", delimiter);
            }
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
            if let Some(page_size) = self.page_size {
                query.append_pair("maxresults", &page_size.to_string());
            }
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("x-ms-version", API_VERSION)
    }

    async fn put_blob(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::PUT, self.blob_url(key))
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(data)
            .send()
            .await?;
        check(resp, key).await?;
        Ok(())
    }

    async fn put_block(&self, key: &str, block_id: &str, data: Bytes) -> Result<(), StoreError> {
        let mut url = self.blob_url(key);
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", block_id);
        let resp = self
            .request(reqwest::Method::PUT, url)
            .body(data)
            .send()
            .await?;
        check(resp, key).await?;
        Ok(())
    }

    async fn put_block_list(&self, key: &str, block_ids: &[String]) -> Result<(), StoreError> {
        let mut url = self.blob_url(key);
        url.query_pairs_mut().append_pair("comp", "blocklist");
        let resp = self
            .request(reqwest::Method::PUT, url)
            .header("x-ms-blob-content-type", OCTET_STREAM)
            .header(CONTENT_TYPE, "application/xml")
            .body(block_list_xml(block_ids))
            .send()
            .await?;
        check(resp, key).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SasContainer {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let url = self.list_url(prefix, delimiter, marker);
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        let resp = check(resp, prefix).await?;
        let body = resp.text().await?;
        Ok(parse_list_page(&body))
    }

    async fn get(&self, key: &str) -> Result<BlobDownload, StoreError> {
        let resp = self
            .request(reqwest::Method::GET, self.blob_url(key))
            .send()
            .await?;
        let resp = check(resp, key).await?;

        let content_length = resp.content_length().unwrap_or(0);
        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        Ok(BlobDownload {
            content_length,
            body: Box::new(StreamReader::new(Box::pin(stream))),
        })
    }

    async fn put(&self, key: &str, body: &mut (dyn AsyncRead + Unpin + Send)) -> Result<(), StoreError> {
        let first = read_block(body, self.block_size).await?;
        if first.len() < self.block_size {
            return self.put_blob(key, first).await;
        }

        let mut block_ids = Vec::new();
        let mut block = first;
        while !block.is_empty() {
            let id = block_id(block_ids.len());
            self.put_block(key, &id, block).await?;
            block_ids.push(id);
            block = read_block(body, self.block_size).await?;
        }
        self.put_block_list(key, &block_ids).await?;

        debug!(key = %key, blocks = block_ids.len(), "Staged blob upload complete");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::DELETE, self.blob_url(key))
            .send()
            .await?;
        check(resp, key).await?;
        Ok(())
    }
}

/// Turn a non-success response into a `StoreError`. A 404 is only treated
/// as not-found when the service blames the blob (or gives no code at all).
async fn check(resp: Response, key: &str) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = resp
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = resp.text().await.unwrap_or_default();

    if status == StatusCode::NOT_FOUND && code.as_deref().map_or(true, |c| c == BLOB_NOT_FOUND) {
        return Err(StoreError::NotFound(key.to_string()));
    }

    let message = element(&body, "Message")
        .map(|(_, text)| unescape(text))
        .unwrap_or(body);
    Err(StoreError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Read up to `limit` bytes; a short result means the source is exhausted.
async fn read_block(body: &mut (dyn AsyncRead + Unpin + Send), limit: usize) -> std::io::Result<Bytes> {
    let mut buf = Vec::with_capacity(limit.min(DEFAULT_BLOCK_SIZE));
    (&mut *body).take(limit as u64).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Block IDs must all have the same length within one blob.
fn block_id(n: usize) -> String {
    BASE64.encode(format!("block-{:010}", n))
}

fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

// ── List Blobs response parsing ──────────────────────────────────────────────

fn parse_list_page(xml: &str) -> ListPage {
    let mut page = ListPage::default();

    for (_, blob) in elements(xml, "Blob") {
        let Some(name) = element_name(blob) else {
            continue;
        };
        let size = element(blob, "Content-Length")
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0);
        let created_at = element(blob, "Creation-Time")
            .or_else(|| element(blob, "Last-Modified"))
            .and_then(|(_, v)| parse_http_date(v))
            .unwrap_or_default();
        page.blobs.push(RemoteObject {
            name,
            size,
            created_at,
        });
    }

    for (_, prefix) in elements(xml, "BlobPrefix") {
        if let Some(name) = element_name(prefix) {
            page.prefixes.push(name);
        }
    }

    page.next_marker = element(xml, "NextMarker")
        .map(|(_, v)| unescape(v.trim()))
        .filter(|m| !m.is_empty());
    page
}

/// Attribute text and inner text of every `<tag ...>...</tag>` in `xml`.
/// Self-closing elements yield empty inner text.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<(&'a str, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut remaining = xml;

    while let Some(start) = remaining.find(&open) {
        let after = &remaining[start + open.len()..];
        let Some(gt) = after.find('>') else { break };
        let attrs = &after[..gt];
        let body = &after[gt + 1..];

        // `<Blob` must not match `<Blobs>` or `<BlobPrefix>`.
        if !(attrs.is_empty() || attrs.starts_with(char::is_whitespace) || attrs == "/") {
            remaining = body;
            continue;
        }
        if attrs.trim_end().ends_with('/') {
            found.push((attrs, ""));
            remaining = body;
            continue;
        }

        let Some(end) = body.find(&close) else { break };
        found.push((attrs, &body[..end]));
        remaining = &body[end + close.len()..];
    }
    found
}

fn element<'a>(xml: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    elements(xml, tag).into_iter().next()
}

/// Decoded `<Name>` of a blob or prefix entry. Names the service could not
/// represent in XML arrive percent-encoded with `Encoded="true"`.
fn element_name(xml: &str) -> Option<String> {
    let (attrs, text) = element(xml, "Name")?;
    let name = unescape(text);
    if attrs.contains(r#"Encoded="true""#) {
        urlencoding::decode(&name).ok().map(|d| d.into_owned())
    } else {
        Some(name)
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse an RFC 1123 timestamp such as `Mon, 01 Jan 2024 10:00:00 GMT`.
fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
