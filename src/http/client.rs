//! HTTP/1.1 range client
//!
//! Fetches byte ranges of a remote resource over a [`Transport`]. The
//! resource size is learned with a `HEAD` request, the `Range` header is
//! planned locally with [`parse_range`], and every resulting range is
//! fetched with its own single-range `GET`.

use crate::http::range::{parse_range, ByteRange};
use crate::http::transport::Transport;
use anyhow::{Context, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

const USER_AGENT: &str = concat!("rangekit/", env!("CARGO_PKG_VERSION"));

/// A response read from the server. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }
}

/// The bytes of one range of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePart {
    pub range: ByteRange,
    /// Size of the whole resource
    pub size: u64,
    pub data: Bytes,
}

impl RangePart {
    pub fn content_range(&self) -> String {
        self.range.content_range(self.size)
    }
}

/// Client that downloads byte ranges
#[derive(Debug, Clone, Default)]
pub struct RangeClient {
    transport: Transport,
}

impl RangeClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Fetch the ranges described by a `Range` header value.
    ///
    /// An empty header fetches the whole resource. Header errors are
    /// returned as a [`RangeError`](crate::http::range::RangeError) inside
    /// the `anyhow::Error`.
    pub async fn fetch(&self, url: &Url, range_header: &str) -> Result<Vec<RangePart>> {
        let size = self.content_length(url).await?;

        let ranges = if range_header.is_empty() {
            vec![ByteRange::new(0, size)]
        } else {
            parse_range(range_header, size)?
        };

        tracing::debug!(
            url = %url,
            size,
            ranges = ranges.len(),
            "Planned range requests"
        );

        let mut parts = Vec::with_capacity(ranges.len());
        for range in ranges {
            parts.push(self.fetch_range(url, range, Some(size)).await?);
        }

        Ok(parts)
    }

    /// Learn the size of a resource with a `HEAD` request.
    pub async fn content_length(&self, url: &Url) -> Result<u64> {
        let response = self.send(url, "HEAD", None).await?;

        if !(200..300).contains(&response.status) {
            anyhow::bail!("HEAD {} returned status {}", url, response.status);
        }

        response
            .content_length()
            .with_context(|| format!("HEAD {} returned no usable Content-Length", url))
    }

    /// Fetch a single range.
    ///
    /// When `size` is known, a `206` response must describe exactly the
    /// requested range. A server that ignores `Range` and answers `200`
    /// has its body sliced locally.
    pub async fn fetch_range(
        &self,
        url: &Url,
        range: ByteRange,
        size: Option<u64>,
    ) -> Result<RangePart> {
        if range.length() == 0 {
            return Ok(RangePart {
                range,
                size: size.unwrap_or(range.start()),
                data: Bytes::new(),
            });
        }

        let range_value = range
            .to_header_value()
            .with_context(|| format!("Range {:?} ends past the largest offset", range))?;

        let response = self.send(url, "GET", Some(&range_value)).await?;

        match response.status {
            206 => {
                let content_range = response
                    .header("Content-Range")
                    .context("206 response without Content-Range")?;
                let size = match size {
                    Some(size) => size,
                    None => content_range_size(content_range)?,
                };

                let expected = range.content_range(size);
                if content_range != expected {
                    anyhow::bail!(
                        "Server sent Content-Range {:?}, expected {:?}",
                        content_range,
                        expected
                    );
                }

                if response.body.len() as u64 != range.length() {
                    anyhow::bail!(
                        "Range body is {} bytes, expected {}",
                        response.body.len(),
                        range.length()
                    );
                }

                tracing::info!(url = %url, content_range = %expected, "Range fetched");

                Ok(RangePart { range, size, data: response.body })
            }
            200 => {
                let size = response.body.len() as u64;
                let end = range.start().saturating_add(range.length());
                if end > size {
                    anyhow::bail!("Range {} is outside the {} byte body", range_value, size);
                }

                tracing::warn!(url = %url, "Server ignored Range header, slicing full body");

                let data = response.body.slice(range.start() as usize..end as usize);
                Ok(RangePart { range, size, data })
            }
            416 => anyhow::bail!(
                "Server rejected {} as unsatisfiable (Content-Range: {})",
                range_value,
                response.header("Content-Range").unwrap_or("-")
            ),
            status => anyhow::bail!("GET {} returned status {}", url, status),
        }
    }

    async fn send(&self, url: &Url, method: &str, range: Option<&str>) -> Result<HttpResponse> {
        if url.scheme() != "http" {
            anyhow::bail!("Unsupported URL scheme: {}", url.scheme());
        }

        let host = url.host_str().context("URL missing host")?;
        let port = url.port_or_known_default().unwrap_or(80);
        // Bracketed IPv6 literals need the brackets removed for resolution
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let mut stream = self.transport.connect(host, port).await?;

        let request = self.build_http_request(method, url, range);
        stream.write_all(&request).await?;
        stream.flush().await?;

        tracing::trace!(method, url = %url, "Request sent");

        self.read_http_response(&mut stream, method != "HEAD").await
    }

    /// Build HTTP request bytes
    pub fn build_http_request(&self, method: &str, url: &Url, range: Option<&str>) -> Vec<u8> {
        let mut buffer = Vec::new();

        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        buffer.extend_from_slice(format!("{} {} HTTP/1.1\r\n", method, target).as_bytes());

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };

        let mut headers = vec![
            ("Host", host),
            ("User-Agent", USER_AGENT.to_string()),
        ];

        if let Some(range) = range {
            headers.push(("Range", range.to_string()));
        }

        if self.transport.disable_compression {
            headers.push(("Accept-Encoding", "identity".to_string()));
        }

        // Connections are never reused, so always ask the server to close.
        headers.push(("Connection", "close".to_string()));

        for (key, value) in &headers {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        buffer.extend_from_slice(b"\r\n");
        buffer
    }

    async fn read_http_response(&self, stream: &mut TcpStream, expect_body: bool) -> Result<HttpResponse> {
        let head = self.read_response_head(stream);

        let (status, headers, mut buffer) = match self.transport.response_header_timeout {
            Some(limit) => timeout(limit, head)
                .await
                .context("Response header timeout")??,
            None => head.await?,
        };

        let body = if expect_body {
            self.read_response_body(stream, &mut buffer, &headers).await?
        } else {
            Bytes::new()
        };

        Ok(HttpResponse { status, headers, body })
    }

    /// Read up to the end of the response head. Returns the parsed head and
    /// whatever body bytes arrived with it.
    async fn read_response_head(
        &self,
        stream: &mut TcpStream,
    ) -> Result<(u16, HashMap<String, String>, BytesMut)> {
        let limit = self.transport.max_response_header_bytes as usize;
        let mut buffer = BytesMut::with_capacity(self.transport.read_buffer_size.max(1024));

        loop {
            if let Some(headers_end) = buffer
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
            {
                let head = buffer.split_to(headers_end + 4);
                let (status, headers) = parse_response_head(&head)?;
                return Ok((status, headers, buffer));
            }

            if buffer.len() > limit {
                anyhow::bail!("Response headers exceed {} bytes", limit);
            }

            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                anyhow::bail!("Connection closed before complete response received");
            }
        }
    }

    async fn read_response_body(
        &self,
        stream: &mut TcpStream,
        buffer: &mut BytesMut,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes> {
        // Transfer-Encoding overrides Content-Length
        if let Some(encoding) = headers.get("transfer-encoding") {
            let chunked = encoding
                .split(',')
                .next_back()
                .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));

            if chunked {
                return read_chunked_body(stream, buffer).await;
            }
            return read_until_close(stream, buffer).await;
        }

        let Some(content_length) = headers.get("content-length") else {
            return read_until_close(stream, buffer).await;
        };

        let content_length: usize = content_length
            .parse()
            .context("Invalid Content-Length in response")?;

        buffer.reserve(content_length.saturating_sub(buffer.len()));
        while buffer.len() < content_length {
            let n = stream.read_buf(buffer).await?;
            if n == 0 {
                anyhow::bail!("Connection closed before complete body received");
            }
        }

        Ok(buffer.split_to(content_length).freeze())
    }
}

/// Body without framing: it ends when the server closes the connection.
async fn read_until_close(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<Bytes> {
    while stream.read_buf(buffer).await? > 0 {}
    Ok(buffer.split().freeze())
}

/// Decode a `Transfer-Encoding: chunked` body. Chunk extensions and
/// trailer fields are discarded.
async fn read_chunked_body(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<Bytes> {
    let mut body = BytesMut::new();

    loop {
        let line = read_line(stream, buffer).await?;
        let size = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size, 16)
            .with_context(|| format!("Invalid chunk size line {:?}", line))?;

        if size == 0 {
            // Trailer section ends with an empty line
            while !read_line(stream, buffer).await?.is_empty() {}
            return Ok(body.freeze());
        }

        while buffer.len() < size + 2 {
            if stream.read_buf(buffer).await? == 0 {
                anyhow::bail!("Connection closed while reading chunk data");
            }
        }

        body.extend_from_slice(&buffer[..size]);
        if &buffer[size..size + 2] != b"\r\n" {
            anyhow::bail!("Chunk data not terminated by CRLF");
        }
        buffer.advance(size + 2);
    }
}

/// Take one CRLF-terminated line off the front of `buffer`, reading more as needed.
async fn read_line(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<String> {
    loop {
        if let Some(pos) = buffer.windows(2).position(|w| w == b"\r\n") {
            let line = buffer.split_to(pos + 2);
            return Ok(String::from_utf8_lossy(&line[..pos]).into_owned());
        }

        if stream.read_buf(buffer).await? == 0 {
            anyhow::bail!("Connection closed while reading chunked body");
        }
    }
}

/// Parse a status line and headers
fn parse_response_head(head: &[u8]) -> Result<(u16, HashMap<String, String>)> {
    let head = std::str::from_utf8(head).context("Invalid UTF-8 in response headers")?;
    let mut lines = head.lines();

    let status_line = lines.next().context("Empty response")?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        anyhow::bail!("Invalid status line: {}", status_line);
    }

    let status: u16 = parts
        .next()
        .context("Missing status code")?
        .parse()
        .context("Invalid status code")?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok((status, headers))
}

/// Resource size from a `bytes a-b/size` Content-Range value.
fn content_range_size(value: &str) -> Result<u64> {
    value
        .rsplit_once('/')
        .and_then(|(_, size)| size.parse().ok())
        .with_context(|| format!("Content-Range {:?} carries no size", value))
}
