//! Track sources: where submitted URLs are turned into track metadata.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::igc;
use crate::track::ParsedTrack;

/// Fetches and parses the track file behind a URL.
#[async_trait]
pub trait TrackSource: Send + Sync + fmt::Debug {
    /// Fetch `url` and extract its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed URL,
    /// [`Error::TrackFetch`] if the download fails and [`Error::TrackParse`]
    /// if the content is not a usable track.
    async fn fetch(&self, url: &str) -> Result<ParsedTrack>;
}

/// Downloads IGC files over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTrackSource {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpTrackSource {
    /// Create a source with a per-request timeout and a download size limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl TrackSource for HttpTrackSource {
    async fn fetch(&self, url: &str) -> Result<ParsedTrack> {
        let parsed_url = reqwest::Url::parse(url.trim())
            .map_err(|e| Error::validation(format!("invalid track URL {url}: {e}")))?;
        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "unsupported URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        debug!("Fetching track from {}", parsed_url);
        let mut response = self
            .client
            .get(parsed_url)
            .send()
            .await
            .map_err(|e| Error::track_fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::track_fetch(url, format!("unexpected status {status}")));
        }
        if response
            .content_length()
            .is_some_and(|len| usize::try_from(len).map_or(true, |len| len > self.max_bytes))
        {
            return Err(Error::track_fetch(url, "file exceeds the size limit"));
        }

        // Content-Length is optional, so the limit is enforced while reading
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::track_fetch(url, e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(Error::track_fetch(url, "file exceeds the size limit"));
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&body);
        igc::parse(&text)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HttpTrackSource {
        HttpTrackSource::new(Duration::from_millis(500), 1024).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let err = source().fetch("not a url").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_scheme() {
        let err = source().fetch("ftp://example.com/a.igc").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        // Nothing listens on the discard port
        let err = source()
            .fetch("http://127.0.0.1:9/track.igc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TrackFetch { .. }));
        assert!(err.is_client_error());
    }

    /// Accepts one connection and answers with a chunked body of
    /// `chunks` chunks of `chunk_len` bytes, then keeps the connection open.
    async fn serve_chunked(chunks: usize, chunk_len: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
                        Transfer-Encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = format!("{chunk_len:x}\r\n{}\r\n", "B".repeat(chunk_len));
            for _ in 0..chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
            }
            // Never terminate the body
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        format!("http://{addr}/track.igc")
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_rejected_while_streaming() {
        let url = serve_chunked(4, 4096).await;
        let source = HttpTrackSource::new(Duration::from_secs(10), 1024).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), source.fetch(&url))
            .await
            .expect("fetch should stop at the size limit without reading to the end")
            .unwrap_err();
        assert!(matches!(err, Error::TrackFetch { .. }));
        assert!(err.to_string().contains("size limit"));
    }

    #[tokio::test]
    async fn test_stub_source() {
        let stub = testing::StubTrackSource::default();
        assert_eq!(
            stub.fetch("http://example.com/a.igc").await.unwrap().glider,
            "RV8"
        );
        assert!(stub.fetch("http://example.com/a.txt").await.is_err());
        assert_eq!(stub.fetch_count(), 2);
    }
}
