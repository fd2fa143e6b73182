use std::io::{self, Read};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_DISPOSITION, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::error::IbeError;
use crate::store::Store;

const PROGRESS_STEP_BYTES: u64 = 8 * 1024 * 1024;
const FALLBACK_FILE_NAME: &str = "ibe-download";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Where a download lands: an exact file, or a directory where the name is
/// taken from the response.
#[derive(Debug, Clone, Copy)]
pub enum Destination<'a> {
    File(&'a Utf8Path),
    Dir(&'a Utf8Path),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    Local,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub path: Utf8PathBuf,
    pub suggested_name: Option<String>,
    pub response_code: u16,
    pub origin: FileOrigin,
}

/// Cookies of the request on whose behalf a file is fetched.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cookies: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

pub trait Downloader: Send + Sync {
    fn download(
        &self,
        url: &str,
        request: &RequestContext,
        destination: Destination<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<FileInfo, IbeError>;
}

/// Blocking client with the configured user agent and timeout.
pub fn http_client(config: &ResolvedConfig) -> Result<Client, IbeError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|_| IbeError::invalid("user_agent", &config.user_agent))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .build()
        .map_err(IbeError::HttpClient)
}

pub(crate) fn handle_status(response: Response) -> Result<Response, IbeError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let message = response
        .text()
        .ok()
        .map(|body| body.trim().to_string())
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| "IBE request failed".to_string());
    warn!(%url, status, "IBE request rejected");
    Err(IbeError::Status { status, message })
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(config: &ResolvedConfig) -> Result<Self, IbeError> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Downloader for HttpDownloader {
    fn download(
        &self,
        url: &str,
        request: &RequestContext,
        destination: Destination<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<FileInfo, IbeError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Download; GET {url}"),
            elapsed: None,
        });

        let mut builder = self.client.get(url);
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }
        let response = builder.send().map_err(|source| IbeError::Transport {
            url: url.to_string(),
            source,
        })?;
        let response = handle_status(response)?;
        let response_code = response.status().as_u16();
        let suggested_name =
            content_disposition_name(response.headers()).or_else(|| url_file_name(url));

        let path = match destination {
            Destination::File(path) => path.to_owned(),
            Destination::Dir(dir) => {
                dir.join(suggested_name.as_deref().unwrap_or(FALLBACK_FILE_NAME))
            }
        };

        let mut reader = ProgressReader::new(response, sink, started);
        let written = Store::write_stream_atomic(&path, &mut reader, |source| IbeError::Body {
            url: url.to_string(),
            source,
        })?;

        sink.event(ProgressEvent {
            message: format!("phase=Done; {written} bytes to {path}"),
            elapsed: Some(started.elapsed()),
        });
        info!(%url, %path, bytes = written, "downloaded");

        Ok(FileInfo {
            path,
            suggested_name,
            response_code,
            origin: FileOrigin::Downloaded,
        })
    }
}

/// Reports a progress event every few megabytes read.
struct ProgressReader<'a, R> {
    inner: R,
    sink: &'a dyn ProgressSink,
    started: Instant,
    read: u64,
    next_report: u64,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    fn new(inner: R, sink: &'a dyn ProgressSink, started: Instant) -> Self {
        Self {
            inner,
            sink,
            started,
            read: 0,
            next_report: PROGRESS_STEP_BYTES,
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.read += count as u64;
        if self.read >= self.next_report {
            self.next_report = self.read + PROGRESS_STEP_BYTES;
            self.sink.event(ProgressEvent {
                message: format!("phase=Download; {} MiB", self.read / (1024 * 1024)),
                elapsed: Some(self.started.elapsed()),
            });
        }
        Ok(count)
    }
}

/// `filename` from a `Content-Disposition` header, quoted or bare.
pub fn content_disposition_name(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"'))
        .and_then(safe_file_name)
}

/// Last path segment of `url`, ignoring any query string.
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    safe_file_name(segment)
}

fn safe_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
