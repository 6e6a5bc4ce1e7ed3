//! reqwest-backed implementation of the WebDAV transport capability set
//! consumed by the driver loop.
//!
//! Grounded on `WebdavClient` in the teacher's `bastion-targets` crate
//! (`webdav_client.rs`): request construction and timing capture. Unlike the
//! teacher (which mirrors remote trees for backup, retries rate limits with
//! `Retry-After`, and parses `PROPFIND` multistatus XML with `roxmltree` to
//! discover remote files), this client's `getinfo` never inspects the
//! response body, and the driver's own retry classification has no
//! `Retry-After`-aware backoff, so neither concern carries over here.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use davstress_core::stats::Timings;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Result of one transport call: did it succeed, what status came back,
/// and how long did each phase take.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub ok: bool,
    pub status: u16,
    pub timings: Timings,
    /// The redirect target on a 3xx response, or the `Content-Type` on a
    /// 200; `None` otherwise. Only `get`/`download`/`download_range`
    /// populate this — mirrors `CURLINFO_REDIRECT_URL`/`CURLINFO_CONTENT_TYPE`
    /// as read by `urltest_getlist.c`'s trace line.
    pub info: Option<String>,
}

/// Result of an `OPTIONS` probe: the status-class outcome plus what the
/// `Allow:` header advertised.
#[derive(Debug, Clone)]
pub struct OptionsOutcome {
    pub outcome: Outcome,
    pub has_propfind: bool,
    pub has_delete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WebdavCredentials {
    pub username: String,
    pub password: String,
}

/// A static `host:port:ip` override, equivalent to curl's `--resolve`.
#[derive(Debug, Clone)]
pub struct HostMapping {
    pub host: String,
    pub port: u16,
    pub ip: IpAddr,
}

impl HostMapping {
    /// Parses the `-m host:port:ip` CLI flag value.
    pub fn parse(s: &str) -> Result<Self, anyhow::Error> {
        let mut parts = s.splitn(3, ':');
        let host = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("host mapping missing host: {s}"))?
            .to_string();
        let port: u16 = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("host mapping missing port: {s}"))?
            .parse()?;
        let ip: IpAddr = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("host mapping missing address: {s}"))?
            .parse()?;
        Ok(HostMapping { host, port, ip })
    }
}

#[derive(Debug, Clone)]
pub struct WebdavTransportConfig {
    pub credentials: Option<WebdavCredentials>,
    pub verify_peer: bool,
    pub host_mappings: Vec<HostMapping>,
    pub follow_redirects: bool,
    pub verbose: bool,
    pub timeout: Duration,
}

impl Default for WebdavTransportConfig {
    fn default() -> Self {
        WebdavTransportConfig {
            credentials: None,
            verify_peer: true,
            host_mappings: Vec::new(),
            follow_redirects: true,
            verbose: false,
            timeout: Duration::from_secs(60),
        }
    }
}

/// The WebDAV capability set: `mkdir`/`upload`/`download`/`downloadRange`/
/// `delete`/`getinfo`/`options`, plus a last-error buffer. See §6.
#[derive(Debug)]
pub struct WebdavTransport {
    http: reqwest::Client,
    credentials: Option<WebdavCredentials>,
    verbose: bool,
    last_error: Mutex<String>,
}

impl WebdavTransport {
    pub fn new(config: WebdavTransportConfig) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if !config.verify_peer {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if !config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }
        for mapping in &config.host_mappings {
            builder = builder.resolve(&mapping.host, SocketAddr::new(mapping.ip, mapping.port));
        }
        let http = builder.build()?;
        Ok(WebdavTransport {
            http,
            credentials: config.credentials,
            verbose: config.verbose,
            last_error: Mutex::new(String::new()),
        })
    }

    pub fn error_buffer(&self) -> String {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        if self.verbose {
            tracing::debug!(%message, "transport error");
        }
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = message;
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => req.basic_auth(&creds.username, Some(&creds.password)),
            None => req,
        }
    }

    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
        request_len: u64,
    ) -> Result<(reqwest::Response, Timings), anyhow::Error> {
        let start = Instant::now();
        let res = self.authed(builder).send().await.inspect_err(|e| {
            self.set_error(e.to_string());
        })?;
        let first_byte = start.elapsed();
        let status = res.status();
        let content_length = res.content_length().unwrap_or(request_len);
        let timings = Timings {
            dns: 0.0,
            tcp_connect: 0.0,
            tls_handshake: 0.0,
            pre_transfer: 0.0,
            first_response_byte: first_byte.as_secs_f64(),
            total_time: start.elapsed().as_secs_f64(),
            content_bytes: content_length as f64,
        };
        if self.verbose {
            tracing::debug!(%status, elapsed_ms = timings.total_time * 1000.0, "webdav request");
        }
        Ok((res, timings))
    }

    pub async fn mkdir(&self, url: &Url) -> Outcome {
        let req = self.http.request(
            Method::from_bytes(b"MKCOL").expect("MKCOL is a valid method token"),
            url.clone(),
        );
        match self.execute(req, 0).await {
            Ok((res, mut timings)) => {
                let status = res.status();
                // MKCOL on an existing collection commonly answers 405; the
                // driver treats that as benign, but we still report the raw
                // status here and let it classify.
                let ok = status == StatusCode::CREATED || status == StatusCode::METHOD_NOT_ALLOWED;
                if !ok {
                    self.set_error(format!("MKCOL {url} -> {status}"));
                }
                timings.content_bytes = 0.0;
                Outcome {
                    ok,
                    status: status.as_u16(),
                    timings,
                    info: None,
                }
            }
            Err(e) => self.failed_outcome(e),
        }
    }

    pub async fn upload(&self, local_path: &Path, url: &Url) -> Result<Outcome, anyhow::Error> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let file = tokio::fs::File::open(local_path).await?;
        let stream = tokio_util::io::ReaderStream::new(file);
        let body = reqwest::Body::wrap_stream(stream);
        let req = self
            .http
            .put(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(body);
        Ok(match self.execute(req, size).await {
            Ok((res, mut timings)) => {
                let status = res.status();
                let ok = status.is_success();
                if !ok {
                    self.set_error(format!("PUT {url} -> {status}"));
                }
                timings.content_bytes = size as f64;
                Outcome {
                    ok,
                    status: status.as_u16(),
                    timings,
                    info: None,
                }
            }
            Err(e) => self.failed_outcome(e),
        })
    }

    /// Plain `GET`. If `sink_path` is given the body is streamed to disk
    /// atomically (`.partial` then rename); otherwise it is discarded.
    pub async fn download(
        &self,
        url: &Url,
        sink_path: Option<&Path>,
    ) -> Result<Outcome, anyhow::Error> {
        self.get(url, sink_path, None).await
    }

    /// Ranged `GET` with `Range: bytes=start-end`.
    pub async fn download_range(
        &self,
        url: &Url,
        sink_path: Option<&Path>,
        start: u64,
        end: u64,
    ) -> Result<Outcome, anyhow::Error> {
        self.get(url, sink_path, Some((start, end))).await
    }

    async fn get(
        &self,
        url: &Url,
        sink_path: Option<&Path>,
        range: Option<(u64, u64)>,
    ) -> Result<Outcome, anyhow::Error> {
        let mut req = self.http.get(url.clone());
        if let Some((start, end)) = range {
            req = req.header(RANGE, format!("bytes={start}-{end}"));
        }
        Ok(match self.execute(req, 0).await {
            Ok((mut res, mut timings)) => {
                let status = res.status();
                let ok = status.is_success();
                let info = response_info(status, res.headers());
                if !ok {
                    self.set_error(format!("GET {url} -> {status}"));
                    timings.content_bytes = 0.0;
                    return Ok(Outcome {
                        ok,
                        status: status.as_u16(),
                        timings,
                        info,
                    });
                }

                let mut written = 0u64;
                match sink_path {
                    Some(dest) => {
                        let file_name = dest
                            .file_name()
                            .and_then(|n| n.to_str())
                            .ok_or_else(|| anyhow::anyhow!("invalid sink file name"))?;
                        let tmp = dest.with_file_name(format!("{file_name}.partial"));
                        let _ = tokio::fs::remove_file(&tmp).await;
                        let mut file = tokio::fs::File::create(&tmp).await?;
                        while let Some(chunk) = res.chunk().await? {
                            file.write_all(&chunk).await?;
                            written = written.saturating_add(chunk.len() as u64);
                        }
                        file.flush().await?;
                        let _ = tokio::fs::remove_file(dest).await;
                        tokio::fs::rename(&tmp, dest).await?;
                    }
                    None => {
                        while let Some(chunk) = res.chunk().await? {
                            written = written.saturating_add(chunk.len() as u64);
                        }
                    }
                }
                timings.total_time = timings.total_time.max(timings.first_response_byte);
                timings.content_bytes = written as f64;
                Outcome {
                    ok,
                    status: status.as_u16(),
                    timings,
                    info,
                }
            }
            Err(e) => self.failed_outcome(e),
        })
    }

    pub async fn delete(&self, url: &Url) -> Outcome {
        let req = self.http.delete(url.clone());
        match self.execute(req, 0).await {
            Ok((res, mut timings)) => {
                let status = res.status();
                let ok = status.is_success() || status == StatusCode::NOT_FOUND;
                if !ok {
                    self.set_error(format!("DELETE {url} -> {status}"));
                }
                timings.content_bytes = 0.0;
                Outcome {
                    ok,
                    status: status.as_u16(),
                    timings,
                    info: None,
                }
            }
            Err(e) => self.failed_outcome(e),
        }
    }

    /// `PROPFIND` at `Depth: 0` with the fixed `allprop` body from §6.
    pub async fn getinfo(&self, url: &Url) -> Outcome {
        const BODY: &str = "<?xml version=\"1.0\"?>\n<a:propfind xmlns:a=\"DAV:\"><a:allprop/></a:propfind>";
        let depth = reqwest::header::HeaderName::from_static("depth");
        let translate = reqwest::header::HeaderName::from_static("translate");
        let req = self
            .http
            .request(Method::from_bytes(b"PROPFIND").expect("valid method"), url.clone())
            .header(depth, "0")
            .header(translate, "f")
            .header(CONTENT_TYPE, "text/xml")
            .body(BODY);
        match self.execute(req, BODY.len() as u64).await {
            Ok((res, mut timings)) => {
                let status = res.status();
                let ok = status == StatusCode::MULTI_STATUS || status.is_success();
                if !ok {
                    self.set_error(format!("PROPFIND {url} -> {status}"));
                }
                timings.content_bytes = 0.0;
                Outcome {
                    ok,
                    status: status.as_u16(),
                    timings,
                    info: None,
                }
            }
            Err(e) => self.failed_outcome(e),
        }
    }

    /// `OPTIONS` and an `Allow:` header scan for `PROPFIND`/`DELETE`
    /// support.
    pub async fn options(&self, url: &Url) -> OptionsOutcome {
        let req = self
            .http
            .request(Method::OPTIONS, url.clone());
        match self.execute(req, 0).await {
            Ok((res, mut timings)) => {
                let status = res.status();
                let ok = status.is_success();
                let allow = res
                    .headers()
                    .get(reqwest::header::ALLOW)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                let methods: Vec<&str> = allow.split(',').map(str::trim).collect();
                let has_propfind = methods.iter().any(|m| m.eq_ignore_ascii_case("PROPFIND"));
                let has_delete = methods.iter().any(|m| m.eq_ignore_ascii_case("DELETE"));
                for m in &methods {
                    if !m.is_empty() && !KNOWN_METHODS.contains(&m.to_ascii_uppercase().as_str()) {
                        tracing::warn!(method = %m, url = %url, "server advertised unrecognized method");
                    }
                }
                if !ok {
                    self.set_error(format!("OPTIONS {url} -> {status}"));
                }
                timings.content_bytes = 0.0;
                OptionsOutcome {
                    outcome: Outcome {
                        ok,
                        status: status.as_u16(),
                        timings,
                        info: None,
                    },
                    has_propfind,
                    has_delete,
                }
            }
            Err(e) => OptionsOutcome {
                outcome: self.failed_outcome(e),
                has_propfind: true,
                has_delete: true,
            },
        }
    }

    fn failed_outcome(&self, error: anyhow::Error) -> Outcome {
        self.set_error(error.to_string());
        Outcome {
            ok: false,
            status: 0,
            timings: Timings::default(),
            info: None,
        }
    }
}

const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "PUT", "POST", "DELETE", "OPTIONS", "MKCOL", "PROPFIND", "PROPPATCH", "COPY",
    "MOVE", "LOCK", "UNLOCK",
];

/// The redirect-url-on-3xx / content-type-on-200 pair `urltest_getlist.c`
/// reads off `CURLINFO_REDIRECT_URL`/`CURLINFO_CONTENT_TYPE` for its trace
/// line. `None` for every other status class.
fn response_info(status: StatusCode, headers: &reqwest::header::HeaderMap) -> Option<String> {
    if status.is_redirection() {
        headers.get(LOCATION)?.to_str().ok().map(str::to_string)
    } else if status == StatusCode::OK {
        headers.get(CONTENT_TYPE)?.to_str().ok().map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode as AxStatus};
    use axum::response::IntoResponse;
    use axum::routing::any;
    use axum::Router;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn spawn_server(app: Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn mkcol_405_on_existing_collection_is_ok() {
        async fn handler(req: Request<Body>) -> impl IntoResponse {
            if req.method().as_str() == "MKCOL" {
                AxStatus::METHOD_NOT_ALLOWED
            } else {
                AxStatus::OK
            }
        }
        let base = spawn_server(Router::new().route("/{*path}", any(handler))).await;
        let transport = WebdavTransport::new(WebdavTransportConfig::default()).unwrap();
        let outcome = transport.mkdir(&base.join("d/").unwrap()).await;
        assert!(outcome.ok);
        assert_eq!(outcome.status, 405);
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        async fn handler(req: Request<Body>) -> impl IntoResponse {
            match req.method().as_str() {
                "PUT" => AxStatus::CREATED.into_response(),
                "GET" => (AxStatus::OK, b"hello world".to_vec()).into_response(),
                _ => AxStatus::OK.into_response(),
            }
        }
        let base = spawn_server(Router::new().route("/{*path}", any(handler))).await;
        let transport = WebdavTransport::new(WebdavTransportConfig::default()).unwrap();

        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, b"hello world").unwrap();
        let url = base.join("f.bin").unwrap();
        let up = transport.upload(&src, &url).await.unwrap();
        assert!(up.ok);

        let dest = dir.path().join("dest.bin");
        let down = transport.download(&url, Some(&dest)).await.unwrap();
        assert!(down.ok);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn download_range_sends_range_header() {
        async fn handler(req: Request<Body>) -> impl IntoResponse {
            let range = req
                .headers()
                .get(reqwest::header::RANGE.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            (AxStatus::PARTIAL_CONTENT, range).into_response()
        }
        let base = spawn_server(Router::new().route("/{*path}", any(handler))).await;
        let transport = WebdavTransport::new(WebdavTransportConfig::default()).unwrap();
        let url = base.join("f.bin").unwrap();
        let outcome = transport.download_range(&url, None, 10, 20).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.status, 206);
    }

    #[tokio::test]
    async fn options_parses_allow_header() {
        async fn handler() -> impl IntoResponse {
            (
                [(reqwest::header::ALLOW.as_str(), "GET, PUT, MKCOL, PROPFIND")],
                AxStatus::OK,
            )
        }
        let base = spawn_server(Router::new().route("/{*path}", any(handler))).await;
        let transport = WebdavTransport::new(WebdavTransportConfig::default()).unwrap();
        let outcome = transport.options(&base).await;
        assert!(outcome.has_propfind);
        assert!(!outcome.has_delete);
    }

    #[tokio::test]
    async fn delete_on_missing_resource_is_ok() {
        async fn handler() -> impl IntoResponse {
            AxStatus::NOT_FOUND
        }
        let base = spawn_server(Router::new().route("/{*path}", any(handler))).await;
        let transport = WebdavTransport::new(WebdavTransportConfig::default()).unwrap();
        let outcome = transport.delete(&base.join("gone").unwrap()).await;
        assert!(outcome.ok);
        assert_eq!(outcome.status, 404);
    }

    #[test]
    fn host_mapping_parses_host_port_ip() {
        let m = HostMapping::parse("example.com:443:127.0.0.1").unwrap();
        assert_eq!(m.host, "example.com");
        assert_eq!(m.port, 443);
        assert_eq!(m.ip, "127.0.0.1".parse::<IpAddr>().unwrap());
    }
}
