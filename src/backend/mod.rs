mod error;

pub use error::{BackendError, Result};

use reqwest::blocking::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::analysis::state::{Stem, StemSet};
use crate::beat::tempo::TempoService;
use crate::beat::TempoEstimate;

pub const DEFAULT_BPM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SEPARATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Server-relative or absolute URLs of the five separated stems.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StemUrls {
    pub kick: String,
    pub drums: String,
    pub bass: String,
    pub vocals: String,
    pub other: String,
}

impl StemUrls {
    pub fn get(&self, stem: Stem) -> &str {
        match stem {
            Stem::Kick => &self.kick,
            Stem::Drums => &self.drums,
            Stem::Bass => &self.bass,
            Stem::Vocals => &self.vocals,
            Stem::Other => &self.other,
        }
    }

    pub fn to_set(&self) -> StemSet<String> {
        StemSet::from_fn(|stem| self.get(stem).to_string())
    }
}

#[derive(Debug, Deserialize)]
struct BpmResponse {
    #[serde(default)]
    bpm: Option<f64>,
    #[serde(default, rename = "beatOffset")]
    beat_offset: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeparationResponse {
    #[serde(default)]
    stems: Option<StemUrls>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct BackendClient {
    base_url: String,
    http: Client,
    bpm_timeout: Duration,
    separation_timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeouts(base_url, DEFAULT_BPM_TIMEOUT, DEFAULT_SEPARATION_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: &str,
        bpm_timeout: Duration,
        separation_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().build().map_err(BackendError::Http)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            bpm_timeout,
            separation_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through; anything else is joined to the base URL.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    pub fn detect_bpm(&self, audio: &Path) -> Result<TempoEstimate> {
        let form = multipart::Form::new().file("file", audio)?;
        self.post_bpm(form)
    }

    /// BPM for a file the server already holds (e.g. a separated stem),
    /// given relative to the server's project root. Nothing is uploaded.
    pub fn detect_bpm_path(&self, server_path: &str) -> Result<TempoEstimate> {
        let form = multipart::Form::new().text("path", server_path.trim_start_matches('/').to_string());
        self.post_bpm(form)
    }

    fn post_bpm(&self, form: multipart::Form) -> Result<TempoEstimate> {
        let url = self.resolve("/api/detect-bpm");
        log::info!("Requesting BPM from {}", url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .timeout(self.bpm_timeout)
            .send()
            .map_err(|e| request_error(e, &url, self.bpm_timeout))?;
        let body = read_body(response, &url, self.bpm_timeout)?;
        parse_bpm_response(&body)
    }

    pub fn separate(&self, audio: &Path) -> Result<StemUrls> {
        let url = self.resolve("/api/separate");
        log::info!(
            "Uploading {} for stem separation (timeout {}s)",
            audio.display(),
            self.separation_timeout.as_secs()
        );
        let form = multipart::Form::new().file("file", audio)?;
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .timeout(self.separation_timeout)
            .send()
            .map_err(|e| request_error(e, &url, self.separation_timeout))?;
        let body = read_body(response, &url, self.separation_timeout)?;
        parse_separation_response(&body)
    }

    /// Download a stem (or any other file) served by the backend.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(url);
        log::debug!("Fetching {}", url);
        let response = self
            .http
            .get(&url)
            .timeout(self.separation_timeout)
            .send()
            .map_err(|e| request_error(e, &url, self.separation_timeout))?;
        let response = check_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|e| request_error(e, &url, self.separation_timeout))?;
        Ok(bytes.to_vec())
    }
}

impl TempoService for BackendClient {
    fn detect_bpm(&self, audio: &Path) -> Result<TempoEstimate> {
        BackendClient::detect_bpm(self, audio)
    }
}

fn request_error(err: reqwest::Error, url: &str, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        BackendError::Http(err)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(status_error(status.as_u16(), body))
}

fn status_error(status: u16, body: String) -> BackendError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => BackendError::Server(err.error),
        Err(_) => BackendError::Status { status, body },
    }
}

fn read_body(response: Response, url: &str, timeout: Duration) -> Result<String> {
    let response = check_status(response)?;
    response.text().map_err(|e| request_error(e, url, timeout))
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))
}

/// `{bpm, beatOffset?}` on success; an `error` field wins even alongside a
/// fallback `bpm`.
pub fn parse_bpm_response(body: &str) -> Result<TempoEstimate> {
    let response: BpmResponse = parse_json(body)?;
    if let Some(error) = response.error {
        return Err(BackendError::Server(error));
    }
    let bpm = response
        .bpm
        .ok_or_else(|| BackendError::Malformed("missing bpm".into()))?;
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(BackendError::Malformed(format!("invalid bpm {}", bpm)));
    }
    let beat_offset = response.beat_offset.filter(|o| o.is_finite()).unwrap_or(0.0);
    Ok(TempoEstimate {
        bpm: bpm as f32,
        beat_offset,
    })
}

pub fn parse_separation_response(body: &str) -> Result<StemUrls> {
    let response: SeparationResponse = parse_json(body)?;
    if let Some(error) = response.error {
        let message = match response.detail {
            Some(detail) => format!("{}: {}", error, detail),
            None => error,
        };
        return Err(BackendError::Server(message));
    }
    response
        .stems
        .ok_or_else(|| BackendError::Malformed("missing stems".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bpm_with_offset() {
        let est = parse_bpm_response(r#"{"bpm": 128, "beatOffset": 0.42}"#).unwrap();
        assert_eq!(est.bpm, 128.0);
        assert_eq!(est.beat_offset, 0.42);
    }

    #[test]
    fn missing_offset_defaults_to_zero() {
        let est = parse_bpm_response(r#"{"bpm": 96}"#).unwrap();
        assert_eq!(est.beat_offset, 0.0);
    }

    #[test]
    fn error_field_is_a_failure_even_with_bpm() {
        let err = parse_bpm_response(r#"{"error": "librosa failed", "bpm": 120}"#).unwrap_err();
        assert!(matches!(err, BackendError::Server(ref m) if m == "librosa failed"));
    }

    #[test]
    fn bad_bpm_bodies_are_malformed() {
        assert!(matches!(parse_bpm_response("{}"), Err(BackendError::Malformed(_))));
        assert!(matches!(parse_bpm_response(r#"{"bpm": 0}"#), Err(BackendError::Malformed(_))));
        assert!(matches!(parse_bpm_response("<html>"), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn parses_stem_urls() {
        let urls = parse_separation_response(
            r#"{"stems": {
                "kick": "/server/output/abc/kick.mp3",
                "drums": "/server/output/abc/drums.mp3",
                "bass": "/server/output/abc/bass.mp3",
                "vocals": "/server/output/abc/vocals.mp3",
                "other": "/server/output/abc/other.mp3"
            }}"#,
        )
        .unwrap();
        assert_eq!(urls.get(Stem::Vocals), "/server/output/abc/vocals.mp3");
        assert_eq!(urls.to_set()[Stem::Kick], "/server/output/abc/kick.mp3");
    }

    #[test]
    fn separation_error_carries_detail() {
        let err = parse_separation_response(
            r#"{"error": "Stem separation failed", "detail": "demucs exited 1"}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "server error: Stem separation failed: demucs exited 1");
    }

    #[test]
    fn status_errors_prefer_json_message() {
        let err = status_error(400, r#"{"error": "No file uploaded"}"#.into());
        assert!(matches!(err, BackendError::Server(ref m) if m == "No file uploaded"));
        let err = status_error(502, "Bad Gateway".into());
        assert!(matches!(err, BackendError::Status { status: 502, .. }));
    }

    /// Answers one request on a loopback port and hands back what it received.
    fn serve_once(reply: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request_complete(&request) {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let (head, body) = (&text[..split], &text[split + 4..]);
        let length = head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        });
        match length {
            Some(length) => body.len() >= length,
            None => body.ends_with("0\r\n\r\n"),
        }
    }

    #[test]
    fn bpm_by_server_path_sends_path_field() {
        let (base, server) = serve_once(r#"{"bpm": 100}"#);
        let client = BackendClient::new(&base).unwrap();
        let est = client.detect_bpm_path("/server/output/abc/vocals.mp3").unwrap();
        assert_eq!(est.bpm, 100.0);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/detect-bpm "));
        assert!(request.contains(r#"name="path""#));
        assert!(request.contains("\r\n\r\nserver/output/abc/vocals.mp3\r\n"));
        assert!(!request.contains(r#"name="file""#));
    }

    #[test]
    fn resolves_relative_urls() {
        let client = BackendClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(
            client.resolve("/server/output/x/kick.mp3"),
            "http://localhost:5000/server/output/x/kick.mp3"
        );
        assert_eq!(client.resolve("https://cdn.example/a.mp3"), "https://cdn.example/a.mp3");
    }
}
