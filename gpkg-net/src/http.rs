// gpkg-net/src/http.rs
//! Locating release archives on the download backends.
//!
//! Every function here blocks. A successful lookup hands back a
//! [`RemoteArchive`] whose body has not been read yet, so the caller can still
//! decide to reuse a cached copy instead.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use gpkg_common::component::ComponentDescriptor;
use gpkg_common::config::Config;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::options::{DownloadBackend, Options};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_DISPOSITION, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::validation::validate_url;

const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "gpkg release manager (Rust)";

const NEXUS_GROUP_ID: &str = "com.itrsgroup.geneos";
const NEXUS_CLASSIFIER: &str = "linux-x64";

/// An archive located on a backend, body still unread.
#[derive(Debug)]
pub struct RemoteArchive {
    pub filename: String,
    pub content_length: Option<u64>,
    /// The final URL after redirects.
    pub url: Url,
    response: Response,
}

impl RemoteArchive {
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        Box::new(self.response)
    }
}

#[derive(Serialize)]
struct DownloadAuth<'a> {
    username: &'a str,
    password: &'a str,
}

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| GpkgError::Network(format!("Failed to build HTTP client: {e}")))
}

/// Asks the configured backend for the archive matching `component` and
/// `opts`. Any final status above 299 is an error.
pub fn check_archive(
    client: &Client,
    config: &Config,
    component: &ComponentDescriptor,
    opts: &Options,
) -> Result<RemoteArchive> {
    let credentials = Credentials::from(config, opts);
    let response = match opts.backend {
        DownloadBackend::Resources => {
            fetch_resources(client, config, component, opts, &credentials)?
        }
        DownloadBackend::Nexus => fetch_nexus(client, config, component, opts, &credentials)?,
    };

    let status = response.status();
    if status.as_u16() > 299 {
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            && credentials.username.is_none()
        {
            return Err(GpkgError::AuthRequired(format!(
                "{component} downloads from {} need a username and password",
                response.url()
            )));
        }
        error!("HTTP {} for {}", status, response.url());
        return Err(GpkgError::HttpStatus {
            component: component.name.to_string(),
            version: opts.version.clone(),
            status: status.as_u16(),
        });
    }

    let archive = into_archive(response)?;
    debug!(
        "Download check for {} version {:?} returned {} ({:?} bytes)",
        component, opts.version, archive.filename, archive.content_length
    );
    Ok(archive)
}

/// Fetches an archive from an explicit URL.
pub fn fetch_url(client: &Client, url: &str) -> Result<RemoteArchive> {
    let url = validate_url(url)?;
    let response = send(client.get(url.clone()), url.as_str())?;
    let status = response.status();
    if status.as_u16() > 299 {
        let name = url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default()
            .to_string();
        return Err(GpkgError::HttpStatus {
            component: name,
            version: url.to_string(),
            status: status.as_u16(),
        });
    }
    into_archive(response)
}

struct Credentials {
    username: Option<String>,
    password: String,
}

impl Credentials {
    fn from(config: &Config, opts: &Options) -> Self {
        let username = opts
            .username
            .clone()
            .or_else(|| config.download_username.clone());
        let password = opts
            .password
            .clone()
            .or_else(|| config.download_password.clone())
            .unwrap_or_default();
        Self { username, password }
    }
}

fn resources_url(
    base: &Url,
    resource: &str,
    title: Option<&str>,
) -> Result<Url> {
    let mut url = base
        .join(resource)
        .map_err(|e| GpkgError::Config(format!("invalid download url {base}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("os", "linux");
        if let Some(title) = title {
            query.append_pair("title", title);
        }
    }
    Ok(url)
}

fn fetch_resources(
    client: &Client,
    config: &Config,
    component: &ComponentDescriptor,
    opts: &Options,
    credentials: &Credentials,
) -> Result<Response> {
    let base = validate_url(&config.download_url)?;
    let platform = opts.platform();

    let title = match (opts.is_latest(), platform) {
        (false, Some(platform)) => {
            return Err(GpkgError::InvalidArgs(format!(
                "cannot download a specific version for platform {platform:?}, download it manually"
            )));
        }
        (false, None) => Some(opts.version.clone()),
        (true, Some(platform)) => Some(format!("-{platform}")),
        (true, None) => None,
    };

    let mut source = resources_url(&base, component.downloads.resources, title.as_deref())?;
    debug!("Source url: {}", source);
    let mut response = send(client.get(source.clone()), source.as_str())?;

    if response.status() == StatusCode::NOT_FOUND && platform.is_some() {
        source = resources_url(&base, component.downloads.resources, None)?;
        debug!("Platform download failed, retrying {}", source);
        response = send(client.get(source.clone()), source.as_str())?;
    }

    if matches!(
        response.status(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
        let Some(username) = credentials.username.as_deref() else {
            return Ok(response);
        };
        let auth = DownloadAuth {
            username,
            password: &credentials.password,
        };
        debug!("Authentication required, retrying {} as {}", source, username);
        response = send(client.post(source.clone()).json(&auth), source.as_str())?;

        if response.status() == StatusCode::NOT_FOUND && platform.is_some() {
            source = resources_url(&base, component.downloads.resources, None)?;
            debug!("Platform download failed, retrying {}", source);
            response = send(client.post(source.clone()).json(&auth), source.as_str())?;
        }
    }
    Ok(response)
}

fn nexus_url(
    config: &Config,
    component: &ComponentDescriptor,
    opts: &Options,
) -> Result<Url> {
    let mut url = validate_url(&config.nexus_url)?;
    let classifier = match opts.platform() {
        Some(platform) => format!("{platform}-{NEXUS_CLASSIFIER}"),
        None => NEXUS_CLASSIFIER.to_string(),
    };
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("maven.groupId", NEXUS_GROUP_ID)
            .append_pair("maven.extension", "tar.gz")
            .append_pair("sort", "version")
            .append_pair("repository", opts.repository.as_str())
            .append_pair("maven.artifactId", component.downloads.nexus)
            .append_pair("maven.classifier", &classifier);
        if !opts.is_latest() {
            query.append_pair("maven.baseVersion", &opts.version);
        }
    }
    Ok(url)
}

fn fetch_nexus(
    client: &Client,
    config: &Config,
    component: &ComponentDescriptor,
    opts: &Options,
    credentials: &Credentials,
) -> Result<Response> {
    let source = nexus_url(config, component, opts)?;
    debug!("Nexus url: {}", source);
    let mut request = client.get(source.clone());
    if let Some(username) = credentials.username.as_deref() {
        request = request.basic_auth(username, Some(&credentials.password));
    }
    send(request, source.as_str())
}

fn send(request: RequestBuilder, source: &str) -> Result<Response> {
    request.send().map_err(|e| {
        debug!("HTTP request failed for {source}: {e}");
        GpkgError::Network(format!("request to {source} failed: {e}"))
    })
}

fn into_archive(response: Response) -> Result<RemoteArchive> {
    let filename = filename_from_response(response.headers(), response.url())?;
    Ok(RemoteArchive {
        filename,
        content_length: response.content_length(),
        url: response.url().clone(),
        response,
    })
}

/// The archive filename from the `Content-Disposition` header, or failing
/// that the last segment of the (final) request URL.
pub fn filename_from_response(headers: &HeaderMap, url: &Url) -> Result<String> {
    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename);
    let from_url = || {
        url.path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    from_header.or_else(from_url).ok_or_else(|| {
        GpkgError::InvalidArgs(format!("cannot determine a filename for {url}"))
    })
}

fn disposition_filename(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))
        .map(|name| name.trim_matches('"'))
        // never let a server pick a directory for us
        .map(|name| name.rsplit('/').next().unwrap_or(name).to_string())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
}

/// Streams the archive body to `path`, showing progress, and returns the
/// number of bytes written.
pub fn download_to(archive: RemoteArchive, path: &Path) -> Result<u64> {
    let pb = match archive.content_length {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::with_template(
            "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(archive.filename.clone());

    let started = Instant::now();
    let mut out = BufWriter::new(File::create(path)?);
    let mut body = pb.wrap_read(archive.response);
    let written = io::copy(&mut body, &mut out)?;
    out.flush()?;
    pb.finish_and_clear();

    let elapsed = started.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        written as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    let shown = Duration::from_millis(elapsed.as_millis() as u64);
    println!(
        "downloaded {} bytes in {} ({:.0} bytes/sec)",
        written,
        humantime::format_duration(shown),
        rate
    );
    Ok(written)
}
