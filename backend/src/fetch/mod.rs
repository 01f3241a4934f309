//! Acquisition of the published auction archive.
//!
//! ```text
//! index page ──▶ href scan ──▶ aste_corrente*.zip ──▶ download_dir/
//!                                                        │
//!                                   ZipUnpacker ◀────────┘
//!                                        │
//!                                        ▼
//!                          extract_dir/<first .xls/.xlsx>
//! ```
//!
//! Both steps sit behind small traits so the CLI can swap the HTTP source
//! for a local file.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

use crate::config::FetchOptions;
use crate::error::{FetchError, FetchResult};
use crate::logs::{log_info, log_info_indent, log_success, log_warning_indent};
use crate::output::file_token;

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("valid href regex"));

// =============================================================================
// Traits
// =============================================================================

/// Produces a local archive path.
pub trait Fetcher {
    fn fetch(&self) -> impl Future<Output = FetchResult<PathBuf>> + Send;
}

/// Turns an archive into the path of the spreadsheet it carries.
pub trait Unpacker {
    fn unpack(&self, archive: &Path) -> FetchResult<PathBuf>;
}

// =============================================================================
// Link extraction
// =============================================================================

/// Pick the archive link on an index page: the first href matching
/// `pattern`, else the first `.zip` href.
pub fn find_archive_link(html: &str, pattern: &Regex) -> Option<String> {
    let zips: Vec<&str> = HREF
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|href| is_zip_link(href))
        .collect();

    zips.iter()
        .find(|href| pattern.is_match(href))
        .or_else(|| zips.first())
        .map(|href| href.to_string())
}

fn is_zip_link(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.to_ascii_lowercase().ends_with(".zip")
}

/// Local file name for a downloaded archive URL.
fn archive_file_name(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(file_token)
        .unwrap_or_else(|| "auctions.zip".to_string())
}

// =============================================================================
// HTTP fetcher
// =============================================================================

/// Downloads the index page, follows the archive link and stores the zip in
/// `download_dir`. Each request is retried with a fixed delay.
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
    pattern: Regex,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let pattern = Regex::new(&options.archive_pattern)?;
        Ok(Self {
            client,
            options,
            pattern,
        })
    }

    async fn get_with_retries(&self, url: &str) -> FetchResult<Vec<u8>> {
        let attempts = self.options.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.get(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    log_warning_indent(format!("Attempt {}/{} failed: {}", attempt, attempts, e), 1);
                    last_error = Some(e);

                    if attempt < attempts {
                        log_info_indent(format!("Retrying in {}ms...", self.options.retry_delay_ms), 1);
                        tokio::time::sleep(Duration::from_millis(self.options.retry_delay_ms)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Http(format!("no attempt made for {}", url))))
    }

    async fn get(&self, url: &str) -> FetchResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {} for {}", status, url)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(body.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> FetchResult<PathBuf> {
        let index_url = &self.options.index_url;
        log_info(format!("Fetching auction index {}", index_url));

        let html = self.get_with_retries(index_url).await?;
        let html = String::from_utf8_lossy(&html);

        let href = find_archive_link(&html, &self.pattern)
            .ok_or_else(|| FetchError::NoArchiveLink(index_url.clone()))?;
        let base = reqwest::Url::parse(index_url).map_err(|e| FetchError::Http(e.to_string()))?;
        let url = base.join(&href).map_err(|e| FetchError::Http(e.to_string()))?;
        log_info_indent(format!("Archive link: {}", url), 1);

        let bytes = self.get_with_retries(url.as_str()).await?;

        tokio::fs::create_dir_all(&self.options.download_dir).await?;
        let path = self.options.download_dir.join(archive_file_name(&url));
        tokio::fs::write(&path, &bytes).await?;

        log_success(format!("Downloaded {} ({} bytes)", path.display(), bytes.len()));
        Ok(path)
    }
}

/// Archive already on disk.
pub struct LocalFetcher {
    path: PathBuf,
}

impl LocalFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Fetcher for LocalFetcher {
    async fn fetch(&self) -> FetchResult<PathBuf> {
        if self.path.is_file() {
            Ok(self.path.clone())
        } else {
            Err(FetchError::NotFound(self.path.clone()))
        }
    }
}

// =============================================================================
// Unpacker
// =============================================================================

/// Extracts every entry into `dest` and returns the first spreadsheet in
/// archive order. Entries with unsafe paths are skipped.
pub struct ZipUnpacker {
    dest: PathBuf,
}

impl ZipUnpacker {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "xls" | "xlsx"))
        .unwrap_or(false)
}

impl Unpacker for ZipUnpacker {
    fn unpack(&self, archive: &Path) -> FetchResult<PathBuf> {
        if !archive.is_file() {
            return Err(FetchError::NotFound(archive.to_path_buf()));
        }
        log_info(format!("Unpacking {}", archive.display()));

        let mut zip = ZipArchive::new(fs::File::open(archive)?)?;
        fs::create_dir_all(&self.dest)?;

        let mut spreadsheet = None;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let relative = match entry.enclosed_name() {
                Some(p) => p.to_path_buf(),
                None => {
                    log_warning_indent(format!("Skipping unsafe entry {}", entry.name()), 1);
                    continue;
                }
            };
            let target = self.dest.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&target)?;
            io::copy(&mut entry, &mut out)?;

            if spreadsheet.is_none() && is_spreadsheet(&target) {
                spreadsheet = Some(target);
            }
        }

        let path = spreadsheet.ok_or_else(|| FetchError::NoSpreadsheet(archive.to_path_buf()))?;
        log_success(format!("Spreadsheet: {}", path.display()));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::archive::archive_bytes;

    fn pattern() -> Regex {
        Regex::new(&FetchOptions::default().archive_pattern).unwrap()
    }

    #[test]
    fn test_prefers_current_archive() {
        let html = r#"
            <a href="/docs/storico_2024.zip">old</a>
            <a HREF='/media/aste_corrente_2025.zip?v=3'>current</a>
            <a href="/page.html">page</a>
        "#;
        assert_eq!(
            find_archive_link(html, &pattern()).as_deref(),
            Some("/media/aste_corrente_2025.zip?v=3")
        );
    }

    #[test]
    fn test_falls_back_to_first_zip() {
        let html = r#"<a href="a.pdf">x</a><a href="b.ZIP">y</a><a href="c.zip">z</a>"#;
        assert_eq!(find_archive_link(html, &pattern()).as_deref(), Some("b.ZIP"));
        assert_eq!(find_archive_link("<a href='x.html'>", &pattern()), None);
    }

    #[test]
    fn test_archive_file_name() {
        let url = reqwest::Url::parse("https://example.org/media/aste corrente.zip").unwrap();
        assert_eq!(archive_file_name(&url), "aste_20corrente.zip");
        let bare = reqwest::Url::parse("https://example.org/").unwrap();
        assert_eq!(archive_file_name(&bare), "auctions.zip");
    }

    #[test]
    fn test_unpack_returns_first_spreadsheet() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("aste.zip");
        let bytes = archive_bytes(&[
            ("readme.txt", &b"hello"[..]),
            ("nested/aste.xls", &b"xls"[..]),
            ("other.xlsx", &b"xlsx"[..]),
        ])
        .unwrap();
        fs::write(&archive, bytes).unwrap();

        let out = dir.path().join("extracted");
        let path = ZipUnpacker::new(&out).unpack(&archive).unwrap();
        assert_eq!(path, out.join("nested/aste.xls"));
        assert_eq!(fs::read(&path).unwrap(), b"xls");
        assert!(out.join("readme.txt").exists());
    }

    #[test]
    fn test_unpack_without_spreadsheet() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        fs::write(&archive, archive_bytes(&[("a.txt", &b"a"[..])]).unwrap()).unwrap();
        let err = ZipUnpacker::new(dir.path().join("x")).unpack(&archive).unwrap_err();
        assert!(matches!(err, FetchError::NoSpreadsheet(_)));
    }

    #[test]
    fn test_unpack_missing_archive() {
        let err = ZipUnpacker::new("/tmp").unpack(Path::new("/no/such/file.zip")).unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_local_fetcher() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = LocalFetcher::new(file.path()).fetch().await.unwrap();
        assert_eq!(found, file.path());

        let missing = LocalFetcher::new("/no/such/archive.zip").fetch().await;
        assert!(matches!(missing, Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_invalid_pattern() {
        let options = FetchOptions {
            archive_pattern: "(".into(),
            ..FetchOptions::default()
        };
        assert!(matches!(HttpFetcher::new(options), Err(FetchError::Pattern(_))));
    }
}
