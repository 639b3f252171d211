use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use url::Url;

use crate::error::TagSyncError;
use crate::tags::TagId;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub const CURL: &str = "curl";

#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    pub data: Vec<CatalogTag>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogTag {
    pub id: TagId,
    pub attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
pub struct TagAttributes {
    pub name: HashMap<String, String>,
    pub group: String,
}

impl CatalogTag {
    pub fn english_name(&self) -> Option<&str> {
        self.attributes.name.get("en").map(String::as_str)
    }
}

pub fn parse_catalog(body: &[u8]) -> Result<CatalogResponse> {
    serde_json::from_slice(body).context("tag catalog response is not valid JSON")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpClient {
    /// External `curl` resolved on PATH.
    Curl,
    /// In-process client, needs no external command.
    Reqwest,
}

impl FromStr for HttpClient {
    type Err = TagSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "curl" => Ok(HttpClient::Curl),
            "reqwest" => Ok(HttpClient::Reqwest),
            other => Err(TagSyncError::InvalidConfig(format!(
                "unknown http client {:?}, expected curl or reqwest",
                other
            ))),
        }
    }
}

/// Looks `command` up in every directory of a PATH-style list.
pub fn resolve_command(command: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir, command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidates(dir: &Path, command: &str) -> Vec<PathBuf> {
    let extensions = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    std::iter::once(dir.join(command))
        .chain(
            extensions
                .split(';')
                .filter(|ext| !ext.is_empty())
                .map(|ext| dir.join(format!("{}{}", command, ext))),
        )
        .collect()
}

#[cfg(not(windows))]
fn candidates(dir: &Path, command: &str) -> Vec<PathBuf> {
    vec![dir.join(command)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match path.metadata() {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub enum Fetcher {
    Curl(PathBuf),
    Reqwest(Client),
}

impl Fetcher {
    /// Fails fast when the configured client cannot run. Nothing touches
    /// the network or the filter file before this succeeds. `path_var` is
    /// the PATH-style list `curl` is looked up in.
    pub fn prepare(client: HttpClient, path_var: Option<&OsStr>) -> Result<Self> {
        match client {
            HttpClient::Curl => {
                let path = resolve_command(CURL, path_var)
                    .ok_or_else(|| TagSyncError::CommandMissing(CURL.to_string()))?;
                debug!("using {} at {}", CURL, path.display());
                Ok(Fetcher::Curl(path))
            }
            HttpClient::Reqwest => {
                let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
                Ok(Fetcher::Reqwest(client))
            }
        }
    }

    pub async fn fetch(&self, url: &Url) -> Result<CatalogResponse> {
        debug!("requesting {}", url);
        let body = match self {
            Fetcher::Curl(executable) => fetch_with_curl(executable, url).await?,
            Fetcher::Reqwest(client) => fetch_with_reqwest(client, url).await?,
        };
        parse_catalog(&body)
    }
}

async fn fetch_with_curl(executable: &Path, url: &Url) -> Result<Vec<u8>> {
    let output = Command::new(executable)
        .arg("-sL")
        .arg(url.as_str())
        .output()
        .await
        .with_context(|| format!("failed to run {}", executable.display()))?;

    if !output.status.success() {
        return Err(TagSyncError::CommandFailed {
            command: CURL.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    Ok(output.stdout)
}

async fn fetch_with_reqwest(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TagSyncError::HttpStatus {
            url: url.to_string(),
            status,
        }
        .into());
    }

    let body = response
        .bytes()
        .await?;

    Ok(body.to_vec())
}
