//! Direct object fetches over `file://`, `http://`, `https://`, bypassing a
//! full repository pull. Used by [`crate::metaprefetch`] to retrieve a
//! single `metadata` file object.

use std::time::Duration;

use once_cell::sync::OnceCell;
use url::Url;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("depotcore/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// The object types fetchable via [`fetch_remote_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// A commit object.
    Commit,
    /// A dirtree (directory listing) object.
    Dirtree,
    /// A compressed regular file object.
    Filez,
}

impl ObjectType {
    fn extension(self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Dirtree => "dirtree",
            ObjectType::Filez => "filez",
        }
    }
}

/// Lazily-constructed HTTP client, shared across fetches from one process.
///
/// Configured with the system CA store, a 60s connect/idle timeout, a
/// fixed user-agent, and an optional proxy read from `http_proxy`. An
/// invalid proxy URI is logged as a warning, not fatal.
fn http_client() -> &'static reqwest::blocking::Client {
    static CLIENT: OnceCell<reqwest::blocking::Client> = OnceCell::new();
    CLIENT.get_or_init(|| {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_TIMEOUT);

        if let Ok(proxy_uri) = std::env::var("http_proxy") {
            if !proxy_uri.is_empty() {
                match reqwest::Proxy::http(&proxy_uri) {
                    Ok(proxy) => builder = builder.proxy(proxy),
                    Err(e) => tracing::warn!("invalid http_proxy {proxy_uri:?}: {e}"),
                }
            }
        }

        builder.build().unwrap_or_else(|e| {
            tracing::warn!("failed to build configured HTTP client, falling back to defaults: {e}");
            reqwest::blocking::Client::new()
        })
    })
}

fn http_debug_enabled() -> bool {
    std::env::var_os("OSTREE_DEBUG_HTTP").is_some()
}

/// Fetch the bytes named by `uri`.
///
/// - `file://...`: read directly from the local filesystem.
/// - `http://...` / `https://...`: perform a GET.
/// - any other scheme: [`Error::Unsupported`].
pub fn load_uri(uri: &str) -> Result<Vec<u8>> {
    let ctx = || format!("Loading {uri}");
    let parsed = Url::parse(uri).map_err(|e| Error::io(ctx(), e.into()))?;
    match parsed.scheme() {
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| Error::io(ctx(), anyhow::anyhow!("invalid file:// URI")))?;
            std::fs::read(&path).map_err(|e| Error::io(ctx(), e.into()))
        }
        "http" | "https" => {
            if http_debug_enabled() {
                tracing::debug!("GET {uri}");
            }
            let resp = http_client().get(parsed).send().map_err(|e| Error::io(ctx(), e.into()))?;
            let status = resp.status();
            if status.as_u16() == 404 || status.as_u16() == 410 {
                return Err(Error::not_found(ctx(), format!("HTTP {status}")));
            }
            if !status.is_success() {
                return Err(Error::io(
                    ctx(),
                    anyhow::anyhow!("HTTP {status}: {}", status.canonical_reason().unwrap_or("")),
                ));
            }
            let bytes = resp.bytes().map_err(|e| Error::io(ctx(), e.into()))?;
            if http_debug_enabled() {
                tracing::debug!("received {} bytes", bytes.len());
            }
            Ok(bytes.to_vec())
        }
        other => Err(Error::Unsupported {
            context: ctx(),
            scheme: other.to_string(),
        }),
    }
}

/// Build the object URL `{remote-base-url}/objects/{checksum[0:2]}/{checksum[2:]}.{type}`
/// and fetch it.
pub fn fetch_remote_object(remote_base_url: &str, checksum: &str, ty: ObjectType) -> Result<Vec<u8>> {
    let type_ext = ty.extension();
    if checksum.len() < 3 {
        return Err(Error::parse(
            format!("Fetching {checksum}.{type_ext} from {remote_base_url}"),
            "checksum too short",
        ));
    }
    let (prefix, rest) = checksum.split_at(2);
    let base = remote_base_url.trim_end_matches('/');
    let uri = format!("{base}/objects/{prefix}/{rest}.{type_ext}");
    load_uri(&uri)
}
