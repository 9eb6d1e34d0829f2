//! Typed partial model of the Caddy admin config and binding extraction.
//!
//! Only the subset needed to derive hostname → upstream bindings is modelled:
//!
//! ```text
//! apps.http.servers.<name>.routes[]
//!   match[].host[]                      hostnames served by the route
//!   handle[] { handler: "reverse_proxy", upstreams[].dial }
//!   handle[] { handler: "subroute", routes[] }   (recursive)
//! ```
//!
//! Unknown fields are ignored. Absent or wrongly-shaped sections are reported
//! as [`StructureMismatch`] instead of failing the whole document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

use crate::state::Bindings;

/// Handler name of Caddy's reverse proxy module.
const REVERSE_PROXY: &str = "reverse_proxy";

/// Handler name of Caddy's subroute module.
const SUBROUTE: &str = "subroute";

/// A config section that may be absent or of the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section<T> {
    /// Key not present (or `null`).
    Missing,
    /// Present but not decodable as `T`.
    Malformed(String),
    /// Present and decoded.
    Present(T),
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Missing
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Section<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Section::Missing);
        }
        Ok(match serde_json::from_value(value) {
            Ok(section) => Section::Present(section),
            Err(e) => Section::Malformed(e.to_string()),
        })
    }
}

impl<T> Section<T> {
    /// Resolve the section at `path`, turning absence or malformation into a
    /// mismatch.
    fn require(&self, path: &str) -> Result<&T, StructureMismatch> {
        match self {
            Section::Present(section) => Ok(section),
            Section::Missing => Err(StructureMismatch::missing(path)),
            Section::Malformed(reason) => Err(StructureMismatch::malformed(path, reason)),
        }
    }
}

/// Root of the document served by `GET /config/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Caddy app modules.
    #[serde(default)]
    pub apps: Section<Apps>,
}

/// The `apps` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Apps {
    /// The HTTP app.
    #[serde(default)]
    pub http: Section<HttpApp>,
}

/// The `apps.http` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpApp {
    /// Server definitions keyed by server name.
    #[serde(default)]
    pub servers: Section<BTreeMap<String, Section<Server>>>,
}

/// One HTTP server definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    /// Ordered route list.
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// A route: matchers plus handlers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Route {
    /// Matcher sets; any set matching selects the route.
    #[serde(default, rename = "match")]
    pub matchers: Vec<MatcherSet>,
    /// Handler chain.
    #[serde(default)]
    pub handle: Vec<Handler>,
}

/// A matcher set. Only host matching is consumed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatcherSet {
    /// Host matcher values.
    #[serde(default)]
    pub host: Vec<String>,
}

/// A handler module entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Handler {
    /// Module name, e.g. `reverse_proxy` or `subroute`.
    #[serde(default)]
    pub handler: String,
    /// Upstreams of a `reverse_proxy` handler.
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    /// Nested routes of a `subroute` handler.
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// A reverse proxy upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Upstream {
    /// Dial address, e.g. `10.0.0.5:8080`.
    #[serde(default)]
    pub dial: String,
}

/// Why a section of the document was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    /// The key is absent.
    Missing,
    /// The value has the wrong shape.
    Malformed(String),
}

/// An expected section of the admin config that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureMismatch {
    /// Dotted path of the section.
    pub path: String,
    /// What was wrong with it.
    pub kind: MismatchKind,
}

impl StructureMismatch {
    fn missing(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: MismatchKind::Missing,
        }
    }

    fn malformed(path: &str, reason: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: MismatchKind::Malformed(reason.to_string()),
        }
    }
}

impl fmt::Display for StructureMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MismatchKind::Missing => write!(f, "`{}` is missing", self.path),
            MismatchKind::Malformed(reason) => write!(f, "`{}` is malformed: {}", self.path, reason),
        }
    }
}

impl std::error::Error for StructureMismatch {}

/// Result of walking an admin config document.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Bindings found, keyed by trailing-dot hostname.
    pub bindings: Bindings,
    /// Sections that were skipped.
    pub mismatches: Vec<StructureMismatch>,
}

/// Decode a raw admin API body.
///
/// A `null` body (Caddy running without config) decodes to an empty
/// [`AdminConfig`].
pub fn decode(body: &[u8]) -> Result<AdminConfig, serde_json::Error> {
    let config: Option<AdminConfig> = serde_json::from_slice(body)?;
    Ok(config.unwrap_or_default())
}

/// Extract hostname → upstream bindings from the document.
pub fn extract_bindings(config: &AdminConfig) -> Extraction {
    let mut extraction = Extraction::default();

    let servers = match config
        .apps
        .require("apps")
        .and_then(|apps| apps.http.require("apps.http"))
        .and_then(|http| http.servers.require("apps.http.servers"))
    {
        Ok(servers) => servers,
        Err(mismatch) => {
            debug!(%mismatch, "no server section in admin config");
            extraction.mismatches.push(mismatch);
            return extraction;
        }
    };

    for (name, server) in servers {
        let path = format!("apps.http.servers.{}", name);
        match server.require(&path) {
            Ok(server) => {
                trace!(server = %name, routes = server.routes.len(), "walking server routes");
                walk_routes(&server.routes, &[], &mut extraction.bindings);
            }
            Err(mismatch) => {
                debug!(%mismatch, "skipping server");
                extraction.mismatches.push(mismatch);
            }
        }
    }

    extraction
}

/// Collect bindings from `routes`. Routes without a host matcher inherit
/// `parent_hosts`.
fn walk_routes(routes: &[Route], parent_hosts: &[String], bindings: &mut Bindings) {
    for route in routes {
        let own_hosts: Vec<String> = route
            .matchers
            .iter()
            .flat_map(|set| set.host.iter().cloned())
            .collect();
        let hosts = if own_hosts.is_empty() {
            parent_hosts
        } else {
            own_hosts.as_slice()
        };

        for handler in &route.handle {
            match handler.handler.as_str() {
                REVERSE_PROXY => {
                    let Some(address) = handler
                        .upstreams
                        .iter()
                        .find_map(|upstream| dial_host(&upstream.dial))
                    else {
                        continue;
                    };
                    for host in hosts {
                        bind(bindings, host, address);
                    }
                }
                SUBROUTE => walk_routes(&handler.routes, hosts, bindings),
                _ => {}
            }
        }
    }
}

fn bind(bindings: &mut Bindings, host: &str, address: &str) {
    if host.is_empty() || host.contains('*') || host.contains('{') {
        trace!(host, "skipping non-literal host matcher");
        return;
    }
    let name = fqdn(host);
    if bindings.contains_key(&name) {
        return;
    }
    trace!(name = %name, address, "found binding");
    bindings.insert(name, address.to_string());
}

/// Hostname in trailing-dot form.
pub fn fqdn(host: &str) -> String {
    if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{}.", host)
    }
}

/// Host part of a Caddy dial address: `10.0.0.5:80` → `10.0.0.5`,
/// `[fd00::1]:80` → `fd00::1`, bare host kept as-is.
///
/// Returns `None` for empty dials and non-network (`unix/`) dials.
pub fn dial_host(dial: &str) -> Option<&str> {
    let dial = dial.trim();
    let dial = dial
        .strip_prefix("tcp/")
        .or_else(|| dial.strip_prefix("udp/"))
        .unwrap_or(dial);
    if dial.is_empty() || dial.contains('/') {
        return None;
    }

    if let Some(rest) = dial.strip_prefix('[') {
        return rest.split_once(']').map(|(host, _)| host);
    }

    let host = match dial.rsplit_once(':') {
        // More than one colon and no brackets: a bare IPv6 address.
        Some((host, _)) if host.contains(':') => dial,
        Some((host, _)) => host,
        None => dial,
    };
    (!host.is_empty()).then_some(host)
}
