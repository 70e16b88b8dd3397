//! Target specification parsing and range expansion.
//!
//! Pure functions only: resolution never opens a connection. A specification
//! is a comma-separated list of `[ssh://][user[:password]@]host[:port]`
//! entries whose host part may carry up to two `[start:end]` ranges.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::domain::config::ConnectionConfig;
use crate::domain::error::ResolutionError;

/// Maximum number of `[a:b]` ranges allowed in one host name.
pub const MAX_RANGES_PER_HOST: usize = 2;

/// Remote access protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ssh,
}

impl Protocol {
    /// Parse a URI scheme or configured protocol name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ssh" => Some(Self::Ssh),
            _ => None,
        }
    }

    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ssh => 22,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => f.write_str("ssh"),
        }
    }
}

/// One concrete, resolved target address with its credentials attached.
#[derive(Clone, PartialEq, Eq)]
pub struct Target {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Target {
    /// Identity used for reporting: the host, plus the port when non-default.
    #[must_use]
    pub fn id(&self) -> String {
        if self.port == self.protocol.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `user@host` when a user is known, otherwise the bare host.
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

// Passwords never appear in debug output or logs.
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Expand a target specification into an ordered, de-duplicated list.
///
/// The limit applies to the expanded count before duplicates are removed and
/// is checked arithmetically, before any host name is built.
///
/// # Errors
///
/// Returns a [`ResolutionError`] when the specification is empty, malformed,
/// names an unsupported protocol, or expands beyond `max_targets`.
pub fn resolve_targets(
    spec: &str,
    connection: &ConnectionConfig,
    max_targets: usize,
) -> Result<Vec<Target>, ResolutionError> {
    let default_protocol = Protocol::parse(&connection.default_protocol).ok_or_else(|| {
        ResolutionError::UnsupportedProtocol {
            entry: spec.to_string(),
            protocol: connection.default_protocol.clone(),
        }
    })?;

    let mut entries = Vec::new();
    let mut count = 0usize;
    for raw in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parsed = parse_entry(raw, default_protocol)?;
        let pattern = HostPattern::parse(raw, &parsed.host)?;
        // Saturates: anything that overflows is over the limit anyway.
        count = pattern
            .count()
            .and_then(|n| count.checked_add(n))
            .unwrap_or(usize::MAX);
        entries.push((parsed, pattern));
    }
    if entries.is_empty() {
        return Err(ResolutionError::Empty);
    }
    if count > max_targets {
        return Err(ResolutionError::TooManyTargets {
            count,
            max: max_targets,
        });
    }

    let mut targets = Vec::with_capacity(count);
    let mut seen = HashSet::new();
    for (parsed, pattern) in entries {
        for host in pattern.expand() {
            let target = Target {
                protocol: parsed.protocol,
                port: parsed
                    .port
                    .or(connection.port)
                    .unwrap_or_else(|| parsed.protocol.default_port()),
                user: parsed.user.clone().or_else(|| connection.default_user.clone()),
                password: parsed.password.clone(),
                host,
            };
            let key = (target.user.clone(), target.host.clone(), target.port);
            if seen.insert(key) {
                targets.push(target);
            }
        }
    }
    Ok(targets)
}

/// One parsed entry before range expansion.
#[derive(Debug, PartialEq, Eq)]
struct Entry {
    protocol: Protocol,
    user: Option<String>,
    password: Option<String>,
    host: String,
    port: Option<u16>,
}

fn malformed(entry: &str, reason: impl Into<String>) -> ResolutionError {
    ResolutionError::Malformed {
        entry: entry.to_string(),
        reason: reason.into(),
    }
}

fn parse_entry(entry: &str, default_protocol: Protocol) -> Result<Entry, ResolutionError> {
    let (protocol, rest) = match entry.split_once("://") {
        Some((scheme, rest)) => {
            let protocol =
                Protocol::parse(scheme).ok_or_else(|| ResolutionError::UnsupportedProtocol {
                    entry: entry.to_string(),
                    protocol: scheme.to_string(),
                })?;
            (protocol, rest)
        }
        None => (default_protocol, entry),
    };

    let (userinfo, hostport) = match rest.rfind('@') {
        Some(idx) => (Some(&rest[..idx]), &rest[idx + 1..]),
        None => (None, rest),
    };
    let (user, password) = match userinfo {
        Some(info) => {
            let (user, password) = match info.split_once(':') {
                Some((u, p)) => (u, Some(p.to_string())),
                None => (info, None),
            };
            if user.is_empty() {
                return Err(malformed(entry, "user name is empty"));
            }
            (Some(user.to_string()), password)
        }
        None => (None, None),
    };

    let (host, port) = split_port(entry, hostport)?;
    if host.is_empty() {
        return Err(malformed(entry, "host name is empty"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(malformed(entry, "host name contains whitespace"));
    }

    Ok(Entry {
        protocol,
        user,
        password,
        host: host.to_string(),
        port,
    })
}

/// Split `host:port`, ignoring colons inside `[a:b]` ranges.
fn split_port<'a>(entry: &str, hostport: &'a str) -> Result<(&'a str, Option<u16>), ResolutionError> {
    let mut depth = 0usize;
    let mut split_at = None;
    for (idx, ch) in hostport.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => split_at = Some(idx),
            _ => {}
        }
    }
    match split_at {
        Some(idx) => {
            let port_str = &hostport[idx + 1..];
            let port = port_str
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| malformed(entry, format!("invalid port '{port_str}'")))?;
            Ok((&hostport[..idx], Some(port)))
        }
        None => Ok((hostport, None)),
    }
}

/// A single `[start:end]` range inside a host name.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostRange {
    Numeric { start: u64, end: u64, width: usize },
    Alpha { start: char, end: char },
}

impl HostRange {
    fn parse(entry: &str, start: &str, end: &str) -> Result<Self, ResolutionError> {
        if let (Ok(s), Ok(e)) = (start.parse::<u64>(), end.parse::<u64>()) {
            if s > e {
                return Err(malformed(entry, format!("range [{start}:{end}] is reversed")));
            }
            let width = if start.len() > 1 && start.starts_with('0') {
                start.len()
            } else {
                0
            };
            return Ok(Self::Numeric {
                start: s,
                end: e,
                width,
            });
        }

        let mut s_chars = start.chars();
        let mut e_chars = end.chars();
        match (s_chars.next(), s_chars.next(), e_chars.next(), e_chars.next()) {
            (Some(s), None, Some(e), None)
                if s.is_ascii_alphabetic()
                    && e.is_ascii_alphabetic()
                    && s.is_ascii_lowercase() == e.is_ascii_lowercase() =>
            {
                if s > e {
                    return Err(malformed(entry, format!("range [{start}:{end}] is reversed")));
                }
                Ok(Self::Alpha { start: s, end: e })
            }
            _ => Err(malformed(
                entry,
                format!("range [{start}:{end}] must be numeric or a single letter on both sides"),
            )),
        }
    }

    /// Number of values, or `None` if it does not fit in `usize`.
    fn len(&self) -> Option<usize> {
        match *self {
            Self::Numeric { start, end, .. } => {
                (end - start).checked_add(1).and_then(|n| usize::try_from(n).ok())
            }
            Self::Alpha { start, end } => usize::try_from(u32::from(end) - u32::from(start) + 1).ok(),
        }
    }

    fn values(&self) -> Vec<String> {
        match *self {
            Self::Numeric { start, end, width } => {
                (start..=end).map(|n| format!("{n:0width$}")).collect()
            }
            Self::Alpha { start, end } => (start..=end).map(|c| c.to_string()).collect(),
        }
    }
}

/// A host name split into literal segments interleaved with ranges:
/// `lit0 r0 lit1 r1 lit2 ...`.
#[derive(Debug)]
struct HostPattern {
    literals: Vec<String>,
    ranges: Vec<HostRange>,
}

impl HostPattern {
    fn parse(entry: &str, host: &str) -> Result<Self, ResolutionError> {
        let mut literals = Vec::new();
        let mut ranges = Vec::new();
        let mut rest = host;
        while let Some(open) = rest.find('[') {
            let close = rest[open..]
                .find(']')
                .map(|i| open + i)
                .ok_or_else(|| malformed(entry, "unterminated '[' in host name"))?;
            let inner = &rest[open + 1..close];
            let (start, end) = inner
                .split_once(':')
                .ok_or_else(|| malformed(entry, format!("range [{inner}] is missing ':'")))?;
            literals.push(rest[..open].to_string());
            ranges.push(HostRange::parse(entry, start, end)?);
            rest = &rest[close + 1..];
        }
        if rest.contains(']') {
            return Err(malformed(entry, "unmatched ']' in host name"));
        }
        literals.push(rest.to_string());

        if ranges.len() > MAX_RANGES_PER_HOST {
            return Err(malformed(
                entry,
                format!("at most {MAX_RANGES_PER_HOST} ranges are allowed per host"),
            ));
        }
        Ok(Self { literals, ranges })
    }

    /// Number of hosts this pattern expands to, or `None` on overflow.
    fn count(&self) -> Option<usize> {
        self.ranges
            .iter()
            .try_fold(1usize, |acc, range| acc.checked_mul(range.len()?))
    }

    /// Expand in cartesian order, first range outermost.
    fn expand(&self) -> Vec<String> {
        let mut hosts = vec![self.literals[0].clone()];
        for (range, literal) in self.ranges.iter().zip(self.literals.iter().skip(1)) {
            let values = range.values();
            hosts = hosts
                .iter()
                .flat_map(|prefix| values.iter().map(move |v| format!("{prefix}{v}{literal}")))
                .collect();
        }
        hosts
    }
}
