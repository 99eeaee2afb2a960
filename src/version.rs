//! Firmware version strings and their ordering.
//!
//! Versions are published as a one-character literal prefix followed by
//! dot-separated unsigned integers, e.g. `v1.4.2`.  The prefix is never
//! inspected.  Missing trailing components count as zero, so `v1.0` and
//! `v1.0.0` are equal.

use core::cmp::Ordering;
use core::fmt;

/// Version of the running firmware, baked in at build time.
pub const CURRENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Compare two prefixed dotted version strings numerically.
///
/// Each component is the value of its leading digit run, so `2-rc`, `2a`
/// and `2beta` all read as 2.  A component with no leading digit reads as 0.
/// Values saturate at `u32::MAX`.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut lhs = components(a);
    let mut rhs = components(b);

    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let ord = l.unwrap_or(0).cmp(&r.unwrap_or(0));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Iterate the numeric components of `s` after skipping its first character.
fn components(s: &str) -> impl Iterator<Item = u32> + '_ {
    let mut chars = s.chars();
    chars.next();
    let body = chars.as_str();
    // An empty body has no components at all; `"".split('.')` would yield one.
    body.split('.')
        .filter(move |_| !body.is_empty())
        .map(parse_component)
}

fn parse_component(part: &str) -> u32 {
    part.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, b| {
            acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
        })
}

// ── Owned, ordered wrapper ────────────────────────────────────

/// A published version, as read from the first line of the version file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion(heapless::String<32>);

impl FirmwareVersion {
    /// Wrap a version string.  Returns `None` if it is blank or longer than
    /// 32 bytes.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut inner = heapless::String::new();
        inner.push_str(trimmed).ok()?;
        Some(Self(inner))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether this version is strictly newer than `running`.
    pub fn is_newer_than(&self, running: &str) -> bool {
        compare(running, &self.0) == Ordering::Less
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
