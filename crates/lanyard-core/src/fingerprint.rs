//! Device fingerprinting for token binding.
//!
//! Tokens stored by this crate are bound to a low-entropy fingerprint of the
//! environment that stored them. A token read back in an environment that
//! hashes differently is treated as a theft signal and discarded.
//!
//! The fingerprint is a similarity hash, not a security boundary: two
//! devices with the same platform, locale, display geometry, timezone, and
//! core count collide. It narrows device identity, it does not prove it.

use serde::{Deserialize, Serialize};

/// Delimiter between fingerprint attributes.
const ATTRIBUTE_DELIMITER: &str = "|";

/// Environment attributes that feed the fingerprint hash.
///
/// Every field degrades to `0`/empty when the ambient environment cannot
/// provide it; capturing never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEnv {
    /// Agent string identifying the embedding application or platform.
    pub user_agent: String,
    /// Preferred display language.
    pub language: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
    /// IANA timezone name.
    pub timezone: String,
    /// Logical core count.
    pub hardware_concurrency: usize,
}

impl DeviceEnv {
    /// Capture the ambient process environment.
    ///
    /// Display geometry and color depth are not observable from a headless
    /// process and fall back to 0. Embedders that know their display should
    /// construct a `DeviceEnv` directly instead.
    pub fn detect() -> Self {
        Self {
            user_agent: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            language: std::env::var("LANG")
                .or_else(|_| std::env::var("LC_ALL"))
                .unwrap_or_default(),
            screen_width: 0,
            screen_height: 0,
            color_depth: 0,
            timezone: std::env::var("TZ").unwrap_or_default(),
            hardware_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(0),
        }
    }

    /// Derive the fingerprint string for this environment.
    ///
    /// Deterministic: identical attributes always produce the identical
    /// string.
    pub fn fingerprint(&self) -> String {
        let joined = [
            self.user_agent.clone(),
            self.language.clone(),
            format!("{}x{}", self.screen_width, self.screen_height),
            self.color_depth.to_string(),
            self.timezone.clone(),
            self.hardware_concurrency.to_string(),
        ]
        .join(ATTRIBUTE_DELIMITER);

        to_base36(hash_32(&joined))
    }
}

/// Fingerprint of the ambient environment.
pub fn fingerprint() -> String {
    DeviceEnv::detect().fingerprint()
}

/// 32-bit rolling polynomial hash over the string's UTF-16 code units,
/// wrapped to signed 32-bit at every step.
fn hash_32(s: &str) -> i32 {
    let mut hash: i32 = 0;
    for unit in s.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    hash
}

/// Render a signed 32-bit value in lowercase base 36, `-` prefix for
/// negative values.
fn to_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut magnitude = (value as i64).unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        digits.push(DIGITS[(magnitude % 36) as usize] as char);
        magnitude /= 36;
    }

    let mut out = String::new();
    if value < 0 {
        out.push('-');
    }
    out.extend(digits.iter().rev());
    out
}
