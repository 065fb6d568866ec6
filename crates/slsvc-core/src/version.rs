//! Module version codes.
//!
//! A version code packs (major, minor, release status, release number) into a
//! single `u32`. A module is only loaded when the code it exports equals
//! [`MODULE_VERSION_CODE`] exactly: module and runtime share struct layouts,
//! so there is no compatible-range matching.

/// Release status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReleaseStatus {
    /// `-alpha.N` pre-release.
    Alpha = 0,
    /// `-beta.N` pre-release.
    Beta = 1,
    /// `-rc.N` release candidate.
    Candidate = 2,
    /// Final release.
    Release = 3,
}

impl ReleaseStatus {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Alpha,
            1 => Self::Beta,
            2 => Self::Candidate,
            _ => Self::Release,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Candidate => "rc",
            Self::Release => "",
        }
    }
}

/// Pack a version into a version code.
///
/// Layout: `major << 24 | minor << 16 | status << 12 | number`. Each field
/// is masked to its width, so `number` wraps above 4095.
pub const fn version_code(major: u32, minor: u32, status: ReleaseStatus, number: u32) -> u32 {
    ((major & 0xff) << 24) | ((minor & 0xff) << 16) | ((status as u32) << 12) | (number & 0xfff)
}

/// The version code every module must export to be loadable by this runtime.
pub const MODULE_VERSION_CODE: u32 = {
    let (status, number) = parse_pre(env!("CARGO_PKG_VERSION_PRE").as_bytes());
    version_code(
        parse_decimal(env!("CARGO_PKG_VERSION_MAJOR").as_bytes(), 0),
        parse_decimal(env!("CARGO_PKG_VERSION_MINOR").as_bytes(), 0),
        status,
        number,
    )
};

/// Render a version code for log lines (`1.0`, `1.0-rc.1`, ...).
pub fn describe_version(code: u32) -> String {
    let major = code >> 24;
    let minor = (code >> 16) & 0xff;
    let status = ReleaseStatus::from_bits((code >> 12) & 0xf);
    let number = code & 0xfff;
    match status {
        ReleaseStatus::Release => format!("{major}.{minor}"),
        _ => format!("{major}.{minor}-{}.{number}", status.suffix()),
    }
}

const fn parse_decimal(bytes: &[u8], start: usize) -> u32 {
    let mut value = 0u32;
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

const fn starts_with(bytes: &[u8], prefix: &[u8]) -> bool {
    if bytes.len() < prefix.len() {
        return false;
    }
    let mut i = 0;
    while i < prefix.len() {
        if bytes[i] != prefix[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Parse a semver pre-release tag (`""`, `alpha.N`, `beta.N`, `rc.N`).
const fn parse_pre(pre: &[u8]) -> (ReleaseStatus, u32) {
    if pre.is_empty() {
        (ReleaseStatus::Release, 0)
    } else if starts_with(pre, b"alpha.") {
        (ReleaseStatus::Alpha, parse_decimal(pre, 6))
    } else if starts_with(pre, b"beta.") {
        (ReleaseStatus::Beta, parse_decimal(pre, 5))
    } else if starts_with(pre, b"rc.") {
        (ReleaseStatus::Candidate, parse_decimal(pre, 3))
    } else {
        (ReleaseStatus::Alpha, 0)
    }
}
