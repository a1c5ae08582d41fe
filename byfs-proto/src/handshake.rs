//! HTTP upgrade handshake and challenge-response token.
//!
//! A session starts as a plain HTTP/1.1 `POST` asking to switch to the
//! `Byfs-Stream` protocol. The server answers `101 Switching Protocols`,
//! optionally with a `Byfs-Auth` challenge, after which the connection
//! carries opcode frames only.

use std::io::{self, BufRead, Read};

use serde::{Deserialize, Serialize};

/// Value of the `Upgrade` header.
pub const PROTOCOL_NAME: &str = "Byfs-Stream";

/// Value of the version header.
pub const PROTOCOL_VERSION: u32 = 1;

/// Header carrying the protocol version in the request.
pub const VERSION_HEADER: &str = "Byfs-Version";

/// Header carrying the auth challenge in the response.
pub const AUTH_HEADER: &str = "Byfs-Auth";

/// Maximum number of response lines before the blank line.
pub const MAX_RESPONSE_LINES: usize = 10;

/// Maximum length of a single response line, terminator included.
pub const MAX_LINE_LEN: usize = 2048;

/// Why an upgrade response was rejected.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// The connection ended before the blank line.
    #[error("connection closed during upgrade response")]
    Truncated,
    /// More than [`MAX_RESPONSE_LINES`] header lines.
    #[error("upgrade response exceeds {MAX_RESPONSE_LINES} lines")]
    TooManyLines,
    /// A line longer than [`MAX_LINE_LEN`].
    #[error("upgrade response line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
    /// The status line is not `101 Switching Protocols`.
    #[error("server did not switch protocols: {0:?}")]
    NotSwitching(String),
    /// A required header line is absent.
    #[error("upgrade response lacks {0:?}")]
    MissingHeader(&'static str),
    /// Reading the response failed (including the connect timeout).
    #[error("reading upgrade response: {0}")]
    Io(#[from] io::Error),
}

/// A validated upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    /// Challenge from the `Byfs-Auth` header, if the server requires auth.
    pub challenge: Option<String>,
}

/// Builds the upgrade request, blank line included.
pub fn upgrade_request(host: &str, port: u16) -> String {
    format!(
        "POST / HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: {PROTOCOL_NAME}\r\n\
         {VERSION_HEADER}: {PROTOCOL_VERSION}\r\n\
         \r\n"
    )
}

/// Reads response lines up to the blank line and validates them.
///
/// Only the head is consumed; bytes after the blank line stay buffered in
/// `r` for the binary protocol.
pub fn read_response<R: BufRead>(r: &mut R) -> Result<Upgrade, HandshakeError> {
    let mut lines = Vec::new();
    loop {
        let mut raw = Vec::new();
        let limit = MAX_LINE_LEN as u64;
        let n = r.by_ref().take(limit).read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Err(HandshakeError::Truncated);
        }
        if raw.last() != Some(&b'\n') {
            return Err(if n == MAX_LINE_LEN {
                HandshakeError::LineTooLong
            } else {
                HandshakeError::Truncated
            });
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        lines.push(line.to_owned());
        if lines.len() > MAX_RESPONSE_LINES {
            return Err(HandshakeError::TooManyLines);
        }
    }
    parse_response(&lines)
}

/// Validates response lines (without terminators, blank line excluded).
pub fn parse_response<S: AsRef<str>>(lines: &[S]) -> Result<Upgrade, HandshakeError> {
    let status: &str = lines
        .first()
        .map(|l| l.as_ref())
        .ok_or(HandshakeError::Truncated)?;
    if !status.contains("101 Switching Protocols") {
        return Err(HandshakeError::NotSwitching(status.to_owned()));
    }

    let headers = &lines[1..];
    let has = |wanted: &str| headers.iter().any(|l| l.as_ref() == wanted);
    if !has("Connection: Upgrade") {
        return Err(HandshakeError::MissingHeader("Connection: Upgrade"));
    }
    if !has(&format!("Upgrade: {PROTOCOL_NAME}")) {
        return Err(HandshakeError::MissingHeader("Upgrade: Byfs-Stream"));
    }

    let challenge = headers.iter().find_map(|l| {
        let (name, value) = l.as_ref().split_once(':')?;
        name.eq_ignore_ascii_case(AUTH_HEADER).then(|| value.trim().to_owned())
    });
    Ok(Upgrade { challenge })
}

/// Digest used for the auth token. Both ends must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum AuthDigest {
    /// MD5 (the usual server default).
    #[default]
    Md5,
    /// SHA-256.
    Sha256,
}

impl AuthDigest {
    /// Length of the hex-encoded digest.
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Hex digest of the concatenated parts.
    pub fn hex_digest(self, parts: &[&str]) -> String {
        match self {
            Self::Md5 => {
                let mut ctx = md5::Context::new();
                for p in parts {
                    ctx.consume(p.as_bytes());
                }
                hex::encode(ctx.compute().0)
            }
            Self::Sha256 => {
                use sha2::Digest;
                let mut h = sha2::Sha256::new();
                for p in parts {
                    h.update(p.as_bytes());
                }
                hex::encode(h.finalize().as_slice())
            }
        }
    }
}

/// Computes `hex(digest(secret + challenge + salt)) + salt`.
pub fn auth_token(digest: AuthDigest, secret: &str, challenge: &str, salt: &str) -> String {
    let mut token = digest.hex_digest(&[secret, challenge, salt]);
    token.push_str(salt);
    token
}

/// Checks a token produced by [`auth_token`]. Used on the serving side.
pub fn verify_token(digest: AuthDigest, secret: &str, challenge: &str, token: &str) -> bool {
    let split = digest.hex_len();
    if token.len() <= split || !token.is_char_boundary(split) {
        return false;
    }
    let (hash, salt) = token.split_at(split);
    digest.hex_digest(&[secret, challenge, salt]) == hash
}

/// Generates a fresh hex nonce for [`auth_token`].
pub fn new_salt() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQ: AtomicU64 = AtomicU64::new(0);

    let mut h = RandomState::new().build_hasher();
    h.write_u64(u64::from(std::process::id()));
    h.write_u64(SEQ.fetch_add(1, Ordering::Relaxed));
    h.write_u128(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
    );
    format!("{:x}", h.finish())
}
