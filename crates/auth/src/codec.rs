//! Bearer credential decoding.
//!
//! Trust boundary: this module parses the credential's payload but never
//! verifies its signature. The resulting [`ClaimSet`] is only good enough for
//! local decisions (what to show, when to consider the session stale). It is
//! not a security control; the backend verifies the credential on every
//! request and its verdict always wins.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{ClaimSet, Role, SubjectId};

/// Segment of a three-part credential.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Segment {
    Header,
    Payload,
    Signature,
}

impl core::fmt::Display for Segment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Segment::Header => "header",
            Segment::Payload => "payload",
            Segment::Signature => "signature",
        })
    }
}

/// Why a credential could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("expected 3 dot-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("{0} segment is empty")]
    EmptySegment(Segment),

    #[error("{0} segment is not base64url")]
    Encoding(Segment),

    #[error("{segment} segment is not a JSON object: {reason}")]
    Json { segment: Segment, reason: String },

    #[error("missing required claim '{0}'")]
    MissingClaim(&'static str),

    #[error("claim '{claim}' is invalid: {reason}")]
    InvalidClaim { claim: &'static str, reason: String },

    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubjectClaim {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<SubjectClaim>,
    exp: Option<f64>,
    email: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

/// Decode a bearer credential into its claim set.
///
/// - No IO
/// - No signature verification (see module docs)
/// - Requires `sub` and `exp`; `email`, `name` and `role` are optional
pub fn decode(credential: &str) -> Result<ClaimSet, CredentialError> {
    let segments: Vec<&str> = credential.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(CredentialError::SegmentCount(segments.len()));
    };

    // The header is never read; it only has to be well-formed base64url.
    segment_bytes(header, Segment::Header)?;
    let payload = json_object(payload, Segment::Payload)?;

    // Unsigned tokens carry an empty signature; the content is never checked.
    if !signature
        .trim_end_matches('=')
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(CredentialError::Encoding(Segment::Signature));
    }

    let raw: RawClaims = serde_json::from_value(payload).map_err(|e| CredentialError::Json {
        segment: Segment::Payload,
        reason: e.to_string(),
    })?;

    let subject = match raw.sub.ok_or(CredentialError::MissingClaim("sub"))? {
        SubjectClaim::Text(s) if s.is_empty() => {
            return Err(CredentialError::InvalidClaim {
                claim: "sub",
                reason: "empty subject".to_string(),
            });
        }
        SubjectClaim::Text(s) => SubjectId::new(s),
        SubjectClaim::Number(n) => SubjectId::new(n.to_string()),
    };

    let expires_at = expiry_instant(raw.exp.ok_or(CredentialError::MissingClaim("exp"))?)?;

    let role = raw.role.map(|r| r.parse::<Role>()).transpose()?;

    Ok(ClaimSet {
        subject,
        email: raw.email,
        name: raw.name,
        role,
        expires_at,
    })
}

fn segment_bytes(segment: &str, which: Segment) -> Result<Vec<u8>, CredentialError> {
    let segment = segment.trim_end_matches('=');
    if segment.is_empty() {
        return Err(CredentialError::EmptySegment(which));
    }

    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| CredentialError::Encoding(which))
}

fn json_object(segment: &str, which: Segment) -> Result<Value, CredentialError> {
    let bytes = segment_bytes(segment, which)?;

    let value: Value = serde_json::from_slice(&bytes).map_err(|e| CredentialError::Json {
        segment: which,
        reason: e.to_string(),
    })?;

    if !value.is_object() {
        return Err(CredentialError::Json {
            segment: which,
            reason: "not an object".to_string(),
        });
    }

    Ok(value)
}

fn expiry_instant(exp: f64) -> Result<DateTime<Utc>, CredentialError> {
    let invalid = || CredentialError::InvalidClaim {
        claim: "exp",
        reason: format!("{exp} is not a representable timestamp"),
    };

    if !exp.is_finite() {
        return Err(invalid());
    }

    let secs = exp.floor();
    let nanos = ((exp - secs) * 1_000_000_000.0) as u32;
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return Err(invalid());
    }

    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)).ok_or_else(invalid)
}
