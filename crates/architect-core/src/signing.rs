//! AWS Signature Version 4 request signing
//!
//! A [`RequestDraft`] is signed exactly once into a [`SignedRequest`]. The
//! signed form exposes no mutators, so the bytes that were signed are the
//! bytes that get sent. [`verify`] recomputes a signature from parts and is
//! how tampering after signing is detected.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

use crate::credentials::SigningIdentity;
use crate::error::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_DATE: &str = "x-amz-date";
pub const HEADER_SECURITY_TOKEN: &str = "x-amz-security-token";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

/// An outbound HTTP request before signing.
///
/// `path` is the wire form (already percent-encoded). `query` holds decoded
/// pairs. Header names are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RequestDraft {
    /// Draft a request for `url` with the given method and body.
    pub fn new(method: &str, url: &Url, body: impl Into<Bytes>) -> GatewayResult<Self> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(GatewayError::Configuration(format!(
                    "endpoint URL has no host: {}",
                    url
                )));
            }
        };
        let path = if url.path().is_empty() {
            "/".to_string()
        } else {
            url.path().to_string()
        };
        Ok(Self {
            method: method.to_ascii_uppercase(),
            scheme: url.scheme().to_string(),
            host,
            path,
            query: url.query_pairs().into_owned().collect(),
            headers: BTreeMap::new(),
            body: body.into(),
        })
    }

    /// Draft a POST request.
    pub fn post(url: &Url, body: impl Into<Bytes>) -> GatewayResult<Self> {
        Self::new("POST", url, body)
    }

    /// Set a header (name is lower-cased, value trimmed).
    pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.as_ref().trim().to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Full request URL as it goes on the wire.
    pub fn url(&self) -> String {
        let mut url = format!("{}://{}{}", self.scheme, self.host, self.path);
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(&self.query));
        }
        url
    }
}

/// A request whose headers and body are covered by a SigV4 signature.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    draft: RequestDraft,
    signature: String,
}

impl SignedRequest {
    pub fn method(&self) -> &str {
        &self.draft.method
    }

    pub fn url(&self) -> String {
        self.draft.url()
    }

    /// All headers, including the authorization set.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.draft.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.draft.header(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.draft.body
    }

    /// Hex signature carried in the authorization header.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Give up the signed form. Anything changed afterwards fails [`verify`].
    pub fn into_parts(self) -> RequestDraft {
        self.draft
    }
}

/// Sign `draft` for `service` in `region` at the current time.
pub fn sign(
    draft: RequestDraft,
    service: &str,
    region: &str,
    identity: &SigningIdentity,
) -> GatewayResult<SignedRequest> {
    sign_at(draft, service, region, identity, Utc::now())
}

/// Sign `draft` at a fixed timestamp. Deterministic for identical inputs.
pub fn sign_at(
    mut draft: RequestDraft,
    service: &str,
    region: &str,
    identity: &SigningIdentity,
    now: DateTime<Utc>,
) -> GatewayResult<SignedRequest> {
    if identity.access_key_id().is_empty() || identity.secret_access_key().is_empty() {
        return Err(GatewayError::Authentication(
            "signing identity is missing its access key or secret".to_string(),
        ));
    }
    if service.is_empty() || region.is_empty() {
        return Err(GatewayError::Authentication(
            "signing requires a service name and region".to_string(),
        ));
    }

    // Stale authorization headers must not leak into the new signature.
    draft.headers.remove(HEADER_AUTHORIZATION);
    draft.headers.remove(HEADER_SECURITY_TOKEN);

    let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
    draft.headers.insert("host".to_string(), draft.host.clone());
    draft.headers.insert(HEADER_DATE.to_string(), amz_date.clone());
    if let Some(token) = identity.session_token() {
        draft
            .headers
            .insert(HEADER_SECURITY_TOKEN.to_string(), token.to_string());
    }

    for (name, value) in &draft.headers {
        if value.chars().any(|c| c.is_control() && c != '\t') || !value.is_ascii() {
            return Err(GatewayError::Authentication(format!(
                "header '{}' has a value that cannot be signed",
                name
            )));
        }
    }

    let signed_headers = signed_header_names(&draft.headers);
    let signature = compute_signature(&draft, &signed_headers, service, region, identity, &amz_date)?;
    let scope = credential_scope(&amz_date[..8], region, service);

    draft.headers.insert(
        HEADER_AUTHORIZATION.to_string(),
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            identity.access_key_id(),
            scope,
            signed_headers.join(";"),
            signature
        ),
    );

    debug!(
        access_key_id = %identity.access_key_id(),
        service,
        region,
        host = %draft.host,
        "Signed outbound request"
    );

    Ok(SignedRequest { draft, signature })
}

/// Recompute the signature of a request that carries SigV4 headers and
/// compare it with the one in its authorization header.
pub fn verify(
    request: &RequestDraft,
    service: &str,
    region: &str,
    identity: &SigningIdentity,
) -> bool {
    let Some(authorization) = request.header(HEADER_AUTHORIZATION) else {
        return false;
    };
    let Some(amz_date) = request.header(HEADER_DATE) else {
        return false;
    };
    if NaiveDateTime::parse_from_str(amz_date, AMZ_DATE_FORMAT).is_err() {
        return false;
    }
    let Some((signed_headers, claimed)) = parse_authorization(authorization) else {
        return false;
    };

    let mut unsigned = request.clone();
    unsigned.headers.remove(HEADER_AUTHORIZATION);
    if signed_headers.iter().any(|h| !unsigned.headers.contains_key(h)) {
        return false;
    }
    // Adding a signed-looking header after the fact is tampering too.
    if signed_header_names(&unsigned.headers) != signed_headers {
        return false;
    }

    match compute_signature(&unsigned, &signed_headers, service, region, identity, amz_date) {
        Ok(expected) => expected == claimed,
        Err(e) => {
            warn!("Signature verification failed to compute: {}", e);
            false
        }
    }
}

/// `AWS4` signing key derivation: date → region → service → `aws4_request`.
pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> GatewayResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Canonical request string for `draft` over `signed_headers`.
pub fn canonical_request(draft: &RequestDraft, signed_headers: &[String]) -> String {
    let canonical_headers: String = signed_headers
        .iter()
        .map(|name| {
            let value = draft.headers.get(name).map(String::as_str).unwrap_or("");
            format!("{}:{}\n", name, normalize_header_value(value))
        })
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        draft.method,
        canonical_uri(&draft.path),
        canonical_query(&draft.query),
        canonical_headers,
        signed_headers.join(";"),
        hex::encode(Sha256::digest(&draft.body))
    )
}

/// Percent-encode per RFC 3986: everything but unreserved characters.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn compute_signature(
    draft: &RequestDraft,
    signed_headers: &[String],
    service: &str,
    region: &str,
    identity: &SigningIdentity,
    amz_date: &str,
) -> GatewayResult<String> {
    if amz_date.len() < 8 {
        return Err(GatewayError::Authentication(format!(
            "malformed signing timestamp '{}'",
            amz_date
        )));
    }
    let date = &amz_date[..8];
    let canonical = canonical_request(draft, signed_headers);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope(date, region, service),
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );
    let key = signing_key(identity.secret_access_key(), date, region, service)?;
    Ok(hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> GatewayResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::Authentication(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, region, service)
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> Vec<String> {
    headers
        .keys()
        .filter(|name| name.as_str() != HEADER_AUTHORIZATION)
        .cloned()
        .collect()
}

// Non-S3 services double-encode: the wire path is already encoded once.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| uri_encode(segment, true))
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_authorization(value: &str) -> Option<(Vec<String>, String)> {
    let rest = value.strip_prefix(ALGORITHM)?.trim();
    let mut signed_headers = None;
    let mut signature = None;
    for field in rest.split(',') {
        let (key, val) = field.trim().split_once('=')?;
        match key {
            "SignedHeaders" => {
                signed_headers = Some(val.split(';').map(str::to_string).collect::<Vec<_>>())
            }
            "Signature" => signature = Some(val.to_string()),
            _ => {}
        }
    }
    Some((signed_headers?, signature?))
}
