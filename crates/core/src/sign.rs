//! HMAC URL signing and verification
//!
//! Signs a full URL (query parameters included) with HMAC-SHA256 and an
//! expiration window, independent of any backend. Parameter names borrow the
//! AWS query-string-auth spelling.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use jiff::Timestamp;
use sha2::Sha256;
use url::Url;

use crate::error::{Error, Result};

const SIGNATURE_QUERY_NAME: &str = "X-Amx-Signature";
const EXPIRATION_QUERY_NAME: &str = "X-Amx-Expiration";
const TIME_QUERY_NAME: &str = "X-Amx-Date";
const TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Longest accepted expiration: 30 days
const MAX_EXPIRATION_SECS: i64 = 86_400 * 30;

type HmacSha256 = Hmac<Sha256>;

/// Sign a URL, returning a new URL carrying date, expiration and signature
/// query parameters.
///
/// The signature is computed over the URL with the date and expiration
/// already appended, then added as the final parameter. Expirations beyond
/// 30 days are rejected.
pub fn presign_url(uri: &str, signing_key: &[u8], expiration_secs: i64) -> Result<String> {
    presign_url_at(uri, signing_key, expiration_secs, Timestamp::now())
}

/// Verify a signed URL. Returns true only when the signature matches and the
/// expiration window is still open; any parse failure is a verification
/// failure, not an error.
pub fn verify_url(uri: &str, signing_key: &[u8]) -> bool {
    verify_url_at(uri, signing_key, Timestamp::now())
}

fn presign_url_at(
    uri: &str,
    signing_key: &[u8],
    expiration_secs: i64,
    now: Timestamp,
) -> Result<String> {
    if expiration_secs > MAX_EXPIRATION_SECS {
        return Err(Error::InvalidInput("expiration time too long".to_string()));
    }
    let url = Url::parse(uri).map_err(|e| Error::InvalidInput(format!("unparseable url: {e}")))?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push((
        TIME_QUERY_NAME.to_string(),
        now.strftime(TIME_FORMAT).to_string(),
    ));
    pairs.push((EXPIRATION_QUERY_NAME.to_string(), expiration_secs.to_string()));

    let unsigned = with_query_pairs(&url, &pairs);
    let signature = sign(unsigned.as_str().as_bytes(), signing_key)?;
    pairs.push((SIGNATURE_QUERY_NAME.to_string(), BASE64.encode(signature)));

    Ok(with_query_pairs(&url, &pairs).to_string())
}

fn verify_url_at(uri: &str, signing_key: &[u8], now: Timestamp) -> bool {
    let Ok(url) = Url::parse(uri) else {
        return false;
    };
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    verify_signature(&url, &pairs, signing_key) && verify_expiration(&pairs, now)
}

fn verify_signature(url: &Url, pairs: &[(String, String)], signing_key: &[u8]) -> bool {
    let Some(encoded) = value_of(pairs, SIGNATURE_QUERY_NAME) else {
        return false;
    };
    let Ok(signature) = BASE64.decode(encoded.as_bytes()) else {
        return false;
    };

    let remaining: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| k != SIGNATURE_QUERY_NAME)
        .cloned()
        .collect();
    let stripped = with_query_pairs(url, &remaining);

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_key) else {
        return false;
    };
    mac.update(stripped.as_str().as_bytes());
    mac.verify_slice(&signature).is_ok()
}

fn verify_expiration(pairs: &[(String, String)], now: Timestamp) -> bool {
    let Some(date) = value_of(pairs, TIME_QUERY_NAME) else {
        return false;
    };
    let Some(expiration) = value_of(pairs, EXPIRATION_QUERY_NAME) else {
        return false;
    };
    let Ok(parsed) = jiff::fmt::strtime::parse(TIME_FORMAT, date) else {
        return false;
    };
    let Ok(datetime) = parsed.to_datetime() else {
        return false;
    };
    let Ok(zoned) = datetime.to_zoned(jiff::tz::TimeZone::UTC) else {
        return false;
    };
    let Ok(secs) = expiration.parse::<i64>() else {
        return false;
    };
    let Ok(expiry) = zoned
        .timestamp()
        .checked_add(jiff::SignedDuration::from_secs(secs))
    else {
        return false;
    };
    expiry > now
}

fn value_of<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Rebuild `url` with exactly `pairs` as its query, in order.
///
/// Both signing and verification canonicalize through this helper so the
/// signed string is reproducible regardless of the caller's original query
/// encoding.
fn with_query_pairs(url: &Url, pairs: &[(String, String)]) -> Url {
    let mut out = url.clone();
    out.set_query(None);
    if !pairs.is_empty() {
        let mut serializer = out.query_pairs_mut();
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
    }
    out
}

fn sign(data: &[u8], signing_key: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|e| Error::InvalidInput(format!("unusable signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
