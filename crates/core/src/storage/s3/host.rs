//! Bucket host naming and URL forms.

use std::net::Ipv4Addr;

/// Whether `bucket` may be used as a DNS subdomain.
///
/// Lowercase letters, digits, dots and hyphens; 3 to 63 characters; starts
/// and ends with a letter or digit; no `..`, `.-` or `-.`; not an IPv4
/// address.
#[must_use]
pub fn is_valid_subdomain_bucket(bucket: &str) -> bool {
    let bytes = bucket.as_bytes();
    if !(3..=63).contains(&bytes.len()) {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }
    if !bytes
        .iter()
        .all(|&b| edge_ok(b) || b == b'.' || b == b'-')
    {
        return false;
    }
    if bucket.contains("..") || bucket.contains(".-") || bucket.contains("-.") {
        return false;
    }
    bucket.parse::<Ipv4Addr>().is_err()
}

/// `https://`, or `//` for an empty protocol.
pub(crate) fn scheme(protocol: &str) -> String {
    if protocol.is_empty() {
        "//".to_string()
    } else {
        format!("{protocol}://")
    }
}

/// `https://s3.amazonaws.com/bucket/key`
pub(crate) fn path_url(protocol: &str, host_name: &str, bucket: &str, key: &str) -> String {
    format!("{}{host_name}/{bucket}/{key}", scheme(protocol))
}

/// `https://bucket.s3.amazonaws.com/key`
pub(crate) fn domain_url(protocol: &str, host_name: &str, bucket: &str, key: &str) -> String {
    format!("{}{bucket}.{host_name}/{key}", scheme(protocol))
}

/// `https://alias/key`
pub(crate) fn alias_url(protocol: &str, alias: &str, key: &str) -> String {
    format!("{}{alias}/{key}", scheme(protocol))
}

/// Public host URL. A host without a scheme gets `protocol`.
pub(crate) fn public_host_url(protocol: &str, host: &str, key: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") || host.starts_with("//") {
        format!("{host}/{key}")
    } else {
        format!("{}{host}/{key}", scheme(protocol))
    }
}
