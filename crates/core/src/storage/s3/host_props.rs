//! Property-based tests for bucket host naming.
//!
//! - Lowercase DNS-shaped names use the subdomain URL
//! - Names with uppercase letters, underscores or IPv4 shape use the path URL

use proptest::prelude::*;

use super::host::{domain_url, path_url};
use super::is_valid_subdomain_bucket;

fn dns_bucket() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]".prop_filter("dns-shaped", |name| {
        !name.contains("..") && !name.contains(".-") && !name.contains("-.")
    })
}

fn url_for(bucket: &str) -> String {
    if is_valid_subdomain_bucket(bucket) {
        domain_url("https", "s3.amazonaws.com", bucket, "k")
    } else {
        path_url("https", "s3.amazonaws.com", bucket, "k")
    }
}

proptest! {
    #[test]
    fn prop_dns_shaped_buckets_use_subdomain(bucket in dns_bucket()) {
        prop_assume!(bucket.parse::<std::net::Ipv4Addr>().is_err());
        prop_assert_eq!(url_for(&bucket), format!("https://{bucket}.s3.amazonaws.com/k"));
    }

    #[test]
    fn prop_uppercase_buckets_use_path(
        head in "[a-z]{1,10}",
        upper in "[A-Z]",
        tail in "[a-z]{1,10}",
    ) {
        let bucket = format!("{head}{upper}{tail}");
        prop_assert_eq!(url_for(&bucket), format!("https://s3.amazonaws.com/{bucket}/k"));
    }

    #[test]
    fn prop_underscored_buckets_use_path(head in "[a-z]{1,10}", tail in "[a-z]{1,10}") {
        let bucket = format!("{head}_{tail}");
        prop_assert!(!is_valid_subdomain_bucket(&bucket));
    }

    #[test]
    fn prop_ipv4_buckets_use_path(a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255) {
        let bucket = format!("{a}.{b}.{c}.{d}");
        prop_assert!(!is_valid_subdomain_bucket(&bucket));
    }
}
