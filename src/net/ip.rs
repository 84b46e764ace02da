use std::net::IpAddr;

/// Returns true if `ip` is an IPv4 address.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) count as IPv4.
///
/// ```
/// # use rangekit::net::ip::is_ipv4;
/// assert!(is_ipv4(&"127.0.0.1".parse().unwrap()));
/// assert!(!is_ipv4(&"fe80::1".parse().unwrap()));
/// ```
pub fn is_ipv4(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(_) => true,
        IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some(),
    }
}

/// Returns true if `ip` is an IPv6 address that is not IPv4-mapped.
pub fn is_ipv6(ip: &IpAddr) -> bool {
    !is_ipv4(ip)
}

/// Like [`is_ipv4`], but false for anything that does not parse as an address.
pub fn is_ipv4_str(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok_and(|ip| is_ipv4(&ip))
}

/// Like [`is_ipv6`], but false for anything that does not parse as an address.
pub fn is_ipv6_str(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok_and(|ip| is_ipv6(&ip))
}

/// True when `a` and `b` belong to the same address family.
pub(crate) fn same_family(a: &IpAddr, b: &IpAddr) -> bool {
    is_ipv4(a) == is_ipv4(b)
}
