//! Deterministic instance naming.
//!
//! A service scaled to N replicas gets container names `{service}_1` through
//! `{service}_N`; a service with scale 1 keeps its bare name. The mapping is
//! reversible so the inventory reporter can group containers back into
//! services by stripping a trailing `_N` suffix.
//!
//! Grouping is ambiguous when a service name itself ends in `_<digits>`
//! (e.g. a service literally named `web_2`) — a known limitation.

/// Container name for one replica of a service.
///
/// `index` is zero-based; the rendered suffix is one-based.
pub fn instance_id(service: &str, index: u32, scale: u32) -> String {
    if scale > 1 {
        format!("{}_{}", service, index + 1)
    } else {
        service.to_string()
    }
}

/// All expected container names for a service at the given scale.
pub fn instance_ids(service: &str, scale: u32) -> Vec<String> {
    (0..scale).map(|i| instance_id(service, i, scale)).collect()
}

/// Recover the owning service name from a container name.
///
/// Strips a trailing `_<digits>` suffix if present; otherwise the container
/// name is the service name (scale-1 case).
pub fn service_of(container_name: &str) -> &str {
    match container_name.rsplit_once('_') {
        Some((prefix, suffix))
            if !prefix.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            prefix
        }
        _ => container_name,
    }
}
