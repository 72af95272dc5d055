//! What the filter needs to know about an inbound request

use std::collections::BTreeSet;

use axum::http::{HeaderMap, Method};

pub const ROLES_HEADER: &str = "x-roles";
pub const IDENTITY_STATUS_HEADER: &str = "x-identity-status";
pub const SERVICE_IDENTITY_STATUS_HEADER: &str = "x-service-identity-status";

const CONFIRMED: &str = "Confirmed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub roles: BTreeSet<String>,
    pub is_object_read: bool,
    pub is_head: bool,
}

impl RequestContext {
    pub fn from_parts(method: &Method, path: &str, headers: &HeaderMap) -> Self {
        Self {
            roles: roles_from_headers(headers),
            is_object_read: is_object_read(method, path),
            is_head: method == Method::HEAD,
        }
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> + Clone {
        self.roles.iter().map(String::as_str)
    }
}

/// Roles asserted by the auth layer in front of us.
///
/// They only count when the user identity is confirmed, or when no service
/// identity was presented (or it was confirmed too).
pub fn roles_from_headers(headers: &HeaderMap) -> BTreeSet<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let identity_confirmed = header(IDENTITY_STATUS_HEADER) == Some(CONFIRMED);
    let service_ok = matches!(header(SERVICE_IDENTITY_STATUS_HEADER), None | Some(CONFIRMED));

    if !(identity_confirmed || service_ok) {
        return BTreeSet::new();
    }

    header(ROLES_HEADER)
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop identity headers a client may have set on its own
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in [ROLES_HEADER, IDENTITY_STATUS_HEADER, SERVICE_IDENTITY_STATUS_HEADER] {
        headers.remove(name);
    }
}

/// GET or HEAD of `/<version>/<account>/<container>/<object>`
pub fn is_object_read(method: &Method, path: &str) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }

    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let mut parts = rest.splitn(4, '/');
    let (Some(version), Some(account), Some(container), Some(object)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    valid_api_version(version) && !account.is_empty() && !container.is_empty() && !object.is_empty()
}

fn valid_api_version(version: &str) -> bool {
    matches!(version, "v1" | "v1.0")
}
