//! Network utilities
//!
//! Resolves the client address used to key rate limiting. Forwarded headers
//! are only believed when the direct peer is a configured trusted proxy.

use crate::error::{ApiError, ServerError};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Peers allowed to report the original client address.
#[derive(Debug, Clone, Default)]
pub enum TrustedProxies {
    /// Only the direct connection address is used
    #[default]
    None,
    /// Any peer may forward (development only)
    All,
    List(Vec<IpNet>),
}

impl TrustedProxies {
    /// Parse `["*"]`, exact IPs and CIDR ranges. Unparsable entries are a
    /// startup error rather than silently ignored.
    pub fn from_config(proxies: &[String]) -> Result<Self, ServerError> {
        if proxies.is_empty() {
            return Ok(Self::None);
        }
        if proxies.iter().any(|p| p == "*") {
            return Ok(Self::All);
        }

        let mut networks = Vec::with_capacity(proxies.len());
        for proxy in proxies {
            let network = if proxy.contains('/') {
                proxy.parse::<IpNet>().ok()
            } else {
                proxy.parse::<IpAddr>().ok().map(IpNet::from)
            };
            networks.push(network.ok_or_else(|| ServerError::TrustedProxy(proxy.clone()))?);
        }
        Ok(Self::List(networks))
    }

    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(networks) => networks.iter().any(|network| network.contains(&peer)),
        }
    }
}

/// Determine the client IP for a request.
///
/// Fails when the connection address is missing (the server was not started
/// with connect info) or a trusted proxy sent an unparsable forwarded header.
pub fn client_ip<B>(req: &Request<B>, trusted: &TrustedProxies) -> Result<IpAddr, ApiError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or_else(|| ApiError::ClientAddress("connection address unavailable".into()))?;

    if !trusted.is_trusted(peer) {
        return Ok(peer);
    }

    match forwarded_ip(req.headers()) {
        Some(raw) => raw
            .parse::<IpAddr>()
            .map_err(|_| ApiError::ClientAddress(format!("malformed forwarded address '{raw}'"))),
        None => Ok(peer),
    }
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded_for = headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|hop| hop.trim().to_string());

    forwarded_for.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
    })
}
