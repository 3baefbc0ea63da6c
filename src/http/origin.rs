//! Client origin resolution.
//!
//! The service usually sits behind a proxy, so the first `X-Forwarded-For`
//! entry wins over the socket peer. The region hint comes from a configurable
//! header set by the edge.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::models::ClientOrigin;

/// Forwarding header consulted before the socket peer.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Socket peer of the request, when the server was started with connect info.
///
/// Never rejects: routers driven without a socket (tests, `oneshot`) yield
/// `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

/// Resolve the submitting client's address and region.
#[must_use]
pub fn client_origin(headers: &HeaderMap, peer: PeerAddr, region_header: &str) -> ClientOrigin {
    let forwarded = header_str(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_owned);

    ClientOrigin {
        ip: forwarded.or_else(|| peer.0.map(|addr| addr.ip().to_string())),
        region: header_str(headers, region_header)
            .map(str::trim)
            .filter(|region| !region.is_empty())
            .map(str::to_owned),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
