// ============================================================================
// Axum Extractors
// ============================================================================
//
// - RequestClient: the connection-level client context a token is bound to
//
// ============================================================================

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::context::AppContext;
use crate::token::ClientContext;
use crate::utils::extract_client_ip;

/// Address plus User-Agent of the caller.
///
/// The address comes from the socket, or from forwarding headers when
/// `TRUST_PROXY_HEADERS` is on. A missing User-Agent is an empty identity,
/// which still has to match between issuance and redemption.
#[derive(Debug, Clone)]
pub struct RequestClient(pub ClientContext);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for RequestClient {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let direct_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let address = extract_client_ip(
            &parts.headers,
            direct_ip,
            state.config.security.trust_proxy_headers,
        );

        let identity = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(RequestClient(ClientContext::new(address, identity)))
    }
}
