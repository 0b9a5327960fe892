//! HTTP front for the bridge: the interception point where a consumer's
//! pull request is satisfied from a registered stream.
//!
//! `GET /d/{address}` claims the registration, opens the remote ciphertext,
//! and streams the decrypted body. The response carries a content
//! disposition with the registered filename and deliberately no
//! Content-Length: the plaintext length differs from what travels on the
//! wire, and a wrong length header stalls some consumers indefinitely.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{info, warn};

use sealdrop_transfer::{CiphertextSource, FrameCoalescer};

use crate::bridge::BridgeHandle;

pub struct ProxyState<S> {
    pub bridge: BridgeHandle,
    pub source: Arc<S>,
}

impl<S> Clone for ProxyState<S> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
            source: self.source.clone(),
        }
    }
}

pub fn router<S: CiphertextSource + 'static>(state: ProxyState<S>) -> Router {
    Router::new()
        .route("/d/{address}", get(serve_stream::<S>))
        .with_state(state)
}

/// Bind and run the bridge front until the process exits.
pub async fn serve<S: CiphertextSource + 'static>(
    addr: &str,
    state: ProxyState<S>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding proxy listener on {addr}"))?;
    info!(
        "proxy: listening on http://{}/d/{{address}}",
        listener.local_addr()?
    );
    axum::serve(listener, router(state))
        .await
        .context("proxy server")?;
    Ok(())
}

async fn serve_stream<S: CiphertextSource + 'static>(
    State(state): State<ProxyState<S>>,
    Path(address): Path<String>,
) -> Response {
    let reg = match state.bridge.claim(&address).await {
        Ok(Some(reg)) => reg,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(address = %address, error = %err, "bridge claim failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let ciphertext = match state.source.open(&reg.remote).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(object = %reg.remote, error = %err, "remote fetch failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let plaintext = FrameCoalescer::new(ciphertext, reg.key, reg.plain_chunk_size).into_stream();

    let built = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", header_safe(&reg.display_name)),
        )
        .body(Body::from_stream(plaintext));

    match built {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "response build failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Strip anything that cannot ride inside a quoted header value.
fn header_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    if cleaned.is_empty() {
        "download.bin".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_safe_strips_quotes_and_controls() {
        assert_eq!(header_safe("a\"b\\c\nd"), "abcd");
        assert_eq!(header_safe("report final.pdf"), "report final.pdf");
        assert_eq!(header_safe("\n\""), "download.bin");
    }
}
