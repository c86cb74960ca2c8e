//! Newline-delimited JSON host for the authentication bridge.
//!
//! Each input line is a forwarded request; the transport that spawned us
//! (a browser's native messaging host) is trusted to set `origin`. Each
//! output line is the matching response. Requests are answered
//! concurrently, so output order follows completion, not input.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ghostkey_bridge::{
    serve, AuthBridge, AuthHandler, BridgeConfig, BridgeError, ForwardedRequest, PageResponse,
};
use ghostkey_core::RequestId;

use crate::error::RootResult;

/// Serve requests from `input` until it closes and every accepted request
/// has been answered on `output`.
pub async fn run_stdio_host<R, W>(
    handler: Arc<AuthHandler>,
    config: BridgeConfig,
    input: R,
    mut output: W,
) -> RootResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (bridge, link) = AuthBridge::new(config);
    let server = tokio::spawn(serve(handler, link, bridge.responder()));

    let (out_tx, mut out_rx) = mpsc::channel::<PageResponse>(config.channel_capacity.max(1));
    let mut out_tx = Some(out_tx);
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if out_tx.is_some() => match line? {
                Some(line) => {
                    if let Some(tx) = &out_tx {
                        dispatch(&bridge, tx, line.trim());
                    }
                }
                None => {
                    debug!("bridge input closed");
                    out_tx = None;
                }
            },
            response = out_rx.recv() => match response {
                Some(response) => {
                    let mut text = serde_json::to_string(&response)?;
                    text.push('\n');
                    output.write_all(text.as_bytes()).await?;
                    output.flush().await?;
                }
                None => break,
            },
        }
    }

    drop(bridge);
    if let Err(e) = server.await {
        warn!(error = %e, "bridge host task failed");
    }
    Ok(())
}

fn dispatch(bridge: &AuthBridge, out: &mpsc::Sender<PageResponse>, line: &str) {
    if line.is_empty() {
        return;
    }
    let forwarded = match parse_line(line) {
        Ok(forwarded) => forwarded,
        Err(Some(response)) => {
            let out = out.clone();
            tokio::spawn(async move {
                let _ = out.send(response).await;
            });
            return;
        }
        Err(None) => {
            warn!("unparseable bridge input without request_id dropped");
            return;
        }
    };

    let requester = bridge.requester(forwarded.origin);
    let out = out.clone();
    tokio::spawn(async move {
        let request_id = forwarded.request.request_id.clone();
        let response = match requester.submit(forwarded.request).await {
            Ok(outcome) => outcome.into_response(request_id),
            Err(BridgeError::DuplicateRequest) => {
                // The id still belongs to the in-flight request; answering
                // under it would give that requester two responses.
                warn!(request_id = %request_id, "duplicate in-flight request id dropped");
                return;
            }
            Err(e) => PageResponse::err(request_id, &e),
        };
        let _ = out.send(response).await;
    });
}

/// A malformed line is answered with `INVALID_REQUEST` when it at least
/// names a request id; otherwise there is nobody to answer.
fn parse_line(line: &str) -> Result<ForwardedRequest, Option<PageResponse>> {
    match serde_json::from_str::<ForwardedRequest>(line) {
        Ok(forwarded) => Ok(forwarded),
        Err(e) => {
            let request_id = serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| v.get("request_id")?.as_str().map(RequestId::from));
            Err(request_id.map(|id| {
                PageResponse::err(id, &BridgeError::InvalidRequest(e.to_string()))
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_ok() {
        let line = r#"{"origin":"https://a.example","type":"authenticate","request_id":"r1","challenge":"c","purpose":"login"}"#;
        let forwarded = parse_line(line).unwrap();
        assert_eq!(forwarded.origin, "https://a.example");
        assert_eq!(forwarded.request.request_id.as_str(), "r1");
        assert_eq!(forwarded.request.contract_address, None);
    }

    #[test]
    fn test_parse_line_bad_with_id() {
        let line = r#"{"request_id":"r2","type":"nonsense"}"#;
        let response = parse_line(line).unwrap_err().unwrap();
        assert_eq!(response.request_id.as_str(), "r2");
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "INVALID_REQUEST");
    }

    #[test]
    fn test_parse_line_garbage() {
        assert!(parse_line("not json").unwrap_err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_pending_id_gets_single_response() {
        let (bridge, _link) = AuthBridge::new(BridgeConfig {
            timeout: std::time::Duration::from_millis(50),
            channel_capacity: 8,
        });
        let (tx, mut rx) = mpsc::channel(8);
        let line = r#"{"origin":"https://a.example","type":"authenticate","request_id":"r1","challenge":"c","purpose":"login"}"#;

        dispatch(&bridge, &tx, line);
        while bridge.snapshot().pending == 0 {
            tokio::task::yield_now().await;
        }
        dispatch(&bridge, &tx, line);
        drop(tx);

        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response);
        }
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id.as_str(), "r1");
        assert_eq!(responses[0].error.as_ref().unwrap().code, "TIMEOUT");
        assert_eq!(bridge.snapshot().pending, 0);
    }
}
