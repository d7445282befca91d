// Push-agent connector: plain TCP or TLS, read until the agent closes the connection.

use std::sync::Arc;

use rustls::ClientConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::{AgentSourceConfig, TlsConfig};
use crate::error::FetchErrorKind;
use crate::models::RawFetchResult;

/// Agent output shorter than this is treated as truncated.
const MIN_AGENT_OUTPUT: usize = 16;

pub async fn fetch(config: &AgentSourceConfig, address: &str) -> RawFetchResult {
    let stream = match TcpStream::connect((address, config.port)).await {
        Ok(s) => s,
        Err(e) => {
            return RawFetchResult::failure(
                FetchErrorKind::ConnectionRefused,
                format!("connect to {}:{} failed: {}", address, config.port, e),
            );
        }
    };
    debug!(address, port = config.port, "Connected to agent");

    let read = match &config.tls {
        None => read_all(stream).await,
        Some(tls) => {
            let connector = match tls_connector(tls) {
                Ok(c) => c,
                Err(msg) => return RawFetchResult::failure(FetchErrorKind::TlsHandshakeFailed, msg),
            };
            let name = tls.server_name.as_deref().unwrap_or(address).to_string();
            let server_name = match ServerName::try_from(name.clone()) {
                Ok(n) => n,
                Err(e) => {
                    return RawFetchResult::failure(
                        FetchErrorKind::TlsHandshakeFailed,
                        format!("invalid TLS server name {:?}: {}", name, e),
                    );
                }
            };
            match connector.connect(server_name, stream).await {
                Ok(tls_stream) => read_all(tls_stream).await,
                Err(e) => {
                    return RawFetchResult::failure(
                        FetchErrorKind::TlsHandshakeFailed,
                        format!("TLS handshake with {} failed: {}", name, e),
                    );
                }
            }
        }
    };

    match read {
        Ok(payload) => check_output(payload),
        Err(e) => RawFetchResult::failure(
            FetchErrorKind::IncompletePayload,
            format!("reading agent output failed: {}", e),
        ),
    }
}

async fn read_all<S: AsyncRead + Unpin>(mut stream: S) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn check_output(payload: Vec<u8>) -> RawFetchResult {
    if payload.is_empty() {
        RawFetchResult::failure(FetchErrorKind::IncompletePayload, "empty output from agent")
    } else if payload.len() < MIN_AGENT_OUTPUT {
        RawFetchResult::failure(
            FetchErrorKind::IncompletePayload,
            format!("too short output from agent: {:?}", String::from_utf8_lossy(&payload)),
        )
    } else {
        RawFetchResult::success(payload)
    }
}

fn tls_connector(tls: &TlsConfig) -> Result<TlsConnector, String> {
    let mut root_store = rustls::RootCertStore::empty();
    match &tls.ca_file {
        Some(path) => {
            let certs = CertificateDer::pem_file_iter(path)
                .map_err(|e| format!("read CA file {}: {}", path, e))?;
            for cert in certs {
                let cert = cert.map_err(|e| format!("parse CA file {}: {}", path, e))?;
                root_store
                    .add(cert)
                    .map_err(|e| format!("add CA from {}: {}", path, e))?;
            }
        }
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_empty_output_are_incomplete() {
        assert_eq!(
            check_output(Vec::new()).error_kind(),
            Some(FetchErrorKind::IncompletePayload)
        );
        assert_eq!(
            check_output(b"<<<x>>>".to_vec()).error_kind(),
            Some(FetchErrorKind::IncompletePayload)
        );
        assert!(check_output(b"<<<check_mk>>>\nVersion: 2.3\n".to_vec()).is_success());
    }
}
