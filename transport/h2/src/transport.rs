//! HTTP/2 transport implementation
//!
//! Implements the [`Transport`] seam over a single multiplexed HTTP/2
//! connection: request streams map to HTTP/2 streams, push announcements
//! map to PUSH_PROMISE frames, and the announced message's metadata and
//! payload arrive on the promised stream.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use h2::client::{PushPromises, ResponseFuture, SendRequest};
use h2::RecvStream;
use http::{HeaderName, Method};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

use crate::config::H2Config;
use webpush_core::{RequestStream, StreamCancel, StreamEvent, Transport, WebPushError};

type EventSender = mpsc::Sender<Result<StreamEvent, WebPushError>>;

/// HTTP/2 transport
pub struct H2Transport {
    config: H2Config,
    sender: Mutex<Option<SendRequest<Bytes>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl H2Transport {
    /// Connect to the WebPush server and drive the HTTP/2 connection on a
    /// background task.
    pub async fn new(config: H2Config) -> Result<Self, WebPushError> {
        let (sender, driver) = connect(&config).await?;
        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            driver: Mutex::new(Some(driver)),
        })
    }

    async fn request_sender(&self) -> Result<SendRequest<Bytes>, WebPushError> {
        self.sender
            .lock()
            .await
            .clone()
            .ok_or_else(|| WebPushError::Connection("HTTP/2 connection is not established".into()))
    }

    fn build_request(
        &self,
        method: &Method,
        path: &str,
        headers: &[(HeaderName, String)],
    ) -> Result<http::Request<()>, WebPushError> {
        let uri = format!(
            "{}://{}{}{}",
            self.config.scheme(),
            self.config.authority(),
            self.config.path_prefix,
            path
        );
        let mut builder = http::Request::builder().method(method.clone()).uri(uri);
        for (name, value) in headers {
            builder = builder.header(name.clone(), value.as_str());
        }
        builder
            .body(())
            .map_err(|e| WebPushError::Config(format!("invalid request for {path}: {e}")))
    }
}

#[async_trait]
impl Transport for H2Transport {
    async fn open_stream(
        &self,
        method: Method,
        path: &str,
        headers: Vec<(HeaderName, String)>,
    ) -> Result<RequestStream, WebPushError> {
        let sender = self.request_sender().await?;
        let request = self.build_request(&method, path, &headers)?;
        debug!(method = %method, path = %path, "opening request stream");

        let mut sender = sender.ready().await.map_err(h2_error)?;
        let (mut response, _request_body) =
            sender.send_request(request, true).map_err(h2_error)?;
        let pushes = response.push_promises();

        let (tx, rx) = mpsc::channel(32);
        let (cancel, mut cancel_rx) = StreamCancel::new();
        tokio::spawn(async move {
            let worker = async {
                tokio::join!(
                    pump_push_promises(pushes, tx.clone()),
                    pump_response(response, tx.clone())
                );
            };
            tokio::select! {
                _ = worker => {}
                // Dropping the h2 handles resets the stream.
                _ = &mut cancel_rx => {
                    debug!("request stream cancelled");
                }
            }
        });

        Ok(RequestStream { events: rx, cancel })
    }

    async fn send(&self, method: Method, path: &str) -> Result<(), WebPushError> {
        let sender = self.request_sender().await?;
        let request = self.build_request(&method, path, &[])?;

        let mut sender = sender.ready().await.map_err(h2_error)?;
        let (response, _request_body) = sender.send_request(request, true).map_err(h2_error)?;
        let response = response.await.map_err(h2_error)?;
        debug!(method = %method, path = %path, status = %response.status(), "request completed");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.sender.lock().await.is_some()
    }

    async fn disconnect(&self) -> Result<(), WebPushError> {
        info!("shutting down HTTP/2 transport");
        self.sender.lock().await.take();
        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
        }
        Ok(())
    }
}

async fn connect(config: &H2Config) -> Result<(SendRequest<Bytes>, JoinHandle<()>), WebPushError> {
    let mut attempt = 0;
    loop {
        match try_connect(config).await {
            Ok(parts) => {
                info!(authority = %config.authority(), tls = config.tls, "connected to WebPush server");
                return Ok(parts);
            }
            Err(e) => {
                attempt += 1;
                if attempt > config.retry_attempts {
                    return Err(e);
                }
                warn!(
                    attempt,
                    max_attempts = config.retry_attempts,
                    error = %e,
                    "connection failed, retrying..."
                );
                sleep(Duration::from_secs(config.retry_delay_seconds)).await;
            }
        }
    }
}

async fn try_connect(
    config: &H2Config,
) -> Result<(SendRequest<Bytes>, JoinHandle<()>), WebPushError> {
    let connect = TcpStream::connect((config.host.as_str(), config.port));
    let tcp = timeout(Duration::from_secs(config.connect_timeout_seconds), connect)
        .await
        .map_err(|_| {
            WebPushError::Connection(format!("connect to {} timed out", config.authority()))
        })?
        .map_err(|e| {
            WebPushError::Connection(format!("connect to {} failed: {e}", config.authority()))
        })?;
    let _ = tcp.set_nodelay(true);

    if config.tls {
        let tls_config = tls_client_config(config.trust_all);
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| WebPushError::Config(format!("invalid host {}: {e}", config.host)))?;
        let io = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| WebPushError::Connection(format!("TLS handshake failed: {e}")))?;
        handshake(io).await
    } else {
        handshake(tcp).await
    }
}

async fn handshake<T>(io: T) -> Result<(SendRequest<Bytes>, JoinHandle<()>), WebPushError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, connection) = h2::client::handshake(io).await.map_err(h2_error)?;
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "HTTP/2 connection terminated");
        }
    });
    Ok((sender, driver))
}

/// Forward promised streams as announcement, metadata, and data events.
///
/// Pushes are consumed one at a time: the next PUSH_PROMISE is not taken
/// until the current promised stream is drained, which preserves the
/// serialized delivery order the assembler relies on.
async fn pump_push_promises(mut pushes: PushPromises, tx: EventSender) {
    while let Some(next) = pushes.push_promise().await {
        match next {
            Ok(push) => {
                let (request, response) = push.into_parts();
                let resource = request.uri().path().to_string();
                debug!(resource = %resource, "push promise received");
                if tx
                    .send(Ok(StreamEvent::Announcement { resource }))
                    .await
                    .is_err()
                {
                    return;
                }
                match response.await {
                    Ok(response) => {
                        let (parts, body) = response.into_parts();
                        let metadata = StreamEvent::Metadata {
                            status: parts.status,
                            headers: parts.headers,
                        };
                        if tx.send(Ok(metadata)).await.is_err() {
                            return;
                        }
                        if pump_body(body, &tx).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(h2_error(e))).await;
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(h2_error(e))).await;
                return;
            }
        }
    }
}

async fn pump_response(response: ResponseFuture, tx: EventSender) {
    match response.await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            let metadata = StreamEvent::Metadata {
                status: parts.status,
                headers: parts.headers,
            };
            if tx.send(Ok(metadata)).await.is_err() {
                return;
            }
            let _ = pump_body(body, &tx).await;
        }
        Err(e) => {
            let _ = tx.send(Err(h2_error(e))).await;
        }
    }
}

async fn pump_body(mut body: RecvStream, tx: &EventSender) -> Result<(), ()> {
    while let Some(next) = body.data().await {
        match next {
            Ok(chunk) => {
                let frame_len = chunk.len();
                let end_of_stream = body.is_end_stream();
                let event = StreamEvent::Data {
                    chunk,
                    end_of_stream,
                };
                if tx.send(Ok(event)).await.is_err() {
                    return Err(());
                }
                if body.flow_control().release_capacity(frame_len).is_err() {
                    return Err(());
                }
            }
            Err(e) => {
                let _ = tx.send(Err(h2_error(e))).await;
                return Err(());
            }
        }
    }
    Ok(())
}

fn h2_error(e: h2::Error) -> WebPushError {
    WebPushError::Transport(e.to_string())
}

fn tls_client_config(trust_all: bool) -> rustls::ClientConfig {
    let mut config = if trust_all {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    config.alpn_protocols = vec![b"h2".to_vec()];
    config
}

/// Certificate verifier that accepts any server certificate. Only used
/// when `trust_all` is enabled for self-signed test servers.
#[derive(Debug)]
struct NoVerification(CryptoProvider);

impl NoVerification {
    fn new() -> Self {
        Self(rustls::crypto::ring::default_provider())
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
