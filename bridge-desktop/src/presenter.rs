//! Loopback Authorization Presenter
//!
//! Desktop hosts open the authorization page in the system browser and let
//! the identity provider redirect back to a listener on the loopback
//! interface. The listener accepts connections until one arrives on the
//! registered redirect path, answers it with a short HTML page and hands the
//! full redirect URL back to the caller.
//!
//! Each connection is served on its own task with a short read deadline, so
//! a browser's idle preconnect or a stray client never holds up the real
//! redirect. A `localhost` redirect URI is bound on every address the name
//! resolves to (usually `127.0.0.1` and `::1`).

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    presenter::{AuthorizationPresenter, PresenterOutcome},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::{Host, Url};

/// How long to wait for the browser to come back before treating the
/// attempt as abandoned.
pub const DEFAULT_REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Deadline for a single connection to deliver its request line and take the
/// response.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_REQUEST_LINE: u64 = 8192;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

const DONE_HTML: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<title>Sign-in complete</title></head><body>\
<p>Sign-in complete. You can close this tab and return to the application.</p>\
</body></html>";

/// Waits for the identity provider's redirect on the redirect URI's loopback
/// host and port.
///
/// The authorization URL is written to the log at `info` level; hosts that
/// can launch a browser should wrap this presenter and open the URL
/// themselves before awaiting [`AuthorizationPresenter::present`].
pub struct LoopbackPresenter {
    timeout: Duration,
}

impl LoopbackPresenter {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_REDIRECT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Serve every listener until some connection targets `redirect.path()`.
    ///
    /// Dropping the returned future stops the listeners and any connection
    /// still being read.
    async fn accept_redirect(
        listeners: Vec<TcpListener>,
        redirect: Url,
        connection_timeout: Duration,
    ) -> Result<String> {
        let redirect = Arc::new(redirect);
        let (tx, mut rx) = mpsc::channel(1);
        let mut acceptors = JoinSet::new();
        for listener in listeners {
            acceptors.spawn(serve(
                listener,
                redirect.clone(),
                connection_timeout,
                tx.clone(),
            ));
        }
        drop(tx);

        rx.recv()
            .await
            .ok_or_else(|| BridgeError::OperationFailed("Loopback listener stopped".to_string()))
    }
}

impl Default for LoopbackPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationPresenter for LoopbackPresenter {
    async fn present(&self, authorize_url: &str, redirect_uri: &str) -> Result<PresenterOutcome> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid redirect URI: {}", e)))?;

        let port = redirect.port_or_known_default().ok_or_else(|| {
            BridgeError::OperationFailed("Redirect URI has no port".to_string())
        })?;
        let listeners = bind_listeners(&redirect, port).await?;

        info!(%authorize_url, "Open this URL in a browser to sign in");
        debug!(
            listeners = listeners.len(),
            port, "Waiting for authorization redirect"
        );

        match tokio::time::timeout(
            self.timeout,
            Self::accept_redirect(listeners, redirect, CONNECTION_TIMEOUT),
        )
        .await
        {
            Ok(Ok(url)) => Ok(PresenterOutcome::Redirected(url)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                info!(
                    timeout_secs = self.timeout.as_secs(),
                    "No authorization redirect received; treating as cancelled"
                );
                Ok(PresenterOutcome::Cancelled)
            }
        }
    }
}

/// Bind one listener per address the redirect host stands for. Succeeds when
/// at least one bind does.
async fn bind_listeners(redirect: &Url, port: u16) -> Result<Vec<TcpListener>> {
    let mut addrs: Vec<SocketAddr> = Vec::new();
    match redirect.host() {
        Some(Host::Domain(domain)) => {
            for addr in tokio::net::lookup_host((domain, port)).await? {
                if !addrs.contains(&addr) {
                    addrs.push(addr);
                }
            }
        }
        Some(Host::Ipv4(ip)) => addrs.push(SocketAddr::from((ip, port))),
        Some(Host::Ipv6(ip)) => addrs.push(SocketAddr::from((ip, port))),
        None => {
            return Err(BridgeError::OperationFailed(
                "Redirect URI has no host".to_string(),
            ))
        }
    }
    // An ephemeral port differs per bind; the redirect can only name one.
    if port == 0 {
        addrs.truncate(1);
    }

    let mut listeners = Vec::with_capacity(addrs.len());
    let mut last_error = None;
    for addr in addrs {
        match TcpListener::bind(addr).await {
            Ok(listener) => listeners.push(listener),
            Err(e) => {
                debug!(%addr, error = %e, "Cannot bind loopback address");
                last_error = Some(e);
            }
        }
    }

    if listeners.is_empty() {
        return Err(match last_error {
            Some(e) => e.into(),
            None => BridgeError::OperationFailed(format!(
                "Redirect host resolved to no address: {}",
                redirect
            )),
        });
    }
    Ok(listeners)
}

async fn serve(
    listener: TcpListener,
    redirect: Arc<Url>,
    connection_timeout: Duration,
    tx: mpsc::Sender<String>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted loopback connection");
                    connections.spawn(handle_connection(
                        stream,
                        redirect.clone(),
                        connection_timeout,
                        tx.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Loopback accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next() => {}
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    redirect: Arc<Url>,
    connection_timeout: Duration,
    tx: mpsc::Sender<String>,
) {
    match tokio::time::timeout(connection_timeout, answer(&mut stream, &redirect)).await {
        Ok(Ok(Some(url))) => {
            // Only the first redirect is wanted; later ones find the
            // receiver gone.
            let _ = tx.send(url).await;
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) => warn!(error = %e, "Loopback connection failed"),
        Err(_) => debug!("Closing idle loopback connection"),
    }
}

/// Read one request line and respond. `Some` carries the redirect URL.
async fn answer(stream: &mut TcpStream, redirect: &Url) -> Result<Option<String>> {
    let mut raw = Vec::new();
    BufReader::new(&mut *stream)
        .take(MAX_REQUEST_LINE)
        .read_until(b'\n', &mut raw)
        .await?;

    if !raw.ends_with(b"\n") {
        warn!(bytes = raw.len(), "Ignoring incomplete loopback request line");
        write_response(stream, "400 Bad Request", "").await?;
        return Ok(None);
    }

    let target = match parse_request_target(&String::from_utf8_lossy(&raw)) {
        Ok(target) => target,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed loopback request");
            write_response(stream, "400 Bad Request", "").await?;
            return Ok(None);
        }
    };

    let full = match redirect.join(&target) {
        Ok(full) => full,
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable redirect target");
            write_response(stream, "400 Bad Request", "").await?;
            return Ok(None);
        }
    };

    if full.path() != redirect.path() {
        debug!(path = full.path(), "Ignoring request outside redirect path");
        write_response(stream, "404 Not Found", "").await?;
        return Ok(None);
    }

    write_response(stream, "200 OK", DONE_HTML).await?;
    Ok(Some(full.to_string()))
}

/// Extract the request target from `GET /callback?code=... HTTP/1.1`.
fn parse_request_target(request: &str) -> Result<String> {
    let line = request
        .lines()
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| BridgeError::OperationFailed("Empty HTTP request".to_string()))?;

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Ok(target.to_string()),
        _ => Err(BridgeError::OperationFailed(format!(
            "Malformed request line: {}",
            line
        ))),
    }
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
