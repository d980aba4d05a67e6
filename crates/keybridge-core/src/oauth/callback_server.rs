//! Loopback redirect listener for the authorization-code flow.
//!
//! The listener lives for exactly one flow invocation. Dropping the handle
//! aborts the server task and releases the socket, so teardown happens on
//! every exit path: success, cancellation, or timeout.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, OAuth2ServerError, Result};

const CALLBACK_PATH: &str = "/callback";

// Fixed probe range for the loopback listener. The bound port is substituted
// into the redirect URI sent to the authorization endpoint.
const PORT_RANGE_START: u16 = 49215;
const PORT_RANGE_END: u16 = 49225;

/// Parameters received on the authorization redirect.
#[derive(Debug)]
pub struct CallbackResponse {
    pub code: String,
    pub state: String,
}

/// Handle for a running redirect listener.
pub struct CallbackListener {
    port: u16,
    receiver: mpsc::Receiver<Result<CallbackResponse>>,
    task: tokio::task::JoinHandle<()>,
}

impl CallbackListener {
    /// Bind a loopback listener that accepts the redirect for
    /// `expected_state`. A callback carrying any other state value is
    /// rejected as a protocol violation (possible CSRF) and fails the flow.
    pub async fn bind(expected_state: String) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Result<CallbackResponse>>(1);
        let tx = Arc::new(tx);

        let listener = try_bind_listener().await?;
        let port = listener
            .local_addr()
            .map_err(Error::Io)?
            .port();
        tracing::debug!(port, "authorization redirect listener bound");

        let task = tokio::spawn(async move {
            let expected_state = Arc::new(expected_state);

            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(connection) => connection,
                    Err(error) => {
                        tracing::error!(%error, "failed to accept redirect connection");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let tx = tx.clone();
                let expected_state = expected_state.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |request: Request<Incoming>| {
                        let tx = tx.clone();
                        let expected_state = expected_state.clone();
                        async move { handle_request(request, tx, &expected_state).await }
                    });

                    if let Err(error) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::error!(%error, "failed to serve redirect connection");
                    }
                });
            }
        });

        Ok(Self {
            port,
            receiver: rx,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI the authorization request must carry.
    pub fn redirect_uri(&self) -> Url {
        // The format is fixed; this cannot fail.
        Url::parse(&format!("http://127.0.0.1:{}{}", self.port, CALLBACK_PATH))
            .unwrap_or_else(|_| unreachable!("loopback redirect URI is always valid"))
    }

    /// Wait for the redirect callback (or its failure).
    pub async fn recv(&mut self) -> Result<CallbackResponse> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| Error::Protocol("redirect listener channel closed".to_string()))?
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn try_bind_listener() -> Result<TcpListener> {
    for port in PORT_RANGE_START..=PORT_RANGE_END {
        match TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await {
            Ok(listener) => return Ok(listener),
            Err(_) => continue,
        }
    }

    Err(Error::Protocol(format!(
        "failed to bind a loopback port in range {PORT_RANGE_START}-{PORT_RANGE_END}"
    )))
}

async fn handle_request(
    request: Request<Incoming>,
    tx: Arc<mpsc::Sender<Result<CallbackResponse>>>,
    expected_state: &str,
) -> std::result::Result<Response<String>, hyper::Error> {
    if request.method() != Method::GET {
        return Ok(plain_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ));
    }

    if request.uri().path() != CALLBACK_PATH {
        return Ok(plain_response(StatusCode::NOT_FOUND, "Not found"));
    }

    let query = request.uri().query().unwrap_or("");
    let params: std::collections::HashMap<String, String> =
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

    if let Some(error) = params.get("error") {
        let _ = tx
            .send(Err(Error::OAuth2(OAuth2ServerError {
                error: error.clone(),
                description: params.get("error_description").cloned(),
            })))
            .await;
        return Ok(html_response(
            StatusCode::OK,
            &failure_page(error),
        ));
    }

    match (params.get("code"), params.get("state")) {
        (Some(code), Some(state)) if state == expected_state => {
            let _ = tx
                .send(Ok(CallbackResponse {
                    code: code.clone(),
                    state: state.clone(),
                }))
                .await;
            Ok(html_response(StatusCode::OK, SUCCESS_PAGE))
        }
        (Some(_), Some(_)) => {
            let _ = tx
                .send(Err(Error::Protocol(
                    "authorization callback state does not match the request".to_string(),
                )))
                .await;
            Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "Invalid state parameter",
            ))
        }
        _ => {
            let _ = tx
                .send(Err(Error::Protocol(
                    "authorization callback is missing 'code' or 'state'".to_string(),
                )))
                .await;
            Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "Missing required parameters",
            ))
        }
    }
}

fn plain_response(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response
}

fn html_response(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/html"),
    );
    response
}

const SUCCESS_PAGE: &str = r"<!DOCTYPE html>
<html>
<head><title>Authentication Successful</title></head>
<body>
  <h1>Authentication successful</h1>
  <p>You can close this window and return to the terminal.</p>
</body>
</html>";

fn failure_page(error: &str) -> String {
    format!(
        r"<!DOCTYPE html>
<html>
<head><title>Authentication Failed</title></head>
<body>
  <h1>Authentication failed</h1>
  <p>Error: {error}</p>
  <p>You can close this window and return to the terminal.</p>
</body>
</html>"
    )
}
