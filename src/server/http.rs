use crate::error::{Result, XrpWatchError};
use serde_json::{json, Value};
use std::io::ErrorKind;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::http::{Method, StatusCode};

const MAX_HEAD_BYTES: u64 = 16 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, target: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            target: target.to_string(),
            body: body.into(),
        }
    }

    /// Request target without the query string.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("/")
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }

    pub fn method_not_allowed(method: &Method, path: &str) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: json!({
                "error": "method_not_allowed",
                "message": format!("{} is not supported on {}", method, path),
            }),
        }
    }

    pub fn error(err: &XrpWatchError) -> Self {
        Self {
            status: status_for(err),
            body: json!({
                "error": err.kind(),
                "message": err.to_string(),
            }),
        }
    }
}

pub fn status_for(err: &XrpWatchError) -> StatusCode {
    match err {
        XrpWatchError::Validation(_) | XrpWatchError::JsonError(_) => StatusCode::BAD_REQUEST,
        XrpWatchError::NotFound(_) => StatusCode::NOT_FOUND,
        XrpWatchError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
        XrpWatchError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        XrpWatchError::PriceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Reads one HTTP/1.1 request. Returns `None` when the peer closed the
/// connection before sending anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = reader.take(MAX_HEAD_BYTES);

    let mut request_line = String::new();
    if read_head_line(&mut head, &mut request_line).await? == 0 {
        return Ok(None);
    }

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) if version.starts_with("HTTP/1.") => {
            (method, target)
        }
        _ => {
            return Err(XrpWatchError::Validation(format!(
                "malformed request line '{}'",
                request_line.trim_end()
            )))
        }
    };
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| XrpWatchError::Validation(format!("invalid method '{}'", method)))?;
    let target = target.to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if read_head_line(&mut head, &mut line).await? == 0 {
            return Err(XrpWatchError::Validation("request head too large or truncated".into()));
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().map_err(|_| {
                    XrpWatchError::Validation(format!("invalid content-length '{}'", value.trim()))
                })?;
            } else if name.eq_ignore_ascii_case("transfer-encoding")
                && !value.trim().eq_ignore_ascii_case("identity")
            {
                return Err(XrpWatchError::Validation(format!(
                    "transfer-encoding '{}' is not supported, send a Content-Length body",
                    value.trim()
                )));
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(XrpWatchError::Validation(format!(
            "body of {} bytes exceeds limit of {}",
            content_length, MAX_BODY_BYTES
        )));
    }

    let reader = head.into_inner();
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Request {
        method,
        target,
        body,
    }))
}

// Non-UTF-8 bytes in the head are the client's fault, not an I/O failure.
async fn read_head_line<R>(reader: &mut R, line: &mut String) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_line(line).await.map_err(|e| match e.kind() {
        ErrorKind::InvalidData => {
            XrpWatchError::Validation("request head is not valid UTF-8".into())
        }
        _ => XrpWatchError::IoError(e),
    })
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(&response.body)?;
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status.as_u16(),
        response.status.canonical_reason().unwrap_or(""),
        body.len()
    );

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
