//! HTTP plumbing shared by the provider adapters.

use futures::{Stream, StreamExt};
use reqwest::Response;

use crate::domain::DomainError;

/// Classifies a reqwest failure into the upstream error taxonomy.
pub fn transport_error(err: reqwest::Error) -> DomainError {
    if err.is_timeout() {
        DomainError::timeout(err.to_string())
    } else if err.is_decode() {
        DomainError::protocol(err.to_string())
    } else {
        DomainError::unavailable(err.to_string())
    }
}

/// Passes successful responses through; anything else becomes
/// `UpstreamError` carrying the status and whatever body could be read.
pub async fn ensure_success(response: Response) -> Result<Response, DomainError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DomainError::upstream(status.as_u16(), body))
}

/// Reads a whole response body as JSON.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, DomainError> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body)
        .map_err(|e| DomainError::protocol(format!("unparseable response body: {e}")))
}

/// Splits a chunked body into lines without the trailing `\n` / `\r\n`.
///
/// Bytes are held only until a newline arrives, so a line may straddle any
/// number of network chunks, including mid-codepoint splits. A final line
/// without a newline is still emitted. The stream ends after the first error.
pub fn lines<S, B>(body: S) -> impl Stream<Item = Result<String, DomainError>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport_error)?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                yield decode_line(raw)?;
            }
        }

        if !buffer.is_empty() {
            yield decode_line(std::mem::take(&mut buffer))?;
        }
    }
}

fn decode_line(mut raw: Vec<u8>) -> Result<String, DomainError> {
    while matches!(raw.last(), Some(b'\n' | b'\r')) {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|e| DomainError::protocol(format!("invalid UTF-8 in stream: {e}")))
}
