use std::time;

use futures::{Stream, StreamExt};
use reqwest::{header, Client, Response};
use thiserror::Error;

/// Enumeration of errors that can occur while reading a `reqwest::Response` body.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("error while iterating over response body chunks")]
    StreamIterationError(#[from] reqwest::Error),
}

/// Build the client every tool uses. `None` keeps reqwest's default of no timeout.
pub fn build_http_client(
    request_timeout: Option<time::Duration>,
    user_agent: &str,
) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );
    let mut client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(user_agent.to_owned());
    if let Some(timeout) = request_timeout {
        client_builder = client_builder.timeout(timeout);
    }
    client_builder.build()
}

/// Read at most `n` bytes of a response body as a string.
pub async fn first_n_bytes_of_response(
    response: Response,
    n: usize,
) -> Result<String, ResponseError> {
    first_n_bytes_of_stream(response.bytes_stream(), n).await
}

/// Bytes are collected before decoding: chunk boundaries may fall inside a multibyte
/// character. Invalid UTF-8, including a character cut at `n`, decodes as U+FFFD.
async fn first_n_bytes_of_stream<S, B>(stream: S, n: usize) -> Result<String, ResponseError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut body = std::pin::pin!(stream);
    let mut buffer: Vec<u8> = Vec::with_capacity(n);

    while let Some(chunk) = body.next().await {
        if buffer.len() >= n {
            break;
        }

        let chunk = chunk?;
        let bytes = chunk.as_ref();
        let upper_bound = std::cmp::min(n - buffer.len(), bytes.len());
        buffer.extend_from_slice(&bytes[..upper_bound]);
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
