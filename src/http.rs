use std::thread;
use std::time::Duration;

use reqwest::blocking::{RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 200;

pub(crate) fn user_agent_headers() -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(&format!("kira-tax/{}", env!("CARGO_PKG_VERSION")))
        .map_err(|err| err.to_string())?;
    headers.insert(USER_AGENT, agent);
    Ok(headers)
}

/// Sends the request built by `make_req`, retrying throttling, server errors
/// and dropped connections with linear backoff. Transport errors that are
/// still failing after the last attempt are returned as their message.
pub(crate) fn send_with_retries<F>(service: &str, mut make_req: F) -> Result<Response, String>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0usize;
    loop {
        let delay = Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1));
        match make_req().send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if attempt < MAX_RETRIES && is_retryable_status(status) {
                    debug!(service, status, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    thread::sleep(delay);
                    attempt += 1;
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if attempt < MAX_RETRIES && is_retryable_error(&err) {
                    debug!(service, %err, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    thread::sleep(delay);
                    attempt += 1;
                    continue;
                }
                return Err(err.to_string());
            }
        }
    }
}

/// Splits a finished response into success or `(status, body)`.
pub(crate) fn check_status(response: Response, fallback: &str) -> Result<Response, (u16, String)> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().unwrap_or_else(|_| fallback.to_string());
    Err((status, message))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_throttling_and_server_errors_are_retried() {
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(502));
    }

    #[test]
    fn user_agent_carries_version() {
        let headers = user_agent_headers().unwrap();
        let agent = headers[USER_AGENT].to_str().unwrap();
        assert!(agent.starts_with("kira-tax/"));
    }
}
