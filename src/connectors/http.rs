//! HTTP plumbing shared by the provider clients.
//!
//! Maps transport errors and HTTP statuses onto [`FetchError`] kinds the same
//! way for every provider.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use super::trait_::FetchError;

pub const USER_AGENT: &str = concat!("gitportal/", env!("CARGO_PKG_VERSION"));
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Joins `base` and `path` (which must start with `/`) into a URL.
pub fn endpoint_url(base: &str, path: &str) -> Result<Url, FetchError> {
    Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))
        .map_err(|e| FetchError::malformed(format!("invalid API URL: {e}")))
}

/// Sends the request and turns any non-2xx status into a typed error.
pub async fn send(provider: &str, request: RequestBuilder) -> Result<Response, FetchError> {
    let response = request.send().await.map_err(|e| transport_error(provider, &e))?;
    let status = response.status();
    match classify_status(status, response.headers()) {
        None => Ok(response),
        Some(err) => {
            warn!(provider, status = status.as_u16(), error = %err, "provider request failed");
            Err(err)
        }
    }
}

pub async fn decode<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T, FetchError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    serde_json::from_slice(&body)
        .map_err(|e| FetchError::malformed(format!("{provider} returned an unexpected payload: {e}")))
}

pub fn transport_error(provider: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout(format!("{provider} did not respond in time"))
    } else if err.is_decode() {
        FetchError::malformed(format!("{provider} response could not be read"))
    } else {
        FetchError::unreachable(format!("{provider} could not be reached: {err}"))
    }
}

/// `None` for success statuses.
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let err = match status {
        StatusCode::UNAUTHORIZED => FetchError::unauthorized("token was rejected by the provider"),
        StatusCode::FORBIDDEN if header_str(headers, "x-ratelimit-remaining") == Some("0") => {
            FetchError::rate_limited(
                Some(retry_after(headers)),
                "provider API rate limit exhausted",
            )
        }
        StatusCode::FORBIDDEN => FetchError::forbidden("token lacks access to this resource"),
        StatusCode::NOT_FOUND => FetchError::not_found("resource not found at provider"),
        StatusCode::TOO_MANY_REQUESTS => {
            FetchError::rate_limited(Some(retry_after(headers)), "provider API rate limit hit")
        }
        s if s.is_server_error() => {
            FetchError::unreachable(format!("provider server error {}", s.as_u16()))
        }
        s => FetchError::malformed(format!("unexpected provider status {}", s.as_u16())),
    };
    Some(err)
}

fn retry_after(headers: &HeaderMap) -> u64 {
    header_str(headers, "retry-after")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// True when a `Link` header advertises a `rel="next"` page.
pub fn has_next_link(headers: &HeaderMap) -> bool {
    header_str(headers, "link").is_some_and(|link| {
        link.split(',').any(|part| {
            part.split(';')
                .skip(1)
                .any(|param| param.trim() == "rel=\"next\"")
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::trait_::FetchErrorKind;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn success_is_not_an_error() {
        assert!(classify_status(StatusCode::OK, &HeaderMap::new()).is_none());
    }

    #[test]
    fn forbidden_with_exhausted_quota_is_rate_limited() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("retry-after", "17")]),
        )
        .unwrap();
        assert_eq!(
            err.kind,
            FetchErrorKind::RateLimited {
                retry_after_secs: Some(17)
            }
        );
    }

    #[test]
    fn forbidden_with_quota_left_is_forbidden() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "42")]),
        )
        .unwrap();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn too_many_requests_defaults_retry_after() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()).unwrap();
        assert_eq!(
            err.kind,
            FetchErrorKind::RateLimited {
                retry_after_secs: Some(60)
            }
        );
    }

    #[test]
    fn server_errors_are_unreachable() {
        let err = classify_status(StatusCode::BAD_GATEWAY, &HeaderMap::new()).unwrap();
        assert_eq!(err.kind, FetchErrorKind::Unreachable);
    }

    #[test]
    fn link_header_next_detection() {
        let with_next = headers(&[(
            "link",
            "<https://api.github.com/x?page=2>; rel=\"next\", <https://api.github.com/x?page=5>; rel=\"last\"",
        )]);
        assert!(has_next_link(&with_next));

        let last_page = headers(&[(
            "link",
            "<https://api.github.com/x?page=1>; rel=\"first\", <https://api.github.com/x?page=4>; rel=\"prev\"",
        )]);
        assert!(!has_next_link(&last_page));
        assert!(!has_next_link(&HeaderMap::new()));
    }

    #[test]
    fn endpoint_url_trims_trailing_slash() {
        let url = endpoint_url("https://gitlab.example.com/api/v4/", "/user").unwrap();
        assert_eq!(url.as_str(), "https://gitlab.example.com/api/v4/user");
    }
}
