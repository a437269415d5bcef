// src/fetch/mod.rs
//! Retrieval of the daily capacity posting.

pub mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::process::date_parser::format_gas_day;
pub use retry::RetryPolicy;

pub const DEFAULT_FEED_URL: &str =
    "https://twtransfer.energytransfer.com/ipost/TW/capacity/operationally-available";

/// Anything that can hand back the raw posting for a gas day.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, day: NaiveDate) -> Result<Bytes, FetchError>;
}

/// Where the posting lives and which slice of it to ask for.
#[derive(Debug, Clone)]
pub struct FeedEndpoint {
    pub base_url: Url,
    pub asset: String,
    pub search_type: String,
}

impl FeedEndpoint {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            asset: "TW".to_string(),
            search_type: "NOM".to_string(),
        }
    }

    pub fn url_for(&self, day: NaiveDate) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("f", "csv")
            .append_pair("extension", "csv")
            .append_pair("asset", &self.asset)
            .append_pair("gasDay", &format_gas_day(day))
            .append_pair("searchType", &self.search_type);
        url
    }
}

/// One failed request, before the retry bound is applied.
enum Failure {
    Timeout,
    Network(String),
    Status(StatusCode),
    EmptyBody,
}

impl Failure {
    fn retryable(&self) -> bool {
        match self {
            Failure::Timeout | Failure::Network(_) => true,
            Failure::Status(s) => s.is_server_error() || *s == StatusCode::TOO_MANY_REQUESTS,
            Failure::EmptyBody => false,
        }
    }

    fn into_error(self, url: &Url, attempts: u32) -> FetchError {
        match self {
            Failure::Timeout => FetchError::Timeout { attempts },
            Failure::Network(message) => FetchError::Network { attempts, message },
            Failure::Status(s) => FetchError::Status {
                status: s.as_u16(),
                url: url.to_string(),
                attempts,
            },
            Failure::EmptyBody => FetchError::EmptyBody {
                url: url.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Failure::Timeout
        } else {
            Failure::Network(e.to_string())
        }
    }
}

/// HTTP client for the operator's posting endpoint.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: Client,
    endpoint: FeedEndpoint,
    retry: RetryPolicy,
}

impl HttpFeed {
    /// `request_timeout` bounds each attempt, not the whole retry sequence.
    pub fn new(
        endpoint: FeedEndpoint,
        retry: RetryPolicy,
        request_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            retry,
        })
    }

    async fn attempt(&self, url: &Url) -> Result<Bytes, Failure> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Failure::Status(status));
        }
        let body = resp.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(Failure::EmptyBody);
        }
        Ok(body)
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self, day: NaiveDate) -> Result<Bytes, FetchError> {
        if day > Local::now().date_naive() {
            return Err(FetchError::FutureDate { day });
        }

        let url = self.endpoint.url_for(day);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(&url).await {
                Ok(body) => {
                    debug!(%day, attempt, bytes = body.len(), "fetched posting");
                    return Ok(body);
                }
                Err(failure) if failure.retryable() && self.retry.should_retry(attempt) => {
                    let wait = self.retry.backoff(attempt);
                    let err = failure.into_error(&url, attempt);
                    warn!(%day, attempt, ?wait, error = %err, "fetch failed, retrying");
                    sleep(wait).await;
                }
                Err(failure) => return Err(failure.into_error(&url, attempt)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned responses in order, one per connection, recording request lines.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = sock.read(&mut buf[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                }
                let request = String::from_utf8_lossy(&buf[..read]);
                log.lock()
                    .unwrap()
                    .push(request.lines().next().unwrap_or_default().to_string());
                let resp = format!(
                    "HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
            }
        });
        let url = Url::parse(&format!("http://{addr}/ipost/TW/capacity")).unwrap();
        (url, seen)
    }

    fn feed(url: Url, attempts: u32) -> HttpFeed {
        let retry = RetryPolicy {
            max_attempts: attempts,
            initial_backoff_ms: 1,
            multiplier: 1.0,
            max_backoff_ms: 1,
        };
        HttpFeed::new(
            FeedEndpoint::new(url),
            retry,
            Duration::from_secs(5),
            "capscraper-test",
        )
        .unwrap()
    }

    fn yesterday() -> NaiveDate {
        Local::now().date_naive() - Days::new(1)
    }

    #[test]
    fn url_carries_gas_day_query() {
        let ep = FeedEndpoint::new(Url::parse(DEFAULT_FEED_URL).unwrap());
        let url = ep.url_for(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("gasDay".into(), "10/17/2026".into())));
        assert!(pairs.contains(&("asset".into(), "TW".into())));
        assert!(pairs.contains(&("searchType".into(), "NOM".into())));
        assert!(pairs.contains(&("f".into(), "csv".into())));
    }

    #[tokio::test]
    async fn returns_body_bytes_verbatim() {
        let (url, seen) = serve(vec![(200, "Loc,OAC\n1,2\n")]).await;
        let body = feed(url, 1).fetch(yesterday()).await.unwrap();
        assert_eq!(&body[..], b"Loc,OAC\n1,2\n");
        let req = seen.lock().unwrap()[0].clone();
        assert!(req.starts_with("GET /ipost/TW/capacity?f=csv"), "{req}");
        assert!(req.contains("gasDay="), "{req}");
    }

    #[tokio::test]
    async fn server_errors_are_retried_within_bound() {
        let (url, seen) = serve(vec![(503, "busy"), (200, "Loc,OAC\n1,2\n")]).await;
        let body = feed(url, 3).fetch(yesterday()).await.unwrap();
        assert!(!body.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn server_errors_give_up_after_max_attempts() {
        let (url, seen) = serve(vec![(500, "x"), (502, "x")]).await;
        let err = feed(url, 2).fetch(yesterday()).await.unwrap_err();
        assert!(
            matches!(err, FetchError::Status { status: 502, attempts: 2, .. }),
            "{err}"
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, seen) = serve(vec![(404, "nope"), (200, "Loc,OAC\n")]).await;
        let err = feed(url, 3).fetch(yesterday()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, attempts: 1, .. }));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let (url, _) = serve(vec![(200, "  \n")]).await;
        let err = feed(url, 3).fetch(yesterday()).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let err = feed(url, 2).fetch(yesterday()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { attempts: 2, .. }), "{err}");
    }

    #[tokio::test]
    async fn future_days_are_refused_without_a_request() {
        let (url, seen) = serve(vec![]).await;
        let tomorrow = Local::now().date_naive() + Days::new(1);
        let err = feed(url, 3).fetch(tomorrow).await.unwrap_err();
        assert!(matches!(err, FetchError::FutureDate { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }
}
