use crate::{
    filter::{with_trailing_slash, FilterSet},
    http::create_http_client,
    types::{FailureReason, ProbeConfig, ProbeOutcome, Threshold},
};
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::{error::Error as StdError, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors that abort a whole run rather than failing a single domain.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid url for domain {domain:?}: {source}")]
    InvalidUrl {
        domain: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct Prober {
    client: Client,
    filters: Arc<FilterSet>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(filters: Arc<FilterSet>, config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = create_http_client(config.timeout)?;
        Ok(Self {
            client,
            filters,
            config,
        })
    }

    /// Probes one domain with a single GET.
    ///
    /// Only a domain that cannot be turned into a URL is an error; every
    /// other result is classified into a [`ProbeOutcome`].
    pub async fn probe_one(&self, domain: &str) -> Result<ProbeOutcome, ProbeError> {
        let start = Instant::now();
        let normalized = with_trailing_slash(domain);

        if !self.filters.matches(&normalized) {
            debug!(domain, "rejected by domain filter");
            return Ok(ProbeOutcome::Failure {
                domain: domain.to_string(),
                reason: FailureReason::NotAllowedTld,
            });
        }

        let url = match parse_url(domain, &normalized)? {
            Ok(url) => url,
            Err(e) => {
                debug!(domain, error = %e, "not a valid host");
                return Ok(ProbeOutcome::Failure {
                    domain: domain.to_string(),
                    reason: FailureReason::Transport(format!(
                        "invalid url http://{}: {}",
                        normalized, e
                    )),
                });
            }
        };

        let outcome = match self.client.get(url).send().await {
            Ok(response) => {
                // body is never read; dropping the response releases it
                let status = response.status();
                drop(response);
                self.classify(domain, status)
            }
            Err(e) => ProbeOutcome::Failure {
                domain: domain.to_string(),
                reason: FailureReason::Transport(error_chain(&e)),
            },
        };

        debug!(
            domain,
            success = outcome.is_success(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "probed"
        );

        Ok(outcome)
    }

    fn classify(&self, domain: &str, status: StatusCode) -> ProbeOutcome {
        if self.config.threshold.is_failure(status.as_u16()) {
            ProbeOutcome::Failure {
                domain: domain.to_string(),
                reason: FailureReason::Status(status_text(status)),
            }
        } else {
            ProbeOutcome::Success {
                domain: domain.to_string(),
                status: status_text(status),
            }
        }
    }

    /// Probes every domain with up to `concurrency` requests in flight.
    /// Results arrive in completion order.
    pub fn probe_stream<I>(
        &self,
        domains: I,
        concurrency: usize,
    ) -> impl Stream<Item = Result<ProbeOutcome, ProbeError>> + '_
    where
        I: IntoIterator<Item = String> + 'static,
    {
        let domains: Vec<String> = domains.into_iter().collect();

        stream::iter(domains)
            .map(move |domain| async move { self.probe_one(&domain).await })
            .buffer_unordered(concurrency.max(1))
    }
}

/// Parses the slash-terminated domain, falling back to `http` when it
/// carries no scheme.
///
/// A string with a scheme that still fails to parse is fatal. Without a
/// scheme the text is not a URL yet, so a failing `http://` re-parse is
/// returned in the inner result and reported for that domain only.
fn parse_url(
    domain: &str,
    normalized: &str,
) -> Result<Result<Url, url::ParseError>, ProbeError> {
    match Url::parse(normalized) {
        Ok(url) => Ok(Ok(url)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(Url::parse(&format!("http://{}", normalized)))
        }
        Err(source) => Err(ProbeError::InvalidUrl {
            domain: domain.to_string(),
            source,
        }),
    }
}

pub(crate) fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut details = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        details.push_str(": ");
        details.push_str(&inner.to_string());
        source = inner.source();
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prober(filters: &str, threshold: Threshold) -> Prober {
        let config = ProbeConfig {
            threshold,
            timeout: None,
        };
        Prober::new(Arc::new(FilterSet::parse(filters)), config).unwrap()
    }

    #[test]
    fn parse_url_defaults_to_http() {
        let url = parse_url("example.com", "example.com/").unwrap().unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn parse_url_keeps_explicit_scheme() {
        let url = parse_url("https://example.com", "https://example.com/")
            .unwrap()
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn parse_url_bad_host_without_scheme_is_not_fatal() {
        let inner = parse_url("exa mple.com", "exa mple.com/").unwrap();
        assert!(inner.is_err());
    }

    #[test]
    fn parse_url_bad_host_with_scheme_is_fatal() {
        let err = parse_url("http://exa mple.com", "http://exa mple.com/").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl { .. }));
    }

    #[test]
    fn status_text_uses_canonical_reason() {
        assert_eq!(status_text(StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(status_text(StatusCode::OK), "200 OK");
        assert_eq!(status_text(StatusCode::from_u16(599).unwrap()), "599");
    }

    #[test]
    fn classify_respects_threshold() {
        let lenient = prober("com", Threshold::from_accept_4xx(true));
        assert_eq!(
            lenient.classify("example.com", StatusCode::NOT_FOUND),
            ProbeOutcome::Success {
                domain: "example.com".into(),
                status: "404 Not Found".into(),
            }
        );
        assert!(lenient
            .classify("example.com", StatusCode::INTERNAL_SERVER_ERROR)
            .is_failure());

        let strict = prober("com", Threshold::from_accept_4xx(false));
        assert_eq!(
            strict.classify("example.com", StatusCode::NOT_FOUND),
            ProbeOutcome::Failure {
                domain: "example.com".into(),
                reason: FailureReason::Status("404 Not Found".into()),
            }
        );
        assert!(strict.classify("example.com", StatusCode::BAD_REQUEST).is_failure());
        assert!(strict
            .classify("example.com", StatusCode::PERMANENT_REDIRECT)
            .is_success());
    }

    #[tokio::test]
    async fn filter_rejection_skips_network() {
        let prober = prober("com", Threshold::default());
        let outcome = prober.probe_one("example.org").await.unwrap();
        assert_eq!(
            outcome.to_string(),
            "example.org - not available top level domain;"
        );
    }

    #[tokio::test]
    async fn invalid_url_with_scheme_is_fatal() {
        let prober = prober("com", Threshold::default());
        let err = prober.probe_one("http://exa mple.com").await.unwrap_err();
        assert!(
            matches!(err, ProbeError::InvalidUrl { ref domain, .. } if domain == "http://exa mple.com")
        );
    }

    #[tokio::test]
    async fn bad_host_without_scheme_is_transport_failure() {
        let prober = prober("com", Threshold::default());
        let outcome = prober.probe_one("exa mple.com").await.unwrap();
        match outcome {
            ProbeOutcome::Failure {
                domain,
                reason: FailureReason::Transport(details),
            } => {
                assert_eq!(domain, "exa mple.com");
                assert!(details.starts_with("invalid url http://exa mple.com/: "));
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_transport_failure() {
        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = prober("com", Threshold::default());
        let domain = format!("http://127.0.0.1:{}/down.com", port);
        let outcome = prober.probe_one(&domain).await.unwrap();

        match outcome {
            ProbeOutcome::Failure {
                reason: FailureReason::Transport(details),
                ..
            } => assert!(!details.is_empty()),
            other => panic!("expected transport failure, got {:?}", other),
        }
    }
}
