//! Following "not leader" responses to the new leader.

use crate::client::{Client, Delivery};
use crate::{ClientError, ClientResult};
use bytes::Bytes;
use leadwire_core::transport::Response;
use tracing::{debug, warn};
use url::Url;

/// Rewrites `current` to point at the host named by a redirect hint.
///
/// Hints are typically scheme-relative (`//10.0.0.2:5050/master/api/v1/scheduler`),
/// but absolute URLs and bare `host:port` values are accepted too. Only the
/// host and port are taken from the hint; scheme, path and query of `current`
/// are kept.
///
/// ```rust
/// use leadwire_client::resolve_redirect;
/// use url::Url;
///
/// let current = Url::parse("http://10.0.0.1:5050/api/v1/scheduler").unwrap();
/// let target = resolve_redirect(&current, "//10.0.0.2:5051/master/redirect").unwrap();
/// assert_eq!(target.as_str(), "http://10.0.0.2:5051/api/v1/scheduler");
///
/// assert!(resolve_redirect(&current, "").is_none());
/// ```
pub fn resolve_redirect(current: &Url, hint: &str) -> Option<Url> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }

    let location = if hint.contains("://") || hint.starts_with("//") {
        current.join(hint).ok()?
    } else {
        current.join(&format!("//{}", hint)).ok()?
    };

    let host = location.host_str().filter(|host| !host.is_empty())?;
    let mut target = current.clone();
    target.set_host(Some(host)).ok()?;
    target.set_port(location.port_or_known_default()).ok()?;
    Some(target)
}

impl Client {
    /// Sends `body`, following up to `max_redirects` leader redirects.
    ///
    /// Every superseded response is closed before the next attempt.
    pub(crate) async fn call_with_redirect(&self, body: Bytes, expect_streamed: bool) -> ClientResult<Response> {
        let max_redirects = self.max_redirects();
        let mut attempt: u32 = 0;

        loop {
            match self.send_raw(&body, expect_streamed).await? {
                Delivery::Delivered(response) => return Ok(response),
                Delivery::NotLeader { response, hint } => {
                    if attempt >= max_redirects {
                        response.close();
                        let target = self.endpoint().to_string();
                        warn!("Leader changed {} times, giving up at {}", attempt, target);
                        return Err(ClientError::LeaderChanged {
                            attempts: attempt,
                            target,
                        });
                    }

                    let target = match self.redirect(&hint) {
                        Some(target) => target,
                        None => {
                            response.close();
                            return Err(ClientError::InvalidRedirect { hint });
                        }
                    };
                    response.close();
                    self.record_redirect();
                    attempt += 1;
                    debug!("Following leader redirect {}/{} to {}", attempt, max_redirects, target);
                }
            }
        }
    }
}
