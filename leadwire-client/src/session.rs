//! Subscribe, call and session-token capture.

use crate::client::{Client, ClientOpt};
use crate::{ClientError, ClientResult};
use http::{HeaderName, HeaderValue};
use leadwire_core::transport::Response;
use leadwire_core::Marshal;
use tracing::{debug, info};

/// Session token captured from a successful subscribe.
///
/// Nothing changes on the client until the token is applied; after that it
/// is attached to every request until another token replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    header: HeaderName,
    value: HeaderValue,
    token: String,
}

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Attaches the token to every later request of `client`.
    pub fn apply(&self, client: &Client) {
        debug!("Applying session token {}", self.token);
        client.apply(ClientOpt::Header(self.header.clone(), self.value.clone()));
    }
}

impl Client {
    /// Opens the long-lived subscription.
    ///
    /// Returns the open event stream and the session token the server issued
    /// for it. The token is not attached to later calls until
    /// [`SessionToken::apply`] is called. Only one subscribe may be in flight
    /// per client.
    pub async fn subscribe<M>(&self, call: &M) -> ClientResult<(Response, SessionToken)>
    where
        M: Marshal + ?Sized,
    {
        let _gate = self
            .subscribe_gate
            .try_lock()
            .map_err(|_| ClientError::SubscribeInFlight)?;

        let body = self.encode(call)?;
        self.record_call(true);
        let response = self.bounded("subscribe", self.call_with_redirect(body, true)).await?;

        let header = self.session_header().clone();
        let captured = response
            .headers()
            .get(&header)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.to_str().ok().map(|token| (value.clone(), token.to_string())));

        match captured {
            Some((value, token)) => {
                info!("Subscribed to {} with session {}", self.endpoint(), token);
                Ok((response, SessionToken { header, value, token }))
            }
            None => {
                response.close();
                Err(ClientError::MissingSessionToken {
                    header: header.to_string(),
                })
            }
        }
    }

    /// Sends `call` with the current session token attached.
    ///
    /// Never subscribes, even when no token has been applied yet.
    pub async fn call<M>(&self, call: &M, expect_streamed: bool) -> ClientResult<Response>
    where
        M: Marshal + ?Sized,
    {
        let body = self.encode(call)?;
        self.record_call(false);
        self.bounded("call", self.call_with_redirect(body, expect_streamed))
            .await
    }

    /// Sends `call` and discards the response.
    pub async fn call_no_data<M>(&self, call: &M) -> ClientResult<()>
    where
        M: Marshal + ?Sized,
    {
        self.call(call, false).await?.close();
        Ok(())
    }
}
