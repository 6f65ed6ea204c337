use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tally_core::error::{RemoteError, WalletError};
use tally_core::traits::WalletService;
use tally_core::types::{Coin, ReceiveAddress, RemoteTransaction, WalletSummary};
use tracing::{debug, warn};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`WalletService`] talking JSON over HTTP.
pub struct HttpWalletService {
    client: Client,
    base: Url,
}

impl HttpWalletService {
    /// Build a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WalletError> {
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::Transport(format!("invalid service url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            let reason = format!("service url {base_url} cannot be a base");
            return Err(RemoteError::Transport(reason).into());
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `<base>/wallet/<id>/<tail...>` with every segment percent-encoded.
    fn endpoint(&self, id: &str, tail: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("wallet").push(id).extend(tail);
        }
        url
    }

    fn get<T: DeserializeOwned>(&self, id: &str, tail: &[&str]) -> Result<T, WalletError> {
        let url = self.endpoint(id, tail);
        self.execute(self.client.get(url))
    }

    fn post<T: DeserializeOwned>(
        &self,
        id: &str,
        tail: &[&str],
        body: &Value,
    ) -> Result<T, WalletError> {
        let url = self.endpoint(id, tail);
        self.execute(self.client.post(url).json(body))
    }

    fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, WalletError> {
        let response = request.send().map_err(|e| {
            warn!("wallet service unreachable: {e}");
            RemoteError::Transport(e.to_string())
        })?;
        let status = response.status().as_u16();
        let url = response.url().clone();
        let body = response
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        debug!(%url, status, "wallet service response");
        decode_body(status, &body)
    }
}

/// Interpret a response body, mapping non-2xx statuses to [`RemoteError::Status`].
pub(crate) fn decode_body<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, WalletError> {
    if !(200..300).contains(&status) {
        warn!(status, "wallet service returned an error");
        return Err(RemoteError::Status {
            status,
            body: body.to_string(),
        }
        .into());
    }
    serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()).into())
}

impl WalletService for HttpWalletService {
    fn wallet(&self, id: &str) -> Result<WalletSummary, WalletError> {
        self.get(id, &[])
    }

    fn transaction(&self, id: &str, hash: &str) -> Result<RemoteTransaction, WalletError> {
        self.get(id, &["tx", hash])
    }

    fn history(&self, id: &str) -> Result<Vec<RemoteTransaction>, WalletError> {
        self.get(id, &["tx", "history"])
    }

    fn pending(&self, id: &str) -> Result<Vec<RemoteTransaction>, WalletError> {
        self.get(id, &["tx", "unconfirmed"])
    }

    fn coins(&self, id: &str) -> Result<Vec<Coin>, WalletError> {
        self.get(id, &["coin"])
    }

    fn nested_address(&self, id: &str, account: &str) -> Result<ReceiveAddress, WalletError> {
        self.post(id, &["nested"], &json!({ "account": account }))
    }

    fn send(&self, id: &str, payload: &Value) -> Result<Value, WalletError> {
        self.post(id, &["send"], payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpWalletService {
        HttpWalletService::new(base, DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn endpoint_paths() {
        let svc = service("http://127.0.0.1:48334");
        assert_eq!(
            svc.endpoint("primary", &[]).as_str(),
            "http://127.0.0.1:48334/wallet/primary"
        );
        assert_eq!(
            svc.endpoint("primary", &["tx", "history"]).as_str(),
            "http://127.0.0.1:48334/wallet/primary/tx/history"
        );
        assert_eq!(
            svc.endpoint("primary", &["coin"]).as_str(),
            "http://127.0.0.1:48334/wallet/primary/coin"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let svc = service("https://node.example/api/");
        assert_eq!(
            svc.endpoint("w", &["nested"]).as_str(),
            "https://node.example/api/wallet/w/nested"
        );
    }

    #[test]
    fn endpoint_encodes_segments() {
        let svc = service("http://localhost");
        let url = svc.endpoint("a/b c", &["tx", "h?x"]);
        assert_eq!(url.as_str(), "http://localhost/wallet/a%2Fb%20c/tx/h%3Fx");
    }

    #[test]
    fn invalid_base_url_rejected() {
        assert!(matches!(
            HttpWalletService::new("not a url", DEFAULT_TIMEOUT),
            Err(WalletError::Remote(RemoteError::Transport(_)))
        ));
        assert!(HttpWalletService::new("mailto:ops@example.com", DEFAULT_TIMEOUT).is_err());
    }

    #[test]
    fn decode_success() {
        let coins: Vec<Coin> =
            decode_body(200, r#"[{"hash":"h1","value":1000},{"hash":"h2","value":2000}]"#).unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[1].value, 2000);
    }

    #[test]
    fn decode_error_status() {
        let err = decode_body::<Value>(404, "wallet not found").unwrap_err();
        assert_eq!(
            err,
            WalletError::Remote(RemoteError::Status {
                status: 404,
                body: "wallet not found".into()
            })
        );
    }

    #[test]
    fn decode_malformed_json() {
        let err = decode_body::<ReceiveAddress>(200, r#"{"nope":1}"#).unwrap_err();
        assert!(matches!(err, WalletError::Remote(RemoteError::Decode(_))));
    }
}
