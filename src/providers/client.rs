use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::ports::ProviderError;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// JSON-over-HTTP client shared by the provider adapters.
///
/// Calls go through a consecutive-failures circuit breaker so a provider that
/// is down fails fast instead of holding the settlement lock for a full
/// request timeout.
#[derive(Clone)]
pub struct ProviderClient {
    name: &'static str,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    circuit_breaker: Breaker,
}

impl ProviderClient {
    pub fn new(name: &'static str, base_url: String, api_key: Option<String>) -> Self {
        Self::with_circuit_breaker(name, base_url, api_key, 3, 60)
    }

    pub fn with_circuit_breaker(
        name: &'static str,
        base_url: String,
        api_key: Option<String>,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            name,
            client,
            base_url,
            api_key,
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub async fn get_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + Send,
    {
        let request = self.request(Method::GET, path).query(query);
        let response = self.execute(request, path).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send,
    {
        let request = self.request(Method::POST, path).json(body);
        let response = self.execute(request, path).await?;
        Ok(response.json::<T>().await?)
    }

    /// POST whose response body is ignored.
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<(), ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let request = self.request(Method::POST, path).json(body);
        self.execute(request, path).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<Response, ProviderError> {
        let target = format!("{} {}", self.name, path);

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                let status = response.status();

                if status == StatusCode::NOT_FOUND {
                    return Err(ProviderError::NotFound(target));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(response)
            })
            .await;

        match result {
            Ok(response) => Ok(response),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitBreakerOpen(format!(
                "{} circuit breaker is open",
                self.name
            ))),
            Err(FailsafeError::Inner(e)) => {
                tracing::warn!(provider = self.name, error = %e, "Provider call failed");
                Err(e)
            }
        }
    }
}
