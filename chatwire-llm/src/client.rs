//! The resilient chat client.

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::endpoint::{self, DnsProbe, Endpoint, HostProbe};
use crate::error::Result;
use crate::normalize;
use crate::request::{self, CompletionRequest, Overrides, RequestDefaults};
use crate::retry::{self, HttpRequest, Transport};
use crate::settings::{ClientArgs, ClientConfig};
use crate::transport::ReqwestTransport;
use crate::types::{CompletionInput, CompletionResult};

/// Calls one OpenAI-compatible chat-completions endpoint.
///
/// Holds no per-call state; share it behind an `Arc` across tasks.
pub struct ChatClient<T = ReqwestTransport, P = DnsProbe> {
    config: ClientConfig,
    endpoint: Endpoint,
    transport: T,
    probe: P,
}

impl<T, P> std::fmt::Debug for ChatClient<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Build a client with the production transport and DNS probe.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`](crate::LlmError::Config) if the base URL
    /// is unusable or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_parts(config, ReqwestTransport::new()?, DnsProbe)
    }
}

impl<T: Transport, P: HostProbe> ChatClient<T, P> {
    /// Build a client from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`](crate::LlmError::Config) if the base URL
    /// is unusable.
    pub fn with_parts(config: ClientConfig, transport: T, probe: P) -> Result<Self> {
        let endpoint = endpoint::resolve_endpoint(config.base_url())?;
        debug!(url = %endpoint.url, host = %endpoint.host, "Chat client ready");
        Ok(Self {
            config,
            endpoint,
            transport,
            probe,
        })
    }

    /// Resolved endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Complete `input`.
    ///
    /// # Errors
    ///
    /// See [`ChatClient::complete_with_cancel`].
    pub async fn complete(
        &self,
        input: impl Into<CompletionInput>,
        overrides: &Overrides,
    ) -> Result<CompletionResult> {
        self.complete_with_cancel(input, overrides, &CancellationToken::new())
            .await
    }

    /// Complete `input`, stopping between attempts once `cancel` fires.
    ///
    /// Request construction and the host probe both happen before the first
    /// HTTP attempt, so their errors never consume retry budget.
    ///
    /// # Errors
    ///
    /// - [`LlmError::Config`](crate::LlmError::Config) /
    ///   [`LlmError::InvalidRequest`](crate::LlmError::InvalidRequest) before
    ///   any I/O.
    /// - [`LlmError::Resolution`](crate::LlmError::Resolution) if the host
    ///   does not resolve.
    /// - [`LlmError::RetriesExhausted`](crate::LlmError::RetriesExhausted) or
    ///   [`LlmError::Cancelled`](crate::LlmError::Cancelled) from the retry
    ///   loop.
    pub async fn complete_with_cancel(
        &self,
        input: impl Into<CompletionInput>,
        overrides: &Overrides,
        cancel: &CancellationToken,
    ) -> Result<CompletionResult> {
        let call_id = Uuid::new_v4();
        let span = info_span!("chat_completion", %call_id, host = %self.endpoint.host);
        self.run(input.into(), overrides, cancel).instrument(span).await
    }

    async fn run(
        &self,
        input: CompletionInput,
        overrides: &Overrides,
        cancel: &CancellationToken,
    ) -> Result<CompletionResult> {
        let defaults = RequestDefaults {
            model: self.config.default_model(),
            temperature: self.config.default_temperature(),
        };
        let completion = CompletionRequest::build(input, overrides, defaults)?;
        let headers = request::auth_headers(self.config.api_key())?;

        endpoint::validate_host(&self.probe, &self.endpoint).await?;

        let http_request = HttpRequest {
            url: self.endpoint.url.clone(),
            headers,
            body: completion.to_payload(),
        };
        let policy = self.config.retry_policy(overrides.timeout);

        debug!(
            model = completion.model(),
            messages = completion.messages().len(),
            max_retries = policy.max_retries,
            "Sending chat completion"
        );

        let response = retry::execute(&self.transport, &http_request, &policy, cancel).await?;
        let result = normalize::normalize(&response.body);

        info!(
            status = response.status,
            choices = result.choices().len(),
            "Chat completion succeeded"
        );
        Ok(result)
    }
}

/// One-shot completion: resolve configuration from `args` and the process
/// environment, then call the provider with the production transport.
///
/// # Errors
///
/// Same as [`ChatClient::complete_with_cancel`], plus
/// [`LlmError::Config`](crate::LlmError::Config) when the API key or base URL
/// is missing.
pub async fn complete(
    input: impl Into<CompletionInput>,
    args: ClientArgs,
    overrides: &Overrides,
) -> Result<CompletionResult> {
    let config = ClientConfig::from_env(args)?;
    ChatClient::new(config)?.complete(input, overrides).await
}

/// One-shot completion with an injected environment, transport and probe.
///
/// # Errors
///
/// Same as [`complete`].
pub async fn complete_with<F, T, P>(
    input: impl Into<CompletionInput>,
    args: ClientArgs,
    env: F,
    overrides: &Overrides,
    transport: T,
    probe: P,
) -> Result<CompletionResult>
where
    F: Fn(&str) -> Option<String>,
    T: Transport,
    P: HostProbe,
{
    let config = ClientConfig::resolve(args, env)?;
    ChatClient::with_parts(config, transport, probe)?
        .complete(input, overrides)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::error::{LlmError, TransportFailure};
    use crate::retry::HttpResponse;
    use crate::types::Message;

    /// Records every request and replays scripted outcomes; answers the last
    /// outcome forever once the script runs out.
    #[derive(Clone, Default)]
    struct SpyTransport {
        calls: Arc<AtomicU32>,
        seen: Arc<Mutex<Vec<HttpRequest>>>,
        script: Arc<Mutex<Vec<std::result::Result<HttpResponse, TransportFailure>>>>,
    }

    impl SpyTransport {
        fn answering(body: &str) -> Self {
            Self::scripted(vec![Ok(HttpResponse {
                status: 200,
                body: body.to_string(),
            })])
        }

        fn scripted(mut outcomes: Vec<std::result::Result<HttpResponse, TransportFailure>>) -> Self {
            outcomes.reverse();
            Self {
                script: Arc::new(Mutex::new(outcomes)),
                ..Self::default()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for SpyTransport {
        async fn post(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request.clone());
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop().unwrap_or(Err(TransportFailure::Request("empty script".into())))
            } else {
                script
                    .last()
                    .cloned()
                    .unwrap_or(Err(TransportFailure::Request("empty script".into())))
            }
        }
    }

    #[derive(Clone, Default)]
    struct StubProbe {
        fail: bool,
        calls: Arc<AtomicU32>,
    }

    impl HostProbe for StubProbe {
        async fn probe(&self, _host: &str, _port: u16) -> std::result::Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("name or service not known".into())
            } else {
                Ok(())
            }
        }
    }

    fn args() -> ClientArgs {
        ClientArgs {
            api_key: Some("sk-test".into()),
            base_url: Some("https://api.example.com/".into()),
            model: Some("test-model".into()),
            backoff_base: Some(Duration::from_millis(10)),
            ..ClientArgs::default()
        }
    }

    fn client(transport: SpyTransport, probe: StubProbe) -> ChatClient<SpyTransport, StubProbe> {
        let config = ClientConfig::resolve(args(), |_| None).expect("config");
        ChatClient::with_parts(config, transport, probe).expect("client")
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_network_call() {
        let transport = SpyTransport::answering(r#"{"text":"never"}"#);
        let probe = StubProbe::default();
        let args = ClientArgs {
            api_key: None,
            ..args()
        };

        let err = complete_with("ping", args, |_| None, &Overrides::default(), transport.clone(), probe.clone())
            .await
            .expect_err("should fail");

        assert!(matches!(err, LlmError::Config(_)));
        assert_eq!(transport.calls(), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn schemeless_base_url_fails_before_any_network_call() {
        for base_url in ["api.example.com", "ftp://x"] {
            let transport = SpyTransport::answering(r#"{"text":"never"}"#);
            let probe = StubProbe::default();
            let args = ClientArgs {
                base_url: Some(base_url.into()),
                max_retries: Some(3),
                ..args()
            };

            let err = complete_with("ping", args, |_| None, &Overrides::default(), transport.clone(), probe.clone())
                .await
                .expect_err("should fail");

            match err {
                LlmError::Config(msg) => assert!(msg.contains("http:// or https://"), "{msg}"),
                other => panic!("{base_url}: unexpected error {other:?}"),
            }
            assert_eq!(transport.calls(), 0);
            assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_and_payload_to_resolved_endpoint() {
        let transport = SpyTransport::answering(r#"{"choices":[{"message":{"content":"pong"}}]}"#);
        let client = client(transport.clone(), StubProbe::default());

        let conversation = vec![Message::system("terse"), Message::user("ping")];
        let result = client
            .complete(conversation, &Overrides::default().with_max_tokens(16))
            .await
            .expect("complete");

        assert_eq!(result.first_text(), "pong");

        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 1);
        let sent = &seen[0];
        assert_eq!(sent.url, "https://api.example.com/v1/chat/completions");
        assert!(sent.headers.contains(&("Authorization".into(), "Bearer sk-test".into())));
        assert!(sent.headers.contains(&("Content-Type".into(), "application/json".into())));
        assert_eq!(sent.body["model"], "test-model");
        assert_eq!(sent.body["max_tokens"], 16);
        assert_eq!(sent.body["messages"][0]["role"], "system");
        assert_eq!(sent.body["messages"][1]["content"], "ping");
    }

    #[tokio::test]
    async fn unresolvable_host_fails_without_http_attempts() {
        let transport = SpyTransport::answering(r#"{"text":"never"}"#);
        let probe = StubProbe {
            fail: true,
            ..StubProbe::default()
        };
        let client = client(transport.clone(), probe);

        let err = client
            .complete("ping", &Overrides::default())
            .await
            .expect_err("should fail");

        match err {
            LlmError::Resolution { host, .. } => assert_eq!(host, "api.example.com"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_input_fails_before_probe() {
        let transport = SpyTransport::answering("{}");
        let probe = StubProbe::default();
        let client = client(transport.clone(), probe.clone());

        let err = client
            .complete(CompletionInput::default(), &Overrides::default())
            .await
            .expect_err("should fail");

        assert!(matches!(err, LlmError::InvalidRequest(_)));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_normalized() {
        let transport = SpyTransport::scripted(vec![
            Err(TransportFailure::Connect("reset".into())),
            Ok(HttpResponse {
                status: 502,
                body: "bad gateway".into(),
            }),
            Ok(HttpResponse {
                status: 200,
                body: "plain text reply".into(),
            }),
        ]);
        let client = client(transport.clone(), StubProbe::default());

        let result = client
            .complete("ping", &Overrides::default())
            .await
            .expect("complete");

        assert_eq!(result.first_text(), "plain text reply");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts() {
        let transport = SpyTransport::scripted(vec![Ok(HttpResponse {
            status: 500,
            body: "boom".into(),
        })]);
        let client = client(transport.clone(), StubProbe::default());

        let err = client
            .complete("ping", &Overrides::default())
            .await
            .expect_err("should exhaust");

        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn verbatim_endpoint_is_not_extended() {
        let config = ClientConfig::resolve(
            ClientArgs {
                base_url: Some("https://proxy.example.com/openai/chat/completions".into()),
                ..args()
            },
            |_| None,
        )
        .expect("config");
        let transport = SpyTransport::answering(r#"{"text":"ok"}"#);
        let client = ChatClient::with_parts(config, transport.clone(), StubProbe::default()).expect("client");

        client.complete("ping", &Overrides::default()).await.expect("complete");
        assert_eq!(
            transport.seen.lock()[0].url,
            "https://proxy.example.com/openai/chat/completions"
        );
    }
}
