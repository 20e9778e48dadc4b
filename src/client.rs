use std::fmt;
use std::time::Duration;

use tokio::time::sleep;

use crate::{
    normalize, policy, Outcome, ReqwestTransport, Request, Response, Result, RetryConfig,
    Transport, TransportError, TransportOptions,
};

/// Sends one logical request, retrying per a [`RetryConfig`].
///
/// The dispatcher holds no mutable state: every call keeps its own attempt
/// counter and backoff, so one dispatcher can serve concurrent calls.
#[derive(Clone)]
pub struct Dispatcher<T = ReqwestTransport> {
    transport: T,
    config: RetryConfig,
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &std::any::type_name::<T>())
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher<ReqwestTransport> {
    /// Creates a reqwest-backed dispatcher configured from the environment.
    ///
    /// Reads the `RESILIENT_HTTP_*` variables described on
    /// [`RetryConfig::from_env`], plus `RESILIENT_HTTP_TIMEOUT_MS` for the
    /// per-attempt timeout.
    pub fn from_env() -> std::result::Result<Self, String> {
        let config = RetryConfig::from_env()?;
        let mut options = TransportOptions::default();
        if let Ok(value) = std::env::var("RESILIENT_HTTP_TIMEOUT_MS") {
            let timeout_ms = value.trim().parse::<u64>().map_err(|_| {
                format!("RESILIENT_HTTP_TIMEOUT_MS has an invalid value '{value}'")
            })?;
            options.timeout_ms = Some(timeout_ms);
        }
        Ok(Self::new(ReqwestTransport::new().with_options(options)).with_config(config))
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: RetryConfig::default(),
        }
    }

    /// Replaces the config used by [`Dispatcher::dispatch`].
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Dispatches `request` with the dispatcher's own config.
    pub async fn dispatch(&self, request: &Request) -> Result<Response> {
        self.dispatch_with_config(request, &self.config).await
    }

    /// Dispatches `request`, overriding the retry config for this call.
    ///
    /// Returns the first response whose status is not retriable, or the last
    /// response once the attempt budget is used up; HTTP error statuses are
    /// returned, not raised. Fails only with a transport error, either
    /// immediately for a non-retriable code or after the budget runs out.
    ///
    /// Total elapsed time is bounded only by the attempt count. Callers that
    /// need a deadline can wrap the future in `tokio::time::timeout`.
    pub async fn dispatch_with_config(
        &self,
        request: &Request,
        config: &RetryConfig,
    ) -> Result<Response> {
        let mut attempt = 0usize;
        let mut backoff_secs = config.retry_interval_secs;

        loop {
            let result = self.send_once(request).await;

            let outcome = match &result {
                Ok(response) => Outcome::Response(response),
                Err(err) => Outcome::Error(err),
            };
            let decision = policy::should_retry(outcome, attempt, backoff_secs, config);

            if !decision.retry {
                #[cfg(feature = "tracing")]
                if let Err(err) = &result {
                    tracing::debug!("error code = {}", err.code());
                }
                return result;
            }

            #[cfg(feature = "tracing")]
            match &result {
                Ok(response) => tracing::debug!(
                    "Encountered a retriable status code: {}. Message: '{}'. Retrying in {}s (attempt {}/{})",
                    response.status_code,
                    response.status_message,
                    backoff_secs,
                    attempt + 2,
                    config.retry_count
                ),
                Err(err) => tracing::debug!(
                    "Encountered a retriable error: {}. Message: {}. Retrying in {}s (attempt {}/{})",
                    err.code(),
                    err.message(),
                    backoff_secs,
                    attempt + 2,
                    config.retry_count
                ),
            }

            sleep_for(backoff_secs).await;
            attempt += 1;
            backoff_secs = decision.next_backoff_secs;
        }
    }

    async fn send_once(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        #[cfg(feature = "tracing")]
        tracing::debug!("[{}]{}", request.method, request.uri);

        let raw = self.transport.send(request).await?;
        Ok(normalize(raw))
    }
}

/// Suspends the current task for `seconds` without blocking the thread.
pub async fn sleep_for(seconds: u64) {
    if seconds == 0 {
        return;
    }
    sleep(Duration::from_secs(seconds)).await;
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::Dispatcher;
    use crate::{codes, Body, RawResponse, Request, RetryConfig, Transport, TransportError};

    enum Step {
        Status(u16, &'static str),
        Fail(&'static str),
    }

    /// Replays a fixed script of outcomes and counts calls. Repeats the last
    /// step once the script runs out.
    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        last: Mutex<Option<Step>>,
        hits: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                last: Mutex::new(None),
                hits: AtomicUsize::new(0),
            })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        fn render(step: &Step) -> Result<RawResponse, TransportError> {
            match step {
                Step::Status(code, body) => Ok(RawResponse {
                    status_code: Some(*code),
                    status_message: None,
                    headers: Vec::new(),
                    body: Some((*body).to_owned()),
                }),
                Step::Fail(code) => Err(TransportError::new(*code, "scripted failure")),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &Request) -> Result<RawResponse, TransportError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let next = self
                .steps
                .lock()
                .expect("script mutex must not be poisoned")
                .pop_front();
            let mut last = self.last.lock().expect("script mutex must not be poisoned");
            if let Some(step) = next {
                *last = Some(step);
            }
            Self::render(last.as_ref().expect("script must not be empty"))
        }
    }

    fn request() -> Request {
        Request::get("https://example.test/resource")
    }

    #[tokio::test(start_paused = true)]
    async fn returns_success_after_retriable_statuses() {
        let transport = ScriptedTransport::new(vec![
            Step::Status(503, ""),
            Step::Status(503, ""),
            Step::Status(200, r#"{"ok": true}"#),
        ]);
        let dispatcher = Dispatcher::new(transport.clone()).with_config(
            RetryConfig::default()
                .with_retry_count(3)
                .with_retriable_status_codes([503]),
        );

        let start = Instant::now();
        let response = dispatcher.dispatch(&request()).await.expect("must succeed");

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, Body::Json(serde_json::json!({ "ok": true })));
        assert_eq!(transport.hits(), 3);
        // two sleeps: 2s then 6s
        assert_eq!(start.elapsed().as_secs(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retriable_status_is_returned_not_raised() {
        let transport = ScriptedTransport::new(vec![Step::Status(502, "bad gateway")]);
        let dispatcher = Dispatcher::new(transport.clone());

        let start = Instant::now();
        let response = dispatcher.dispatch(&request()).await.expect("must return response");

        assert_eq!(response.status_code, 502);
        assert_eq!(response.body, Body::Text("bad gateway".to_owned()));
        assert_eq!(transport.hits(), 5);
        // 2 + 6 + 14 + 30
        assert_eq!(start.elapsed().as_secs(), 52);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_when_budget_is_zero_or_one() {
        for retry_count in [0, 1] {
            let transport = ScriptedTransport::new(vec![Step::Fail(codes::ETIMEDOUT)]);
            let dispatcher =
                Dispatcher::new(transport.clone()).with_config(RetryConfig::default().with_retry_count(retry_count));

            let start = Instant::now();
            let err = dispatcher.dispatch(&request()).await.expect_err("must fail");

            assert_eq!(err.code(), codes::ETIMEDOUT);
            assert_eq!(transport.hits(), 1);
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_error_fails_immediately() {
        let transport = ScriptedTransport::new(vec![Step::Fail(codes::EINVALIDREQUEST)]);
        let dispatcher = Dispatcher::new(transport.clone());

        let start = Instant::now();
        let err = dispatcher.dispatch(&request()).await.expect_err("must fail");

        assert_eq!(err.code(), codes::EINVALIDREQUEST);
        assert_eq!(transport.hits(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retriable_error_on_every_attempt_exhausts_budget() {
        let transport = ScriptedTransport::new(vec![Step::Fail(codes::ETIMEDOUT)]);
        let dispatcher = Dispatcher::new(transport.clone()).with_config(
            RetryConfig::default()
                .with_retry_count(2)
                .with_retriable_error_codes([codes::ETIMEDOUT]),
        );

        let err = dispatcher.dispatch(&request()).await.expect_err("must fail");

        assert!(err.is_timeout());
        assert_eq!(transport.hits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_outcomes_share_one_counter() {
        let transport = ScriptedTransport::new(vec![
            Step::Fail(codes::ECONNRESET),
            Step::Status(500, ""),
            Step::Fail(codes::ECONNRESET),
            Step::Status(200, ""),
        ]);
        let dispatcher =
            Dispatcher::new(transport.clone()).with_config(RetryConfig::default().with_retry_count(3));

        let start = Instant::now();
        let err = dispatcher.dispatch(&request()).await.expect_err("budget must run out");

        assert_eq!(err.code(), codes::ECONNRESET);
        assert_eq!(transport.hits(), 3);
        assert_eq!(start.elapsed().as_secs(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_status_returns_on_first_attempt() {
        let transport = ScriptedTransport::new(vec![
            Step::Status(401, r#"{"error": "expired"}"#),
            Step::Status(200, ""),
        ]);
        let dispatcher = Dispatcher::new(transport.clone());

        let response = dispatcher.dispatch(&request()).await.expect("must return response");

        assert_eq!(response.status_code, 401);
        assert_eq!(transport.hits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_config_overrides_dispatcher_config() {
        let transport = ScriptedTransport::new(vec![Step::Status(400, ""), Step::Status(200, "")]);
        let dispatcher = Dispatcher::new(transport.clone());
        let config = RetryConfig::default().with_retriable_status_codes([400, 503]);

        let response = dispatcher
            .dispatch_with_config(&request(), &config)
            .await
            .expect("must succeed");

        assert_eq!(response.status_code, 200);
        assert_eq!(transport.hits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_sleeps() {
        let transport = ScriptedTransport::new(vec![Step::Status(503, "")]);
        let dispatcher =
            Dispatcher::new(transport.clone()).with_config(RetryConfig::default().with_retry_interval_secs(0));

        let start = Instant::now();
        let response = dispatcher.dispatch(&request()).await.expect("must return response");

        assert_eq!(response.status_code, 503);
        assert_eq!(transport.hits(), 5);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_dispatches_keep_separate_state() {
        let slow = ScriptedTransport::new(vec![Step::Status(503, "")]);
        let fast = ScriptedTransport::new(vec![Step::Status(204, "")]);
        let slow_dispatcher = Dispatcher::new(slow.clone());
        let fast_dispatcher = Dispatcher::new(fast.clone());

        let slow_task = tokio::spawn(async move { slow_dispatcher.dispatch(&request()).await });
        let fast_task = tokio::spawn(async move {
            let response = fast_dispatcher.dispatch(&request()).await;
            (response, Instant::now())
        });

        let start = Instant::now();
        let (fast_response, fast_done) = fast_task.await.expect("fast task must join");
        let slow_response = slow_task.await.expect("slow task must join");

        assert_eq!(fast_response.expect("must succeed").status_code, 204);
        assert!(fast_done.duration_since(start) < Duration::from_secs(2));
        assert_eq!(slow_response.expect("must return response").status_code, 503);
        assert_eq!(slow.hits(), 5);
        assert_eq!(fast.hits(), 1);
    }

    #[test]
    fn debug_names_transport_type() {
        let dispatcher = Dispatcher::new(ScriptedTransport::new(vec![Step::Status(200, "")]));
        let debug = format!("{dispatcher:?}");
        assert!(debug.contains("ScriptedTransport"));
        assert!(debug.contains("retry_count: 5"));
    }
}
