//! Text generation: the [`Generator`] seam, a retrying wrapper, and the
//! Anthropic-backed implementation.

use aidm_llm::{Client, Message, Request, StreamEvent};
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

/// Error type for text generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Worth retrying: network trouble, rate limits, server errors.
    #[error("Transient generation failure: {0}")]
    Transient(String),

    /// Retrying will not help: bad credentials, malformed request.
    #[error("Generation failed: {0}")]
    Terminal(String),

    #[error("Generation failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }
}

impl From<aidm_llm::Error> for GenerationError {
    fn from(err: aidm_llm::Error) -> Self {
        if err.is_transient() {
            GenerationError::Transient(err.to_string())
        } else {
            GenerationError::Terminal(err.to_string())
        }
    }
}

/// Anything that can turn a conversation into text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply to `messages`.
    ///
    /// With `stream_display` set, the text is shown to the player as it
    /// arrives; the full text is returned either way.
    async fn generate(
        &self,
        messages: &[Message],
        stream_display: bool,
    ) -> Result<String, GenerationError>;
}

/// Backoff settings for [`RetryingGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on exponential growth, in milliseconds.
    pub max_delay_ms: u64,
    /// Random spread (0.0-1.0) applied around each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No delays; useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped, with jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
        let capped = exponential.min(self.max_delay_ms);

        let jitter_range = (capped as f64 * self.jitter_factor.clamp(0.0, 1.0)) as i64;
        let millis = if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        };
        Duration::from_millis(millis)
    }
}

/// Shown between a streamed attempt that broke off and the next one.
pub const RETRY_NOTICE: &str = "[Connection lost. Retrying; the passage starts over.]";

type Notice = Box<dyn Fn(&str) + Send + Sync>;

/// Wraps a generator with exponential-backoff retries on transient errors.
///
/// A retried streamed call has already shown part of its text, so the
/// player is told before the passage starts over.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
    notice: Notice,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            notice: Box::new(print_notice),
        }
    }

    /// Send retry notices somewhere other than stdout.
    pub fn with_notice(mut self, notice: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.notice = Box::new(notice);
        self
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(
        &self,
        messages: &[Message],
        stream_display: bool,
    ) -> Result<String, GenerationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last = None;

        for attempt in 1..=max_attempts {
            match self.inner.generate(messages, stream_display).await {
                Ok(text) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Generation succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) if !e.is_transient() => {
                    tracing::error!(error = %e, "Generation failed with non-retryable error");
                    return Err(e);
                }
                Err(e) => {
                    if attempt < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        tracing::warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Generation failed, retrying..."
                        );
                        if stream_display {
                            (self.notice)(RETRY_NOTICE);
                        }
                        tokio::time::sleep(delay).await;
                    }
                    last = Some(e);
                }
            }
        }

        let last = last.map(|e| e.to_string()).unwrap_or_default();
        tracing::error!(attempts = max_attempts, error = %last, "Generation failed after all retry attempts");
        Err(GenerationError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}

// Streamed text goes to stdout, so the notice follows it there.
fn print_notice(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "\n{text}");
    let _ = stdout.flush();
}

/// Request settings for [`ClaudeGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_tokens: usize,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: None,
            system: Some(
                "You are the game master of a text role-playing game. \
                 Follow the requested output format exactly; the game parses it."
                    .to_string(),
            ),
        }
    }
}

impl GatewayConfig {
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Generator backed by the Anthropic Messages API.
pub struct ClaudeGateway {
    client: Client,
    config: GatewayConfig,
}

impl ClaudeGateway {
    pub fn new(client: Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, messages: &[Message]) -> Request {
        let mut request =
            Request::new(messages.to_vec()).with_max_tokens(self.config.max_tokens);
        if let Some(system) = &self.config.system {
            request = request.with_system(system.clone());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    async fn stream_to_stdout(&self, request: &Request) -> Result<String, GenerationError> {
        let mut stream = self.client.stream(request).await?;
        let mut text = String::new();
        let mut stdout = std::io::stdout();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text: chunk } => {
                    // Display is best effort; the text is kept regardless.
                    let _ = write!(stdout, "{chunk}");
                    let _ = stdout.flush();
                    text.push_str(&chunk);
                }
                StreamEvent::Error { message } => {
                    let _ = writeln!(stdout);
                    return Err(GenerationError::Transient(message));
                }
                StreamEvent::MessageStop => break,
                _ => {}
            }
        }
        let _ = writeln!(stdout);
        Ok(text)
    }
}

#[async_trait]
impl Generator for ClaudeGateway {
    async fn generate(
        &self,
        messages: &[Message],
        stream_display: bool,
    ) -> Result<String, GenerationError> {
        let request = self.request(messages);
        tracing::debug!(
            model = self.client.model(),
            messages = messages.len(),
            stream_display,
            "Generating"
        );

        let text = if stream_display {
            self.stream_to_stdout(&request).await?
        } else {
            self.client.complete(&request).await?.text
        };

        if text.trim().is_empty() {
            return Err(GenerationError::Transient("empty response".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    struct Flaky {
        failures_remaining: AtomicU32,
        error: GenerationError,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, error: GenerationError) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failures),
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Generator for Flaky {
        async fn generate(&self, _: &[Message], _: bool) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn prompt() -> Vec<Message> {
        vec![Message::user("hello")]
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let gen = RetryingGenerator::new(
            Flaky::new(2, GenerationError::Transient("503".into())),
            RetryPolicy::immediate(3),
        );
        assert_eq!(gen.generate(&prompt(), false).await.unwrap(), "ok");
        assert_eq!(gen.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_streamed_retry_shows_notice() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let gen = RetryingGenerator::new(
            Flaky::new(2, GenerationError::Transient("stream reset".into())),
            RetryPolicy::immediate(3),
        )
        .with_notice(move |text| sink.lock().unwrap().push(text.to_string()));

        assert_eq!(gen.generate(&prompt(), true).await.unwrap(), "ok");
        assert_eq!(*seen.lock().unwrap(), vec![RETRY_NOTICE, RETRY_NOTICE]);

        // Nothing was displayed, so there is nothing to interrupt.
        seen.lock().unwrap().clear();
        let quiet = RetryingGenerator::new(
            Flaky::new(1, GenerationError::Transient("503".into())),
            RetryPolicy::immediate(3),
        )
        .with_notice({
            let sink = Arc::clone(&seen);
            move |text| sink.lock().unwrap().push(text.to_string())
        });
        quiet.generate(&prompt(), false).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_after_max_attempts() {
        let gen = RetryingGenerator::new(
            Flaky::new(10, GenerationError::Transient("timeout".into())),
            RetryPolicy::immediate(3),
        );
        let err = gen.generate(&prompt(), false).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Exhausted {
                attempts: 3,
                last: "Transient generation failure: timeout".into()
            }
        );
        assert_eq!(gen.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let gen = RetryingGenerator::new(
            Flaky::new(10, GenerationError::Terminal("401".into())),
            RetryPolicy::immediate(3),
        );
        let err = gen.generate(&prompt(), false).await.unwrap_err();
        assert_eq!(err, GenerationError::Terminal("401".into()));
        assert_eq!(gen.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let ms = policy.delay_for(1).as_millis();
            assert!((800..=1200).contains(&ms));
        }
    }

    #[test]
    fn test_client_error_mapping() {
        let transient: GenerationError = aidm_llm::Error::Api {
            status: 529,
            message: "overloaded".into(),
        }
        .into();
        assert!(transient.is_transient());

        let terminal: GenerationError = aidm_llm::Error::Api {
            status: 401,
            message: "bad key".into(),
        }
        .into();
        assert!(!terminal.is_transient());
    }
}
