//! Request executor: select a model, call it, classify failures, retry.
//!
//! One call walks `SELECT → ATTEMPT → {SUCCESS | CLASSIFY}` until a
//! response is accepted or the task's attempt budget runs out. The budget
//! is shared by every failure kind.

use std::sync::Arc;
use std::time::Duration;

use modelrelay_core::catalog::{Catalog, ModelDescriptor, ProviderDescriptor, TaskProfile};
use modelrelay_core::error::{DispatchError, ProviderError, Result};
use modelrelay_core::event::{
    COMPLETIONS_ENDPOINT, EMBEDDINGS_ENDPOINT, NoopRecorder, UsageEvent, UsageRecorder,
};
use modelrelay_core::provider::{CompletionRequest, ProviderClient, RequestContext, Response};
use modelrelay_providers::ClientRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{self, RetryAction};
use crate::compressor::{MessageCompressor, TruncatingCompressor};
use crate::ledger::UsageLedger;
use crate::reasoning;

/// What is being asked of the provider.
enum Work {
    Completion(RequestContext),
    Embedding(String),
}

impl Work {
    fn endpoint(&self) -> &'static str {
        match self {
            Self::Completion(_) => COMPLETIONS_ENDPOINT,
            Self::Embedding(_) => EMBEDDINGS_ENDPOINT,
        }
    }
}

/// Dispatches logical tasks to concrete provider calls.
///
/// Cheap to share behind an `Arc`; concurrent calls only contend on the
/// ledger's per-model counters.
pub struct RequestExecutor {
    catalog: Arc<Catalog>,
    registry: ClientRegistry,
    ledger: Arc<UsageLedger>,
    compressor: Arc<dyn MessageCompressor>,
    recorder: Arc<dyn UsageRecorder>,
}

impl RequestExecutor {
    /// An executor with a fresh ledger, the truncating compressor and no
    /// usage recorder.
    pub fn new(catalog: Arc<Catalog>, registry: ClientRegistry) -> Self {
        Self {
            catalog,
            registry,
            ledger: Arc::new(UsageLedger::new()),
            compressor: Arc::new(TruncatingCompressor::default()),
            recorder: Arc::new(NoopRecorder),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn MessageCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn UsageRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Look up a task profile by name.
    pub fn task(&self, name: &str) -> Option<&TaskProfile> {
        self.catalog.task(name)
    }

    /// Run a text completion for a task.
    pub async fn generate(&self, profile: &TaskProfile, context: RequestContext) -> Result<Response> {
        self.generate_with_cancel(profile, context, &CancellationToken::new())
            .await
    }

    /// Run a text completion that stops as soon as `token` is cancelled.
    pub async fn generate_with_cancel(
        &self,
        profile: &TaskProfile,
        context: RequestContext,
        token: &CancellationToken,
    ) -> Result<Response> {
        self.run(profile, Work::Completion(context), token).await
    }

    /// Embed a piece of text with a task's models.
    pub async fn embed(&self, profile: &TaskProfile, text: &str) -> Result<Response> {
        self.embed_with_cancel(profile, text, &CancellationToken::new())
            .await
    }

    pub async fn embed_with_cancel(
        &self,
        profile: &TaskProfile,
        text: &str,
        token: &CancellationToken,
    ) -> Result<Response> {
        self.run(profile, Work::Embedding(text.to_string()), token)
            .await
    }

    async fn run(
        &self,
        profile: &TaskProfile,
        mut work: Work,
        token: &CancellationToken,
    ) -> Result<Response> {
        let task = profile.name.as_str();
        let mut attempts_left = profile.retry_budget;
        let mut attempt: u32 = 0;
        let mut compressed = false;
        let mut last: Option<ProviderError> = None;

        while attempts_left > 0 {
            attempt += 1;
            attempts_left -= 1;

            let model_id = self.ledger.select(profile)?;
            let (model, provider) = self.catalog.resolve_model(model_id)?;
            let client = self.registry.resolve(provider).inspect_err(|e| {
                error!(task, model = model_id, attempt, error = %e, "Cannot resolve client");
            })?;

            debug!(task, model = model_id, provider = %provider.id, attempt, "Dispatching attempt");

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ProviderError::Aborted("request cancelled".into())),
                r = Self::call(client.as_ref(), model, profile, &work) => r,
            };

            let error = match outcome.and_then(|resp| accept(&work, resp)) {
                Ok(response) => {
                    return Ok(self.finish(profile, model, provider, &work, response));
                }
                Err(e) => e,
            };

            self.ledger.record_failure(model_id);

            let interval = retry_interval(provider, profile);
            // a payload that cannot be compressed gets no compression retry
            let no_compress = compressed || matches!(work, Work::Embedding(_));
            let action = classifier::classify(&error, attempts_left, no_compress, interval);
            log_failure(task, model_id, attempt, attempts_left, &error, action);

            match action {
                RetryAction::Wait(delay) => {
                    last = Some(error);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            return Err(DispatchError::Failed {
                                task: task.to_string(),
                                model: model_id.to_string(),
                                source: ProviderError::Aborted("cancelled during backoff".into()),
                            });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryAction::CompressAndRetry => {
                    let Work::Completion(context) = &mut work else {
                        return Err(terminal(task, model_id, attempt, attempts_left, true, error));
                    };
                    match self.compressor.compress(&context.messages).await {
                        Ok(messages) => {
                            info!(
                                task,
                                model = model_id,
                                before = context.messages.len(),
                                after = messages.len(),
                                "Compressed conversation after payload rejection"
                            );
                            context.messages = messages;
                            compressed = true;
                            last = Some(error);
                        }
                        Err(reason) => {
                            error!(task, model = model_id, %reason, "Compression failed");
                            return Err(terminal(
                                task,
                                model_id,
                                attempt,
                                attempts_left,
                                no_compress,
                                error,
                            ));
                        }
                    }
                }
                RetryAction::Abort => {
                    return Err(terminal(
                        task,
                        model_id,
                        attempt,
                        attempts_left,
                        no_compress,
                        error,
                    ));
                }
            }
        }

        error!(task, attempts = attempt, "Retry budget exhausted");
        Err(DispatchError::RequestExhausted {
            task: task.to_string(),
            attempts: attempt,
            last,
        })
    }

    async fn call(
        client: &dyn ProviderClient,
        model: &ModelDescriptor,
        profile: &TaskProfile,
        work: &Work,
    ) -> std::result::Result<Response, ProviderError> {
        match work {
            Work::Completion(ctx) => {
                let request = CompletionRequest {
                    messages: &ctx.messages,
                    tools: &ctx.tools,
                    response_format: ctx.response_format.as_ref(),
                    max_tokens: ctx.max_tokens.unwrap_or(profile.max_tokens),
                    temperature: ctx.temperature.unwrap_or(profile.temperature),
                };
                client.complete(model, request).await
            }
            Work::Embedding(text) => client.embed(model, text).await,
        }
    }

    /// Account for an accepted response and stamp where it came from.
    fn finish(
        &self,
        profile: &TaskProfile,
        model: &ModelDescriptor,
        provider: &ProviderDescriptor,
        work: &Work,
        mut response: Response,
    ) -> Response {
        let usage = response.usage.unwrap_or_default();
        self.ledger.record_success(&model.id, &usage);

        response.model_id = model.id.clone();
        response.provider_id = provider.id.clone();

        info!(
            task = %profile.name,
            model = %model.id,
            provider = %provider.id,
            total_tokens = usage.total_tokens,
            "Request succeeded"
        );

        let event = UsageEvent::new(&model.id, &provider.id, &profile.name, work.endpoint(), usage);
        if let Err(e) = self.recorder.record(event) {
            warn!(task = %profile.name, model = %model.id, error = %e, "Usage recorder failed");
        }

        response
    }
}

/// Strip inline reasoning and decide whether a reply counts as a success.
fn accept(work: &Work, mut response: Response) -> std::result::Result<Response, ProviderError> {
    match work {
        Work::Completion(_) => {
            if response.reasoning.is_none() {
                if let Some(text) = response.text.take() {
                    let (visible, thought) = reasoning::extract_reasoning(&text);
                    response.text = Some(visible);
                    response.reasoning = (!thought.is_empty()).then_some(thought);
                }
            }
            if response.has_text() || response.has_tool_calls() {
                Ok(response)
            } else {
                Err(ProviderError::EmptyResponse(
                    "reply has neither text nor tool calls".into(),
                ))
            }
        }
        Work::Embedding(_) => {
            if response.embedding.as_ref().is_some_and(|v| !v.is_empty()) {
                Ok(response)
            } else {
                Err(ProviderError::EmptyResponse("reply has no embedding vector".into()))
            }
        }
    }
}

fn retry_interval(provider: &ProviderDescriptor, profile: &TaskProfile) -> Duration {
    let secs = if provider.retry_interval > 0 {
        provider.retry_interval
    } else {
        profile.retry_interval
    };
    Duration::from_secs(secs)
}

fn log_failure(
    task: &str,
    model: &str,
    attempt: u32,
    attempts_left: u32,
    error: &ProviderError,
    action: RetryAction,
) {
    let kind = error.kind();
    let hint = match error {
        ProviderError::ApiError { status_code, .. } => classifier::describe_status(*status_code),
        _ => "",
    };
    match action {
        RetryAction::Wait(delay) => warn!(
            task, model, attempt, attempts_left, %kind, %error, hint,
            "Attempt failed, retrying in {}s", delay.as_secs()
        ),
        RetryAction::CompressAndRetry => warn!(
            task, model, attempt, attempts_left, %kind, %error, hint,
            "Payload too large, compressing and retrying"
        ),
        RetryAction::Abort => error!(
            task, model, attempt, attempts_left, %kind, %error, hint,
            "Attempt failed, giving up"
        ),
    }
}

/// The error surfaced for an aborted call.
///
/// Only a failure that another attempt would have retried reports
/// exhaustion. Everything else, including a 413 once compression is spent,
/// is a terminal failure of the model that produced it.
fn terminal(
    task: &str,
    model: &str,
    attempt: u32,
    attempts_left: u32,
    no_compress: bool,
    error: ProviderError,
) -> DispatchError {
    let retry_with_budget = classifier::classify(&error, 1, no_compress, Duration::ZERO);
    if attempts_left == 0 && retry_with_budget != RetryAction::Abort {
        DispatchError::RequestExhausted {
            task: task.to_string(),
            attempts: attempt,
            last: Some(error),
        }
    } else {
        DispatchError::Failed {
            task: task.to_string(),
            model: model.to_string(),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrelay_core::message::ToolCall;

    fn completion() -> Work {
        Work::Completion(RequestContext::from_prompt("hi"))
    }

    #[test]
    fn inline_reasoning_is_split() {
        let resp = accept(&completion(), Response::text("<think>hmm</think>Hello")).unwrap();
        assert_eq!(resp.text.as_deref(), Some("Hello"));
        assert_eq!(resp.reasoning.as_deref(), Some("hmm"));
    }

    #[test]
    fn first_class_reasoning_is_untouched() {
        let mut r = Response::text("<think>x</think>y");
        r.reasoning = Some("native".into());
        let resp = accept(&completion(), r).unwrap();
        assert_eq!(resp.text.as_deref(), Some("<think>x</think>y"));
        assert_eq!(resp.reasoning.as_deref(), Some("native"));
    }

    #[test]
    fn reasoning_only_reply_is_empty() {
        let err = accept(&completion(), Response::text("<think>all thought</think>")).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }

    #[test]
    fn tool_calls_without_text_succeed() {
        let mut r = Response::default();
        r.tool_calls = Some(vec![ToolCall {
            id: "1".into(),
            name: "lookup".into(),
            arguments: "{}".into(),
        }]);
        assert!(accept(&completion(), r).is_ok());
    }

    #[test]
    fn empty_embedding_is_rejected() {
        let work = Work::Embedding("x".into());
        assert!(accept(&work, Response::embedding(vec![])).is_err());
        assert!(accept(&work, Response::text("not a vector")).is_err());
        assert!(accept(&work, Response::embedding(vec![0.1, 0.2])).is_ok());
    }

    #[test]
    fn terminal_distinguishes_exhaustion() {
        let net = ProviderError::Network("down".into());
        assert!(matches!(
            terminal("t", "m", 3, 0, false, net.clone()),
            DispatchError::RequestExhausted { attempts: 3, .. }
        ));
        assert!(matches!(
            terminal("t", "m", 1, 2, false, ProviderError::Aborted("x".into())),
            DispatchError::Failed { .. }
        ));
        let auth = ProviderError::ApiError {
            status_code: 401,
            message: String::new(),
        };
        assert!(matches!(
            terminal("t", "m", 1, 0, false, auth),
            DispatchError::Failed { .. }
        ));
    }

    #[test]
    fn spent_compression_is_failure_not_exhaustion() {
        let too_large = ProviderError::ApiError {
            status_code: 413,
            message: String::new(),
        };
        assert!(matches!(
            terminal("t", "m", 2, 0, true, too_large.clone()),
            DispatchError::Failed { .. }
        ));
        assert!(matches!(
            terminal("t", "m", 1, 0, false, too_large),
            DispatchError::RequestExhausted { attempts: 1, .. }
        ));
    }

    #[test]
    fn provider_interval_wins_over_profile() {
        let profile = TaskProfile::new("t", vec!["m".into()])
            .unwrap()
            .with_retry(2, 30);
        let provider = ProviderDescriptor::new("p", "openai").with_retry(2, 5);
        assert_eq!(retry_interval(&provider, &profile), Duration::from_secs(5));
        let provider = provider.with_retry(2, 0);
        assert_eq!(retry_interval(&provider, &profile), Duration::from_secs(30));
    }
}
