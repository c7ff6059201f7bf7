//! The bounded planner/tool loop.
//!
//! One [`Orchestrator::run`] call handles one request:
//!
//! ```text
//! AwaitingPlanner --content--> Done
//! AwaitingPlanner --tool calls--> DispatchingTools --results--> AwaitingPlanner
//! AwaitingPlanner --fatal error / round limit / cancel--> Failed
//! ```
//!
//! `Failed` is the `Err` side of the returned result.

use std::collections::HashSet;
use std::time::Duration;

use backoff::backoff::Backoff;
use policy::CallerContext;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::conversation::Conversation;
use crate::model::{ModelClient, ModelError, ModelRequest, PlannerOutcome, ToolCall};
use crate::retry::RetryPolicy;
use crate::tools::{Dispatcher, ToolBackend, ToolRegistry};
use crate::{Error, Result};

/// Limits for a single run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of tool rounds before giving up.
    pub max_rounds: u32,
    /// Timeout for one planner call attempt.
    pub model_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            model_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// A successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The planner's final answer.
    pub text: String,
    /// Tool rounds it took to get there.
    pub rounds: u32,
}

enum State {
    AwaitingPlanner,
    DispatchingTools(Vec<ToolCall>),
    Done(String),
}

/// Drives the planner and the dispatcher for one request at a time.
///
/// Holds no per-request state, so one instance can serve concurrent
/// requests.
pub struct Orchestrator<M, B> {
    model: M,
    dispatcher: Dispatcher<B>,
    config: OrchestratorConfig,
}

impl<M: ModelClient, B: ToolBackend> Orchestrator<M, B> {
    pub fn new(model: M, dispatcher: Dispatcher<B>, config: OrchestratorConfig) -> Self {
        Self {
            model,
            dispatcher,
            config,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer `request_text` on behalf of the caller described by `ctx`.
    ///
    /// Every outbound call is bounded by `deadline`. Cancelling `cancel`
    /// abandons whatever is in flight and yields [`Error::Cancelled`].
    #[instrument(skip_all, fields(max_rounds = self.config.max_rounds))]
    pub async fn run(
        &self,
        request_text: &str,
        ctx: &CallerContext,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        if request_text.trim().is_empty() {
            return Err(Error::EmptyRequest);
        }

        let mut conversation = Conversation::new(request_text);
        let mut rounds = 0;
        let mut partial: Option<String> = None;
        let mut state = State::AwaitingPlanner;

        loop {
            if cancel.is_cancelled() {
                info!(rounds, "request cancelled");
                return Err(Error::Cancelled);
            }

            state = match state {
                State::AwaitingPlanner => {
                    match self.plan(&conversation, deadline, cancel).await? {
                        PlannerOutcome::Content(text) => {
                            conversation.push_planner(text.clone(), Vec::new());
                            State::Done(text)
                        }
                        PlannerOutcome::ToolCalls { content, calls } => {
                            check_call_ids(&calls)?;
                            if !content.trim().is_empty() {
                                partial = Some(content.clone());
                            }
                            if rounds >= self.config.max_rounds {
                                warn!(rounds, "planner still requesting tools at round limit");
                                return Err(Error::RoundLimitExceeded {
                                    max_rounds: self.config.max_rounds,
                                    partial,
                                });
                            }
                            conversation.push_planner(content, calls.clone());
                            State::DispatchingTools(calls)
                        }
                    }
                }
                State::DispatchingTools(calls) => {
                    rounds += 1;
                    info!(round = rounds, calls = calls.len(), "dispatching tool calls");

                    let results = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!(round = rounds, "request cancelled during dispatch");
                            return Err(Error::Cancelled);
                        }
                        results = self.dispatcher.dispatch(&calls, ctx, deadline) => results,
                    };

                    let failed = results.iter().filter(|r| !r.succeeded).count();
                    debug!(round = rounds, failed, "round finished");
                    conversation.push_tool_results(results)?;
                    State::AwaitingPlanner
                }
                State::Done(text) => {
                    info!(rounds, messages = conversation.len(), "request answered");
                    return Ok(Completion { text, rounds });
                }
            };
        }
    }

    /// Ask the planner for the next step, retrying transient failures.
    async fn plan(
        &self,
        conversation: &Conversation,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<PlannerOutcome> {
        let request = ModelRequest {
            messages: conversation.messages(),
            tools: self.registry().list(),
        };
        let retry = &self.config.retry;
        let mut schedule = retry.schedule();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_deadline = deadline.min(Instant::now() + self.config.model_timeout);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = tokio::time::timeout_at(
                    attempt_deadline,
                    self.model.complete(request, attempt_deadline),
                ) => result.unwrap_or(Err(ModelError::Timeout)),
            };

            let err = match result {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };

            // No retry whose backoff would end past the deadline.
            let delay = match schedule.next_backoff() {
                Some(delay)
                    if err.is_retryable()
                        && attempt < retry.max_attempts
                        && Instant::now() + delay < deadline =>
                {
                    delay
                }
                _ => {
                    warn!(attempt, error = %err, "planner call failed");
                    return Err(Error::Model(err));
                }
            };

            warn!(attempt, error = %err, ?delay, "planner call failed, retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Call ids must be unique within a round, or results could not be matched.
fn check_call_ids(calls: &[ToolCall]) -> Result<()> {
    let mut seen = HashSet::with_capacity(calls.len());
    for call in calls {
        if !seen.insert(call.id.as_str()) {
            return Err(Error::Model(ModelError::InvalidResponse(format!(
                "duplicate tool call id {}",
                call.id
            ))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Role, ToolResult};
    use crate::testing::{MockBackend, ScriptedModel, calls, content};
    use crate::tools::{DispatchConfig, ToolError};
    use policy::ContextPolicy;
    use std::sync::Arc;

    fn orchestrator(
        model: ScriptedModel,
        backend: MockBackend,
    ) -> Orchestrator<ScriptedModel, MockBackend> {
        orchestrator_with(model, backend, OrchestratorConfig::default())
    }

    fn orchestrator_with(
        model: ScriptedModel,
        backend: MockBackend,
        config: OrchestratorConfig,
    ) -> Orchestrator<ScriptedModel, MockBackend> {
        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::toolbox().unwrap()),
            Arc::new(ContextPolicy::toolbox_defaults()),
            backend,
            DispatchConfig::default(),
        );
        Orchestrator::new(model, dispatcher, config)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(120)
    }

    async fn ask(
        o: &Orchestrator<ScriptedModel, MockBackend>,
        text: &str,
    ) -> Result<Completion> {
        o.run(text, &CallerContext::user("1"), deadline(), &CancellationToken::new())
            .await
    }

    fn tool_messages(messages: &[Message]) -> Vec<&Message> {
        messages.iter().filter(|m| m.role == Role::Tool).collect()
    }

    #[tokio::test]
    async fn direct_answer_skips_dispatch() {
        let o = orchestrator(
            ScriptedModel::new([content("Hello! How can I help?")]),
            MockBackend::new(),
        );

        let completion = ask(&o, "hello").await.unwrap();

        assert_eq!(completion.text, "Hello! How can I help?");
        assert_eq!(completion.rounds, 0);
        assert_eq!(o.model.call_count(), 1);
        assert!(o.dispatcher.backend().invocations().is_empty());
    }

    #[tokio::test]
    async fn balance_question_uses_one_tool_round() {
        let model = ScriptedModel::new([
            calls(&[("call_1", "get_balances", "{}")]),
            content("Your balance is 0.5 BTC, 2 ETH and 1500 USDT."),
        ]);
        let backend = MockBackend::new().respond(
            "get_balances",
            Ok(r#"{"message":"Balances retrieved for userId: 1","data":["BTC: 0.5"]}"#.into()),
        );
        let o = orchestrator(model, backend);

        let completion = ask(&o, "what is my balance?").await.unwrap();
        assert_eq!(completion.text, "Your balance is 0.5 BTC, 2 ETH and 1500 USDT.");
        assert_eq!(completion.rounds, 1);

        let invocations = o.dispatcher.backend().invocations();
        assert_eq!(
            invocations,
            vec![("get_balances".to_string(), vec![("userId".to_string(), "1".to_string())])]
        );

        let requests = o.model.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].tool_calls[0].id, "call_1");
        let results = tool_messages(second);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_call_id.as_deref(), Some("call_1"));
        assert!(results[0].content.contains("Balances retrieved"));
    }

    #[tokio::test]
    async fn validation_error_is_fed_back_to_planner() {
        let model = ScriptedModel::new([
            calls(&[("call_1", "get_exchange_rates", r#"{"symbol":"bitcoin to dollars"}"#)]),
            content("Which trading pair do you mean, for example BTC/USDT?"),
        ]);
        let o = orchestrator(model, MockBackend::new());

        let completion = ask(&o, "what's the rate for bitcoin to dollars").await.unwrap();
        assert_eq!(completion.text, "Which trading pair do you mean, for example BTC/USDT?");
        assert!(o.dispatcher.backend().invocations().is_empty());

        let second = &o.model.requests()[1];
        let results = tool_messages(second);
        assert!(results[0].content.starts_with("invalid arguments:"), "{}", results[0].content);
    }

    #[tokio::test]
    async fn round_limit_stops_a_planner_that_never_answers() {
        let model = ScriptedModel::new([
            calls(&[("r1", "get_exchange_pairs", "{}")]),
            calls(&[("r2", "get_exchange_pairs", "{}")]),
            calls(&[("r3", "get_exchange_pairs", "{}")]),
            Ok(PlannerOutcome::ToolCalls {
                content: "Still looking...".into(),
                calls: vec![ToolCall::new("r4", "get_exchange_pairs", "{}")],
            }),
        ]);
        let o = orchestrator(model, MockBackend::new());

        let err = ask(&o, "list every pair").await.unwrap_err();

        match err {
            Error::RoundLimitExceeded { max_rounds, partial } => {
                assert_eq!(max_rounds, 3);
                assert_eq!(partial.as_deref(), Some("Still looking..."));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(o.dispatcher.backend().invocations().len(), 3);
        assert_eq!(o.model.call_count(), 4);
    }

    #[tokio::test]
    async fn planner_may_answer_after_the_last_allowed_round() {
        let model = ScriptedModel::new([
            calls(&[("r1", "get_exchange_pairs", "{}")]),
            content("BTC/USDT, ETH/USDT and BTC/ETH."),
        ]);
        let config = OrchestratorConfig {
            max_rounds: 1,
            ..OrchestratorConfig::default()
        };
        let o = orchestrator_with(model, MockBackend::new(), config);

        let completion = ask(&o, "which pairs?").await.unwrap();
        assert_eq!(completion.rounds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_still_reaches_planner() {
        let model = ScriptedModel::new([
            calls(&[
                ("a", "get_exchange_rates", r#"{"symbol":"BTC/USDT"}"#),
                ("b", "get_exchange_fees", r#"{"symbol":"BTC/USDT"}"#),
            ]),
            content("BTC trades at 30000 USDT; fees are unavailable right now."),
        ]);
        let backend = MockBackend::new().delay("get_exchange_fees", Duration::from_secs(60));
        let o = orchestrator(model, backend);

        let completion = ask(&o, "btc price and fees?").await.unwrap();
        assert_eq!(completion.rounds, 1);

        let second = &o.model.requests()[1];
        let results = tool_messages(second);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_call_id.as_deref(), Some("a"));
        assert!(results[0].content.contains("get_exchange_rates ok"));
        assert_eq!(results[1].tool_call_id.as_deref(), Some("b"));
        assert_eq!(results[1].content, "timeout after 10000ms");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_model_errors_are_retried() {
        let model = ScriptedModel::new([
            Err(ModelError::Server {
                status: 503,
                body: "overloaded".into(),
            }),
            Err(ModelError::Timeout),
            content("Hi!"),
        ]);
        let o = orchestrator(model, MockBackend::new());

        let completion = ask(&o, "hello").await.unwrap();
        assert_eq!(completion.text, "Hi!");
        assert_eq!(o.model.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let model = ScriptedModel::new([
            Err(ModelError::Network("reset".into())),
            Err(ModelError::Network("reset".into())),
            Err(ModelError::Network("reset".into())),
            content("never reached"),
        ]);
        let o = orchestrator(model, MockBackend::new());

        let err = ask(&o, "hello").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Network(_))));
        assert_eq!(o.model.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_skipped_when_backoff_would_pass_deadline() {
        let model = ScriptedModel::new([
            Err(ModelError::Server {
                status: 503,
                body: "overloaded".into(),
            }),
            content("too late"),
        ]);
        let o = orchestrator(model, MockBackend::new());

        let started = Instant::now();
        let err = o
            .run(
                "hello",
                &CallerContext::new(),
                started + Duration::from_millis(100),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Model(ModelError::Server { status: 503, .. })
        ));
        assert_eq!(o.model.call_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn fatal_model_error_is_not_retried() {
        let model = ScriptedModel::new([
            Err(ModelError::Auth("invalid api key".into())),
            content("x"),
        ]);
        let o = orchestrator(model, MockBackend::new());

        let err = ask(&o, "hello").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Auth(_))));
        assert_eq!(o.model.call_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_call_ids_are_fatal() {
        let model = ScriptedModel::new([calls(&[
            ("same", "get_balances", "{}"),
            ("same", "get_transactions", "{}"),
        ])]);
        let o = orchestrator(model, MockBackend::new());

        let err = ask(&o, "everything please").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::InvalidResponse(_))));
        assert!(o.dispatcher.backend().invocations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_planner_times_out() {
        let config = OrchestratorConfig {
            model_timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            ..OrchestratorConfig::default()
        };
        let o = orchestrator_with(ScriptedModel::hanging(), MockBackend::new(), config);

        let err = ask(&o, "hello").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_planner_call() {
        let o = orchestrator(ScriptedModel::hanging(), MockBackend::new());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = o
            .run("hello", &CallerContext::new(), deadline(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_dispatch() {
        let model = ScriptedModel::new([
            calls(&[("a", "get_exchange_pairs", "{}")]),
            content("never reached"),
        ]);
        let backend = MockBackend::new().delay("get_exchange_pairs", Duration::from_secs(5));
        let o = orchestrator(model, backend);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = o
            .run("pairs?", &CallerContext::new(), deadline(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(o.model.call_count(), 1);
    }

    #[tokio::test]
    async fn already_cancelled_request_never_calls_planner() {
        let o = orchestrator(ScriptedModel::new([content("hi")]), MockBackend::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = o
            .run("hello", &CallerContext::new(), deadline(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(o.model.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_request_is_rejected_before_planning() {
        let o = orchestrator(ScriptedModel::new([content("hi")]), MockBackend::new());
        assert!(matches!(ask(&o, "   ").await, Err(Error::EmptyRequest)));
        assert_eq!(o.model.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_result_is_marked_failed() {
        let model = ScriptedModel::new([
            calls(&[("x", "withdraw_everything", "{}")]),
            content("I can't do that."),
        ]);
        let backend = MockBackend::new()
            .respond("get_balances", Err(ToolError::Backend("unused".into())));
        let o = orchestrator(model, backend);

        ask(&o, "withdraw it all").await.unwrap();
        let second = &o.model.requests()[1];
        let result = ToolResult::failure("x", "unknown tool: withdraw_everything");
        assert_eq!(tool_messages(second)[0], &Message::tool_result(&result));
    }
}
