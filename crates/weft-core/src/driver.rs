// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use weft_config::LoopConfig;
use weft_model::{
    Message, MessageMeta, RunAssignment, RunCompletedData, StreamingAgent, TurnOptions, UserInput,
};
use weft_tools::ToolRegistry;

use crate::dispatch::{sorted_names, spawn_one};
use crate::error::{LoopError, Result};
use crate::hub::{PublishingHub, SubscriberId};
use crate::pipeline;

struct DriverState {
    current_run_id: Option<String>,
    latest_run_id: Option<String>,
}

struct Submission {
    input: UserInput,
    respond_to: oneshot::Sender<RunAssignment>,
}

/// The public run-orchestration core.
///
/// Wires a streaming agent and a tool registry together behind a
/// construction-time-assembled collaborator set and a `tokio::select!`-driven
/// background task, processing one submission at a time through a
/// per-submission, per-turn agentic loop that can fork into a new run when a
/// fresh submission arrives mid-turn.
pub struct BackgroundAgenticLoop {
    agent: Arc<dyn StreamingAgent>,
    tool_registry: Arc<dyn ToolRegistry>,
    hub: Arc<PublishingHub>,
    thread_id: String,
    config: LoopConfig,
    state: Arc<Mutex<DriverState>>,
    input_tx: mpsc::Sender<Submission>,
    input_rx: Mutex<Option<mpsc::Receiver<Submission>>>,
    injection_queue: Arc<Mutex<VecDeque<(UserInput, RunAssignment)>>>,
    disposed: AtomicBool,
    running: AtomicBool,
    run_handle: Mutex<Option<JoinHandle<()>>>,
    internal_cancel_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl BackgroundAgenticLoop {
    pub fn new(
        agent: Arc<dyn StreamingAgent>,
        tool_registry: Arc<dyn ToolRegistry>,
        thread_id: impl Into<String>,
        config: LoopConfig,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::channel(config.input_capacity.max(1));
        Self {
            agent,
            tool_registry,
            hub: Arc::new(PublishingHub::new(config.output_capacity)),
            thread_id: thread_id.into(),
            config,
            state: Arc::new(Mutex::new(DriverState {
                current_run_id: None,
                latest_run_id: None,
            })),
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            injection_queue: Arc::new(Mutex::new(VecDeque::new())),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            run_handle: Mutex::new(None),
            internal_cancel_tx: Mutex::new(None),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn current_run_id(&self) -> Option<String> {
        self.state.lock().unwrap().current_run_id.clone()
    }

    pub fn subscribe(&self) -> Result<(SubscriberId, crate::hub::MessageStream)> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(LoopError::Disposed);
        }
        Ok(self.hub.subscribe())
    }

    /// Accepts a submission: queues it for processing when idle, or injects
    /// it as a forked follow-up when a run is current.
    pub async fn send(&self, input: UserInput) -> Result<RunAssignment> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(LoopError::InvalidInput("loop is disposed".into()));
        }
        if !self.running.load(Ordering::SeqCst) {
            return Err(LoopError::InvalidInput("loop is not running".into()));
        }
        if input.messages.is_empty() {
            return Err(LoopError::InvalidInput("empty content".into()));
        }

        let current = self.state.lock().unwrap().current_run_id.clone();
        if let Some(current_run_id) = current {
            let assignment = RunAssignment {
                run_id: uuid::Uuid::new_v4().to_string(),
                generation_id: uuid::Uuid::new_v4().to_string(),
                input_id: input.input_id.clone(),
                parent_run_id: Some(input.parent_run_id.clone().unwrap_or(current_run_id)),
                was_injected: true,
            };
            self.injection_queue
                .lock()
                .unwrap()
                .push_back((input, assignment.clone()));
            self.publish_lifecycle_event(Message::RunAssignment {
                meta: MessageMeta::default(),
                data: assignment.clone(),
            })
            .await;
            return Ok(assignment);
        }

        let (tx, rx) = oneshot::channel();
        self.input_tx
            .send(Submission {
                input,
                respond_to: tx,
            })
            .await
            .map_err(|_| LoopError::InvalidInput("input queue closed".into()))?;
        rx.await
            .map_err(|_| LoopError::InvalidInput("driver dropped submission".into()))
    }

    async fn publish_lifecycle_event(&self, mut m: Message) {
        m.stamp_system(&self.thread_id);
        if let Message::RunAssignment { ref data, .. } = m {
            m.meta_mut().run_id = Some(data.run_id.clone());
        }
        self.hub.publish(m).await;
    }

    /// One-shot convenience wrapper: subscribes before sending so the run's
    /// `RunAssignment` is never missed, then filters
    /// the subscription down to this run's messages, unsubscribing on every
    /// exit path.
    pub async fn execute_run(&self, input: UserInput) -> Result<ExecuteRunStream> {
        let (sub_id, inner) = self.subscribe()?;
        let assignment = match self.send(input).await {
            Ok(a) => a,
            Err(e) => {
                self.hub.unsubscribe(&sub_id);
                return Err(e);
            }
        };
        Ok(ExecuteRunStream {
            inner,
            guard: Some(SubscriberGuard {
                hub: self.hub.clone(),
                id: sub_id,
            }),
            target_run_id: assignment.run_id,
            finished: false,
        })
    }

    /// Begins consuming the input queue. Rejects if already running or
    /// disposed.
    pub fn start(&self, external_cancel: watch::Receiver<bool>) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(LoopError::Disposed);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(LoopError::AlreadyRunning);
        }

        let input_rx = self
            .input_rx
            .lock()
            .unwrap()
            .take()
            .expect("input receiver taken exactly once per start()");

        let (internal_tx, internal_rx) = watch::channel(false);
        *self.internal_cancel_tx.lock().unwrap() = Some(internal_tx);
        let combined = merge_cancellation(external_cancel, internal_rx);

        let tool_registry = self.tool_registry.clone();
        let agent = self.agent.clone();
        let hub = self.hub.clone();
        let state = self.state.clone();
        let injection_queue = self.injection_queue.clone();
        let thread_id = self.thread_id.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            drive(
                input_rx,
                injection_queue,
                state,
                agent,
                tool_registry,
                hub,
                thread_id,
                config,
                combined,
            )
            .await;
        });
        *self.run_handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Cancels the internal token, closes the input queue, and awaits the
    /// driver's wind-down within `timeout` (default from `weft-config`).
    /// Idempotent: a second call with nothing running is a no-op.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        if let Some(tx) = self.internal_cancel_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        let handle = self.run_handle.lock().unwrap().take();
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = handle {
            let wait = timeout.unwrap_or(Duration::from_secs(self.config.stop_timeout_secs));
            if tokio::time::timeout(wait, handle).await.is_err() {
                warn!(timeout_secs = wait.as_secs(), "stop() timed out; proceeding with disposal");
                return Err(LoopError::StopTimeout);
            }
        }
        Ok(())
    }

    /// Stops the driver, closes every subscriber queue, and marks the loop
    /// disposed. Idempotent; further public calls fail with
    /// [`LoopError::Disposed`].
    pub async fn dispose(&self) {
        let _ = self.stop(None).await;
        self.hub.close();
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// Merges an external cancellation token with the lifecycle's own `stop()`
/// trigger into one combined token: true on either one cancels the run.
/// Watches each receiver independently on its own task: a dropped sender on
/// one side (e.g. a caller that never holds onto an explicit external token)
/// simply ends
/// that task without forwarding cancellation — only an actual `true` value
/// propagates.
fn merge_cancellation(
    mut external: watch::Receiver<bool>,
    mut internal: watch::Receiver<bool>,
) -> watch::Receiver<bool> {
    let initial = *external.borrow() || *internal.borrow();
    let (tx, rx) = watch::channel(initial);
    let tx2 = tx.clone();
    tokio::spawn(async move {
        while external.changed().await.is_ok() {
            if *external.borrow() {
                let _ = tx.send(true);
                break;
            }
        }
    });
    tokio::spawn(async move {
        while internal.changed().await.is_ok() {
            if *internal.borrow() {
                let _ = tx2.send(true);
                break;
            }
        }
    });
    rx
}

async fn drive(
    mut input_rx: mpsc::Receiver<Submission>,
    injection_queue: Arc<Mutex<VecDeque<(UserInput, RunAssignment)>>>,
    state: Arc<Mutex<DriverState>>,
    agent: Arc<dyn StreamingAgent>,
    tool_registry: Arc<dyn ToolRegistry>,
    hub: Arc<PublishingHub>,
    thread_id: String,
    config: LoopConfig,
    mut cancel: watch::Receiver<bool>,
) {
    let mut history: Vec<Message> = Vec::new();

    loop {
        if *cancel.borrow() {
            break;
        }
        let submission = tokio::select! {
            _ = cancel.changed() => {
                if *cancel.borrow() { break; } else { continue; }
            }
            maybe = input_rx.recv() => match maybe {
                None => break,
                Some(s) => s,
            },
        };

        let parent_run_id = submission
            .input
            .parent_run_id
            .clone()
            .or_else(|| state.lock().unwrap().latest_run_id.clone());
        let assignment = RunAssignment {
            run_id: uuid::Uuid::new_v4().to_string(),
            generation_id: uuid::Uuid::new_v4().to_string(),
            input_id: submission.input.input_id.clone(),
            parent_run_id,
            was_injected: false,
        };

        process_run(
            submission.input,
            assignment,
            Some(submission.respond_to),
            &mut history,
            &injection_queue,
            &state,
            &agent,
            &tool_registry,
            &hub,
            &thread_id,
            &config,
            cancel.clone(),
        )
        .await;
    }

    debug!("driver loop exiting");
}

#[allow(clippy::too_many_arguments)]
async fn process_run(
    mut input: UserInput,
    mut assignment: RunAssignment,
    mut respond_to: Option<oneshot::Sender<RunAssignment>>,
    history: &mut Vec<Message>,
    injection_queue: &Arc<Mutex<VecDeque<(UserInput, RunAssignment)>>>,
    state: &Arc<Mutex<DriverState>>,
    agent: &Arc<dyn StreamingAgent>,
    tool_registry: &Arc<dyn ToolRegistry>,
    hub: &Arc<PublishingHub>,
    thread_id: &str,
    config: &LoopConfig,
    cancel: watch::Receiver<bool>,
) {
    loop {
        // Step 2: resolve the submitter's promise before model work begins.
        if let Some(tx) = respond_to.take() {
            let _ = tx.send(assignment.clone());
        }

        // Step 3: set current under the state lock.
        state.lock().unwrap().current_run_id = Some(assignment.run_id.clone());

        // Step 4: publish RunAssignment. Injected runs already had this
        // published immediately by `send()`'s injection branch, so the fork
        // handoff below must not re-publish a second, redundant copy here.
        if !assignment.was_injected {
            let mut assigned = Message::RunAssignment {
                meta: MessageMeta::default(),
                data: assignment.clone(),
            };
            assigned.stamp_system(thread_id);
            assigned.meta_mut().run_id = Some(assignment.run_id.clone());
            hub.publish(assigned).await;
        }

        // Step 5: append submission messages to history verbatim.
        history.append(&mut input.messages);

        // Step 6: agentic turn loop.
        let (was_forked, forked_to_run_id) = agentic_turn_loop(
            &assignment,
            history,
            agent,
            tool_registry,
            hub,
            thread_id,
            config,
            injection_queue,
            cancel.clone(),
        )
        .await;

        // Step 7: emit RunCompleted.
        let mut completed = Message::RunCompleted {
            meta: MessageMeta::default(),
            data: RunCompletedData {
                run_id: assignment.run_id.clone(),
                was_forked,
                forked_to_run_id: forked_to_run_id.clone(),
            },
        };
        completed.stamp_system(thread_id);
        completed.meta_mut().run_id = Some(assignment.run_id.clone());
        hub.publish(completed).await;

        // Step 8: record latest, clear current.
        {
            let mut st = state.lock().unwrap();
            st.latest_run_id = Some(assignment.run_id.clone());
            st.current_run_id = None;
        }

        // Step 9: fork handoff — dequeue and recurse into step 3 inline,
        // preserving the pre-assigned ids.
        if was_forked {
            let next = injection_queue.lock().unwrap().pop_front();
            if let Some((next_input, next_assignment)) = next {
                input = next_input;
                assignment = next_assignment;
                respond_to = None;
                continue;
            }
        }
        break;
    }
}

#[allow(clippy::too_many_arguments)]
async fn agentic_turn_loop(
    assignment: &RunAssignment,
    history: &mut Vec<Message>,
    agent: &Arc<dyn StreamingAgent>,
    tool_registry: &Arc<dyn ToolRegistry>,
    hub: &Arc<PublishingHub>,
    thread_id: &str,
    config: &LoopConfig,
    injection_queue: &Arc<Mutex<VecDeque<(UserInput, RunAssignment)>>>,
    cancel: watch::Receiver<bool>,
) -> (bool, Option<String>) {
    let mut turn_count: u32 = 0;
    loop {
        if *cancel.borrow() {
            debug!(run_id = %assignment.run_id, "cancellation observed between turns");
            return (false, None);
        }

        // Step: between-turn fork check (§4.3.4).
        let forked_to_run_id = injection_queue
            .lock()
            .unwrap()
            .front()
            .map(|(_, a)| a.run_id.clone());
        if let Some(forked_to_run_id) = forked_to_run_id {
            return (true, Some(forked_to_run_id));
        }

        turn_count += 1;
        if turn_count > config.max_turns_per_run {
            warn!(
                run_id = %assignment.run_id,
                max_turns = config.max_turns_per_run,
                "max_turns_per_run reached; stopping without fork"
            );
            return (false, None);
        }

        match run_single_turn(assignment, history, agent, tool_registry, hub, thread_id, cancel.clone()).await {
            Ok(had_tool_calls) => {
                if !had_tool_calls {
                    return (false, None);
                }
            }
            Err(e) => {
                error!(run_id = %assignment.run_id, error = %e, "turn failed; ending run without fork");
                return (false, None);
            }
        }
    }
}

/// Turns a fallible provider stream into a plain `Message` stream for the
/// pipeline, ending (and logging) at the first error rather than skipping
/// past it.
fn stop_on_first_error(run_id: String, raw: weft_model::MessageStream) -> crate::hub::MessageStream {
    Box::pin(
        raw.scan(false, move |done, item| {
            let run_id = run_id.clone();
            async move {
                if *done {
                    return None;
                }
                match item {
                    Ok(m) => Some(Some(m)),
                    Err(e) => {
                        error!(run_id = %run_id, error = %e, "pipeline stream raised; ending turn");
                        *done = true;
                        Some(None)
                    }
                }
            }
        })
        .filter_map(|m| async move { m }),
    )
}

/// Executes one turn: invokes the assembled middleware pipeline, publishing
/// and accumulating messages in arrival order, starts each tool call's
/// execution immediately, then awaits all in-flight tool futures
/// concurrently once the stream is exhausted.
async fn run_single_turn(
    assignment: &RunAssignment,
    history: &mut Vec<Message>,
    agent: &Arc<dyn StreamingAgent>,
    tool_registry: &Arc<dyn ToolRegistry>,
    hub: &Arc<PublishingHub>,
    thread_id: &str,
    cancel: watch::Receiver<bool>,
) -> Result<bool> {
    let options = TurnOptions {
        run_id: assignment.run_id.clone(),
        thread_id: thread_id.to_string(),
        generation_id: assignment.generation_id.clone(),
    };

    let raw = agent
        .generate_streaming(history, options, cancel)
        .await
        .map_err(LoopError::PipelineStreamFailure)?;

    let (middleware, handlers) = tool_registry.build_tool_components();
    let mut staged = pipeline::assemble(
        stop_on_first_error(assignment.run_id.clone(), raw),
        hub.clone(),
        pipeline::monotonic_order_idx_stage(),
        pipeline::adapt_middleware(middleware),
    );

    let available = sorted_names(&handlers);
    let mut in_flight: Vec<JoinHandle<Message>> = Vec::new();

    while let Some(m) = staged.next().await {
        if let Message::ToolCall { ref data, .. } = m {
            if data.tool_call_id.trim().is_empty() {
                return Err(LoopError::MissingToolCallId);
            }
        }
        let is_tool_call = matches!(m, Message::ToolCall { .. });
        history.push(m.clone());
        if is_tool_call {
            if let Message::ToolCall { meta, data } = m {
                in_flight.push(spawn_one(meta, data, &handlers, available.clone()));
            }
        }
    }

    let had_tool_calls = !in_flight.is_empty();
    for handle in in_flight {
        match handle.await {
            Ok(result) => {
                hub.publish(result.clone()).await;
                history.push(result);
            }
            Err(e) => error!(error = %e, "tool dispatch task panicked"),
        }
    }

    Ok(had_tool_calls)
}

struct SubscriberGuard {
    hub: Arc<PublishingHub>,
    id: SubscriberId,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.id);
    }
}

/// The stream returned by [`BackgroundAgenticLoop::execute_run`]: filters a
/// raw subscription down to one run's messages and unsubscribes on every
/// exit path (drop, exhaustion, or reaching that run's `RunCompleted`).
pub struct ExecuteRunStream {
    inner: crate::hub::MessageStream,
    guard: Option<SubscriberGuard>,
    target_run_id: String,
    finished: bool,
}

impl Stream for ExecuteRunStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        loop {
            return match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => {
                    this.finished = true;
                    this.guard.take();
                    Poll::Ready(None)
                }
                Poll::Ready(Some(m)) => {
                    if let Some(rid) = m.run_id() {
                        if rid != this.target_run_id {
                            continue;
                        }
                    }
                    if let Message::RunCompleted { ref data, .. } = m {
                        if data.run_id == this.target_run_id {
                            this.finished = true;
                            this.guard.take();
                        }
                    }
                    Poll::Ready(Some(m))
                }
            };
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
