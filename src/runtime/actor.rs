//! Live actors
//!
//! A [`LocalActor`] owns a mailbox and runs at most one activity at a time:
//! configuring its handlers, answering a request, or handling a
//! notification. An activity is one kernel computation. While it waits on an
//! unbound variable the actor keeps absorbing responses and resumptions but
//! defers new requests and notifications, so handler invocations for one
//! actor never interleave.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Interrupt, KernelError, KernelResult};
use crate::kernel::{
    unify, ActorCfg, ActorRef, Complete, ComputeAdvice, Composite, Continuation, Env, EnvEntry,
    Envelope, FailedValue, Instr, Kernel, Literal, Machine, Operand, Proc, Resume, Spawner, Stack,
    Value, ValueOrVar, Var,
};
use crate::runtime::arg_bindings;
use crate::runtime::executor::{ExecutorHandle, ExecutorStats, MAX_ITEMS_PER_TURN};
use crate::runtime::message::{Mailbox, MailboxItem, Signal};
use crate::types::Address;

const HANDLERS_CTOR: &str = "$handlers_ctor";
const ASK: &str = "$ask";
const TELL: &str = "$tell";
const MESSAGE: &str = "$m";
const RESULT: &str = "$r";

/// Bound handler procedures; `None` where the actor declared `null`
#[derive(Clone)]
struct Handlers {
    ask: Option<Value>,
    tell: Option<Value>,
}

enum Phase {
    /// Waiting for the configure signal
    Created,
    Ready(Handlers),
    /// Configuration failed; requests are answered with the failure
    Failed(Arc<FailedValue>),
    Stopped,
}

enum ActivityKind {
    Configure {
        result: Var,
    },
    Request {
        requester: Arc<dyn ActorRef>,
        target: ValueOrVar,
        response: Var,
    },
    Notify,
}

struct Activity {
    id: u64,
    kind: ActivityKind,
    machine: Machine,
    resume: Arc<dyn Resume>,
}

struct ActorState {
    phase: Phase,
    activity: Option<Activity>,
    deferred: VecDeque<Envelope>,
    next_activity: u64,
}

impl ActorState {
    fn accepts_envelopes(&self) -> bool {
        self.activity.is_none() && matches!(self.phase, Phase::Ready(_) | Phase::Failed(_))
    }
}

/// What an ended activity produced
enum Settled {
    Configured(Handlers),
    Answer(Complete),
    Done,
}

enum Flow {
    Continue,
    /// Time slice exhausted; end the turn
    Yield,
}

/// Actor living in this process
pub struct LocalActor {
    address: Address,
    self_ref: Weak<LocalActor>,
    kernel: Kernel,
    executor: ExecutorHandle,
    spawner: Arc<dyn Spawner>,
    mailbox: Mailbox,
    scheduled: AtomicBool,
    state: Mutex<ActorState>,
}

impl LocalActor {
    pub(crate) fn new(
        address: Address,
        kernel: Kernel,
        executor: ExecutorHandle,
        spawner: Arc<dyn Spawner>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| LocalActor {
            address,
            self_ref: self_ref.clone(),
            kernel,
            executor,
            spawner,
            mailbox: Mailbox::new(),
            scheduled: AtomicBool::new(false),
            state: Mutex::new(ActorState {
                phase: Phase::Created,
                activity: None,
                deferred: VecDeque::new(),
                next_activity: 0,
            }),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_stopped(&self) -> bool {
        self.mailbox.is_closed()
    }

    pub fn mailbox_len(&self) -> usize {
        self.mailbox.len()
    }

    /// Evaluate the handlers constructor of `cfg` inside this actor
    pub(crate) fn configure(&self, cfg: Arc<ActorCfg>) {
        self.enqueue(MailboxItem::Signal(Signal::Configure(cfg)));
    }

    /// Stop after the items already queued
    pub(crate) fn stop(&self) {
        self.enqueue(MailboxItem::Signal(Signal::Stop));
    }

    /// Stop immediately, dropping queued items
    pub(crate) fn terminate(&self) {
        let mut state = self.state.lock();
        self.halt(&mut state);
    }

    fn enqueue(&self, item: MailboxItem) {
        match self.mailbox.push(item) {
            Ok(()) => self.schedule(),
            Err(item) => debug!(address = %self.address, kind = item.kind(), "actor stopped; dropping item"),
        }
    }

    fn schedule(&self) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(actor) = self.self_ref.upgrade() else {
            return;
        };
        if let Err(e) = self.executor.submit(actor) {
            self.scheduled.store(false, Ordering::SeqCst);
            warn!(address = %self.address, error = %e, "failed to schedule actor");
        }
    }

    /// Process up to `MAX_ITEMS_PER_TURN` items, then requeue if work remains
    pub(crate) fn run_turn(&self, stats: &ExecutorStats) {
        let mut processed = 0;
        let mut preempted = false;
        let runnable_deferred = {
            let mut state = self.state.lock();
            while processed < MAX_ITEMS_PER_TURN {
                let Some(item) = self.next_item(&mut state) else {
                    break;
                };
                processed += 1;
                trace!(address = %self.address, item = ?item, "processing");
                if let Flow::Yield = self.process(&mut state, item) {
                    preempted = true;
                    break;
                }
            }
            state.accepts_envelopes() && !state.deferred.is_empty()
        };
        stats.record_turn(processed, preempted);
        self.scheduled.store(false, Ordering::SeqCst);
        if runnable_deferred || !self.mailbox.is_empty() {
            self.schedule();
        }
    }

    fn next_item(&self, state: &mut ActorState) -> Option<MailboxItem> {
        if state.accepts_envelopes() {
            if let Some(envelope) = state.deferred.pop_front() {
                return Some(MailboxItem::Envelope(envelope));
            }
        }
        self.mailbox.pop()
    }

    fn process(&self, state: &mut ActorState, item: MailboxItem) -> Flow {
        match item {
            MailboxItem::Envelope(Envelope::Response { value, target }) => {
                self.absorb_response(value, &target);
                Flow::Continue
            }
            MailboxItem::Envelope(envelope) if !state.accepts_envelopes() => {
                state.deferred.push_back(envelope);
                Flow::Continue
            }
            MailboxItem::Envelope(Envelope::Request {
                message,
                requester,
                target,
            }) => self.start_request(state, message, requester, target),
            MailboxItem::Envelope(Envelope::Notify { message }) => self.start_notify(state, message),
            MailboxItem::Signal(Signal::Configure(cfg)) => self.start_configure(state, cfg),
            MailboxItem::Signal(Signal::Resume { activity, stack }) => {
                if state.activity.as_ref().map(|a| a.id) == Some(activity) {
                    self.advance(state, stack)
                } else {
                    debug!(address = %self.address, activity, "dropping stale continuation");
                    Flow::Continue
                }
            }
            MailboxItem::Signal(Signal::Stop) => {
                self.halt(state);
                Flow::Continue
            }
        }
    }

    fn absorb_response(&self, value: Complete, target: &ValueOrVar) {
        if let Err(e) = unify(target, &ValueOrVar::Value(value.into_value())) {
            debug!(address = %self.address, error = ?e, "ignoring conflicting response");
        }
    }

    fn start_configure(&self, state: &mut ActorState, cfg: Arc<ActorCfg>) -> Flow {
        if !matches!(state.phase, Phase::Created) {
            warn!(address = %self.address, "actor is already configured");
            return Flow::Continue;
        }
        let result = Var::new();
        let (mut entries, mut args) = arg_bindings(&cfg.args);
        let ctor = Value::Proc(Proc::Closure(cfg.handlers_ctor.clone()));
        entries.push(EnvEntry::new(HANDLERS_CTOR, Var::bound(ctor)));
        entries.push(EnvEntry::new(RESULT, result.clone()));
        args.push(Operand::ident(RESULT));
        let env = self.kernel.root_env().extend(entries);
        self.begin(
            state,
            ActivityKind::Configure { result },
            Instr::apply(HANDLERS_CTOR, args),
            env,
        )
    }

    fn start_request(
        &self,
        state: &mut ActorState,
        message: Complete,
        requester: Arc<dyn ActorRef>,
        target: ValueOrVar,
    ) -> Flow {
        let ask = match &state.phase {
            Phase::Ready(handlers) => handlers.ask.clone(),
            Phase::Failed(failed) => {
                requester.send(Envelope::Response {
                    value: Complete::failed(failed.clone()),
                    target,
                });
                return Flow::Continue;
            }
            Phase::Created | Phase::Stopped => return Flow::Continue,
        };
        let Some(ask) = ask else {
            let error = KernelError::NotAProc(format!("{} has no ask handler", self.address));
            let failed = FailedValue::from_error(self.address.clone(), error);
            requester.send(Envelope::Response {
                value: Complete::failed(Arc::new(failed)),
                target,
            });
            return Flow::Continue;
        };
        let response = Var::new();
        let env = self.kernel.root_env().extend(vec![
            EnvEntry::new(ASK, Var::bound(ask)),
            EnvEntry::new(MESSAGE, Var::bound(message.into_value())),
            EnvEntry::new(RESULT, response.clone()),
        ]);
        self.begin(
            state,
            ActivityKind::Request {
                requester,
                target,
                response,
            },
            Instr::apply(ASK, vec![Operand::ident(MESSAGE), Operand::ident(RESULT)]),
            env,
        )
    }

    fn start_notify(&self, state: &mut ActorState, message: Complete) -> Flow {
        let tell = match &state.phase {
            Phase::Ready(handlers) => handlers.tell.clone(),
            _ => None,
        };
        let Some(tell) = tell else {
            warn!(address = %self.address, message = %message, "no tell handler; dropping notification");
            return Flow::Continue;
        };
        let env = self.kernel.root_env().extend(vec![
            EnvEntry::new(TELL, Var::bound(tell)),
            EnvEntry::new(MESSAGE, Var::bound(message.into_value())),
        ]);
        self.begin(
            state,
            ActivityKind::Notify,
            Instr::apply(TELL, vec![Operand::ident(MESSAGE)]),
            env,
        )
    }

    fn begin(&self, state: &mut ActorState, kind: ActivityKind, instr: Instr, env: Env) -> Flow {
        state.next_activity += 1;
        let id = state.next_activity;
        let resume: Arc<dyn Resume> = Arc::new(ActivityResume {
            actor: self.self_ref.clone(),
            activity: id,
        });
        let machine = Machine::new(self.address.clone(), resume.clone())
            .with_actor(Arc::new(SelfRef {
                address: self.address.clone(),
                actor: self.self_ref.clone(),
            }))
            .with_spawner(self.spawner.clone());
        state.activity = Some(Activity {
            id,
            kind,
            machine,
            resume,
        });
        self.advance(state, Stack::of(Arc::new(instr), env))
    }

    fn advance(&self, state: &mut ActorState, stack: Stack) -> Flow {
        let time_slice = self.kernel.config().time_slice;
        let Some(activity) = state.activity.as_mut() else {
            return Flow::Continue;
        };
        let id = activity.id;
        match activity.machine.compute(stack, time_slice) {
            ComputeAdvice::End => {
                self.settle(state);
                Flow::Continue
            }
            ComputeAdvice::Preempt(stack) => {
                self.enqueue(MailboxItem::Signal(Signal::Resume { activity: id, stack }));
                Flow::Yield
            }
            ComputeAdvice::Wait(var) => {
                trace!(address = %self.address, var = %var, "activity waiting");
                Flow::Continue
            }
            ComputeAdvice::Halt(failed) => {
                self.fail(state, failed);
                Flow::Continue
            }
        }
    }

    /// The activity's stack ran out. Finish it, or park until its result
    /// has no unbound variable left.
    fn settle(&self, state: &mut ActorState) {
        loop {
            let Some(activity) = state.activity.as_ref() else {
                return;
            };
            let outcome = match &activity.kind {
                ActivityKind::Configure { result } => read_handlers(result).map(Settled::Configured),
                ActivityKind::Request { response, .. } => ValueOrVar::Var(response.clone())
                    .check_complete()
                    .map(Settled::Answer),
                ActivityKind::Notify => Ok(Settled::Done),
            };
            match outcome {
                Ok(settled) => {
                    self.finish(state, settled);
                    return;
                }
                Err(Interrupt::Blocked(var)) => {
                    let continuation = Continuation::new(Stack::empty(), activity.resume.clone());
                    if var.suspend(continuation).is_ok() {
                        trace!(address = %self.address, var = %var, "result waiting");
                        return;
                    }
                }
                Err(Interrupt::Fault(e)) => {
                    let failed = FailedValue::from_error(self.address.clone(), e);
                    self.fail(state, Arc::new(failed));
                    return;
                }
            }
        }
    }

    fn finish(&self, state: &mut ActorState, settled: Settled) {
        let Some(activity) = state.activity.take() else {
            return;
        };
        match (activity.kind, settled) {
            (ActivityKind::Configure { .. }, Settled::Configured(handlers)) => {
                info!(
                    address = %self.address,
                    ask = handlers.ask.is_some(),
                    tell = handlers.tell.is_some(),
                    "actor configured"
                );
                state.phase = Phase::Ready(handlers);
            }
            (ActivityKind::Request { requester, target, .. }, Settled::Answer(value)) => {
                trace!(address = %self.address, to = %requester.address(), "responding");
                requester.send(Envelope::Response { value, target });
            }
            _ => {}
        }
    }

    fn fail(&self, state: &mut ActorState, failed: Arc<FailedValue>) {
        let Some(activity) = state.activity.take() else {
            return;
        };
        match activity.kind {
            ActivityKind::Configure { .. } => {
                error!(address = %self.address, error = %failed.error, "configure failed");
                state.phase = Phase::Failed(failed);
            }
            ActivityKind::Request {
                requester, target, ..
            } => {
                debug!(address = %self.address, error = %failed.error, "request failed");
                requester.send(Envelope::Response {
                    value: Complete::failed(failed),
                    target,
                });
            }
            ActivityKind::Notify => {
                warn!(address = %self.address, error = %failed.error, "tell handler failed");
            }
        }
    }

    fn halt(&self, state: &mut ActorState) {
        if matches!(state.phase, Phase::Stopped) {
            return;
        }
        state.phase = Phase::Stopped;
        state.activity = None;
        let deferred = state.deferred.len();
        state.deferred.clear();
        let dropped = self.mailbox.close();
        info!(address = %self.address, dropped = dropped + deferred, "actor stopped");
    }
}

impl ActorRef for LocalActor {
    fn address(&self) -> &Address {
        &self.address
    }

    fn send(&self, envelope: Envelope) {
        self.enqueue(MailboxItem::Envelope(envelope));
    }
}

impl fmt::Debug for LocalActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalActor")
            .field("address", &self.address)
            .field("mailbox", &self.mailbox.len())
            .finish()
    }
}

/// Requester identity handed to the machine; does not keep the actor alive
struct SelfRef {
    address: Address,
    actor: Weak<LocalActor>,
}

impl ActorRef for SelfRef {
    fn address(&self) -> &Address {
        &self.address
    }

    fn send(&self, envelope: Envelope) {
        match self.actor.upgrade() {
            Some(actor) => actor.send(envelope),
            None => debug!(address = %self.address, kind = envelope.kind(), "actor dropped"),
        }
    }
}

/// Routes woken continuations of one activity back into the mailbox
struct ActivityResume {
    actor: Weak<LocalActor>,
    activity: u64,
}

impl Resume for ActivityResume {
    fn resume(&self, stack: Stack) {
        if let Some(actor) = self.actor.upgrade() {
            actor.enqueue(MailboxItem::Signal(Signal::Resume {
                activity: self.activity,
                stack,
            }));
        }
    }
}

/// `[ask, tell]` bound by the handlers constructor
fn read_handlers(result: &Var) -> KernelResult<Handlers> {
    let value = settled_value(ValueOrVar::Var(result.clone()))?;
    let rec = value.as_rec()?;
    if !rec.is_tuple() || rec.field_count() != 2 {
        return Err(KernelError::type_mismatch("[ask, tell] handlers", &value).into());
    }
    Ok(Handlers {
        ask: handler(rec.value_at(0)?)?,
        tell: handler(rec.value_at(1)?)?,
    })
}

fn handler(value: ValueOrVar) -> KernelResult<Option<Value>> {
    match settled_value(value)? {
        Value::Lit(Literal::Null) => Ok(None),
        proc @ Value::Proc(_) => Ok(Some(proc)),
        other => Err(KernelError::type_mismatch("procedure or null", other.kind_name()).into()),
    }
}

fn settled_value(value: ValueOrVar) -> KernelResult<Value> {
    match value.resolve() {
        ValueOrVar::Value(value) => Ok(value),
        ValueOrVar::Var(var) => Err(Interrupt::Blocked(var)),
    }
}
