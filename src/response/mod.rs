//! Responder chains: the policy layer that turns an incarnation's outcome into
//! an [`Action`].
//!
//! A [`Response`] is a factory bound once per process, producing a
//! [`Responder`]. Responders are consulted in order and the first one that
//! does not [`Action::Pass`] decides.

pub(crate) mod backoff;
pub(crate) mod limit;

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{context::Context, error::ProcessError, process::Process};

pub use backoff::{backoff, BackoffPolicy, ExponentialBackoff};
pub use limit::limit;

/// What a process does after an incarnation ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Defer to the next responder in the chain.
    Pass,
    /// Run another incarnation.
    Restart,
    /// Stop the process; the accompanying error becomes its terminal error.
    Close,
    /// Stop the process and cancel the parent supervisor's own process.
    Cascade,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Restart => write!(f, "restart"),
            Self::Close => write!(f, "close"),
            Self::Cascade => write!(f, "cascade"),
        }
    }
}

/// Decides what to do with an incarnation's outcome.
///
/// `err` is `None` when the task succeeded. The returned error may differ from
/// the one received.
#[async_trait]
pub trait Responder: Send {
    async fn respond(
        &mut self,
        ctx: &Context,
        err: Option<ProcessError>,
    ) -> (Action, Option<ProcessError>);
}

/// Adapts a synchronous closure into a [`Responder`]. Built with [`responder_fn`].
pub struct ResponderFn<F>(F);

/// Turns a closure into a [`Responder`].
pub fn responder_fn<F>(f: F) -> ResponderFn<F>
where
    F: FnMut(&Context, Option<ProcessError>) -> (Action, Option<ProcessError>) + Send,
{
    ResponderFn(f)
}

#[async_trait]
impl<F> Responder for ResponderFn<F>
where
    F: FnMut(&Context, Option<ProcessError>) -> (Action, Option<ProcessError>) + Send,
{
    async fn respond(
        &mut self,
        ctx: &Context,
        err: Option<ProcessError>,
    ) -> (Action, Option<ProcessError>) {
        (self.0)(ctx, err)
    }
}

/// Responders tried in order; the first decisive one wins.
#[derive(Default)]
pub struct Responders(Vec<Box<dyn Responder>>);

impl Responders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, responder: impl Responder + 'static) {
        self.0.push(Box::new(responder));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Box<dyn Responder>> for Responders {
    fn from_iter<I: IntoIterator<Item = Box<dyn Responder>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[async_trait]
impl Responder for Responders {
    /// Every member sees the original error. If all of them pass, the chain
    /// passes too.
    async fn respond(
        &mut self,
        ctx: &Context,
        err: Option<ProcessError>,
    ) -> (Action, Option<ProcessError>) {
        for responder in self.0.iter_mut() {
            let (action, next) = responder.respond(ctx, err.clone()).await;
            if action != Action::Pass {
                return (action, next);
            }
        }
        (Action::Pass, err)
    }
}

type Bind = dyn Fn(&Process) -> Box<dyn Responder> + Send + Sync;

/// A policy that yields a fresh [`Responder`] for each process it is bound to.
///
/// Binding happens once, when the process is created, so a responder may keep
/// per-process state across restarts.
#[derive(Clone)]
pub struct Response(Arc<Bind>);

impl Response {
    pub fn new<F, R>(bind: F) -> Self
    where
        F: Fn(&Process) -> R + Send + Sync + 'static,
        R: Responder + 'static,
    {
        Self(Arc::new(move |process: &Process| -> Box<dyn Responder> {
            Box::new(bind(process))
        }))
    }

    pub fn bind(&self, process: &Process) -> Box<dyn Responder> {
        (self.0)(process)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Response").finish_non_exhaustive()
    }
}

pub(crate) fn bind_all(process: &Process, responses: &[Response]) -> Responders {
    responses.iter().map(|response| response.bind(process)).collect()
}

fn fixed(action: Action) -> Response {
    Response::new(move |_: &Process| responder_fn(move |_: &Context, err| (action, err)))
}

/// Stops the process, keeping the outcome as its terminal error.
pub fn close() -> Response {
    fixed(Action::Close)
}

/// Runs another incarnation immediately.
pub fn restart() -> Response {
    fixed(Action::Restart)
}

/// Stops the process and cancels the parent supervisor's process.
pub fn cascade() -> Response {
    fixed(Action::Cascade)
}

/// Consults `responses` only when `cond` holds; passes otherwise.
///
/// ```rust
/// use supervisor_tree::{close, limit, restart, when, ProcessOptions};
///
/// let options = ProcessOptions::new().on_error([
///     when(|_ctx, err| err.is_some_and(|e| e.to_string().contains("timeout")), [
///         limit(5),
///         restart(),
///     ]),
///     close(),
/// ]);
/// ```
pub fn when<C>(cond: C, responses: impl IntoIterator<Item = Response>) -> Response
where
    C: Fn(&Context, Option<&ProcessError>) -> bool + Send + Sync + 'static,
{
    let cond = Arc::new(cond);
    let responses: Vec<Response> = responses.into_iter().collect();
    Response::new(move |process: &Process| When {
        cond: Arc::clone(&cond),
        chain: bind_all(process, &responses),
    })
}

struct When<C> {
    cond: Arc<C>,
    chain: Responders,
}

#[async_trait]
impl<C> Responder for When<C>
where
    C: Fn(&Context, Option<&ProcessError>) -> bool + Send + Sync + 'static,
{
    async fn respond(
        &mut self,
        ctx: &Context,
        err: Option<ProcessError>,
    ) -> (Action, Option<ProcessError>) {
        if (self.cond)(ctx, err.as_ref()) {
            return self.chain.respond(ctx, err).await;
        }
        (Action::Pass, err)
    }
}
