//! Pull-based streams with explicit termination causes.
//!
//! A [`Source`] is a suspended computation that, when stepped, yields a
//! [`Step`]: either a chunk of elements plus a continuation, or a terminal
//! [`Cause`]. The continuation takes a cause: passing [`Cause::End`]
//! continues normally, while [`Cause::Kill`] or [`Cause::Error`] requests
//! abrupt cleanup and yields a drained source that only performs
//! finalizers.
//!
//! This module carries the minimal surrounding library: constructors,
//! a few transformations, drivers, and adapters to and from
//! [`futures_core::Stream`]. The interesting machinery lives in
//! [`wye`][crate::wye] and [`njoin`][crate::njoin].

use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_lite::StreamExt;

use crate::cause::{Cause, Fault};

mod into_source;
mod into_stream;

pub use into_source::IntoSource;
pub use into_stream::IntoStream;

/// The continuation of an emitted chunk: a function from the cause under
/// which the stream continues to the rest of the stream.
pub type Resume<T> = Box<dyn FnOnce(Cause) -> Source<T>>;

type StepFuture<T> = Pin<Box<dyn Future<Output = Step<T>>>>;

/// One observation of a [`Source`].
pub enum Step<T> {
    /// A chunk of elements and the continuation of the stream.
    Emit(Vec<T>, Resume<T>),
    /// The stream terminated.
    Halt(Cause),
}

impl<T: fmt::Debug> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Emit(chunk, _) => f.debug_tuple("Emit").field(chunk).finish(),
            Step::Halt(cause) => f.debug_tuple("Halt").field(cause).finish(),
        }
    }
}

/// A pull-based stream of `T` terminated by a [`Cause`].
#[must_use = "sources do nothing unless stepped"]
pub struct Source<T> {
    fut: StepFuture<T>,
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").finish_non_exhaustive()
    }
}

impl<T: 'static> Source<T> {
    /// Create a source from the future computing its next step.
    pub fn new(fut: impl Future<Output = Step<T>> + 'static) -> Self {
        Self { fut: Box::pin(fut) }
    }

    /// Create a source whose next step is already known.
    pub fn ready(step: Step<T>) -> Self {
        Self::new(core::future::ready(step))
    }

    /// Step the source, yielding its next [`Step`].
    pub async fn step(self) -> Step<T> {
        self.fut.await
    }

    pub(crate) fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Step<T>> {
        self.fut.as_mut().poll(cx)
    }

    /// The source that terminates immediately with `cause`.
    pub fn halt(cause: Cause) -> Self {
        Self::ready(Step::Halt(cause))
    }

    /// The empty source: terminates immediately with [`Cause::End`].
    pub fn empty() -> Self {
        Self::halt(Cause::End)
    }

    /// The source that fails immediately with `fault`.
    pub fn fail(fault: Fault) -> Self {
        Self::halt(Cause::Error(fault))
    }

    /// The source that never produces a step.
    pub fn pending() -> Self {
        Self::new(std::future::pending())
    }

    /// Emit one chunk, then end.
    pub fn emit_all(chunk: Vec<T>) -> Self {
        Self::ready(Step::Emit(chunk, Box::new(Source::halt)))
    }

    /// Emit each element of `iter` (as a single chunk), then end.
    ///
    /// ```
    /// use stream_confluence::source::Source;
    ///
    /// futures_lite::future::block_on(async {
    ///     let (items, cause) = Source::from_iter(1..=3).run_collect().await;
    ///     assert_eq!(items, vec![1, 2, 3]);
    ///     assert!(cause.is_end());
    /// });
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::emit_all(iter.into_iter().collect())
    }

    /// Emit single-element chunks by repeatedly applying `f` to a seed.
    pub fn unfold<S: 'static>(state: S, mut f: impl FnMut(S) -> Option<(T, S)> + 'static) -> Self {
        Self::new(async move {
            match f(state) {
                None => Step::Halt(Cause::End),
                Some((item, next)) => Step::Emit(
                    vec![item],
                    Box::new(move |cause| match cause {
                        Cause::End => Source::unfold(next, f),
                        abrupt => Source::halt(abrupt),
                    }),
                ),
            }
        })
    }

    /// Adapt a [`futures_core::Stream`] into a source of single-element
    /// chunks. The stream's natural end becomes [`Cause::End`]; abrupt
    /// causes drop the stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = T> + 'static,
    {
        fn go<T: 'static>(mut stream: Pin<Box<dyn futures_core::Stream<Item = T>>>) -> Source<T> {
            Source::new(async move {
                match stream.next().await {
                    Some(item) => Step::Emit(
                        vec![item],
                        Box::new(move |cause| match cause {
                            Cause::End => go(stream),
                            abrupt => Source::halt(abrupt),
                        }),
                    ),
                    None => Step::Halt(Cause::End),
                }
            })
        }
        go(Box::pin(stream))
    }

    /// Apply `f` to every element.
    pub fn map<U: 'static>(self, f: impl FnMut(T) -> U + 'static) -> Source<U> {
        fn go<T: 'static, U: 'static>(src: Source<T>, mut f: Box<dyn FnMut(T) -> U>) -> Source<U> {
            Source::new(async move {
                match src.step().await {
                    Step::Halt(cause) => Step::Halt(cause),
                    Step::Emit(chunk, resume) => {
                        let mapped = chunk.into_iter().map(&mut f).collect();
                        Step::Emit(mapped, Box::new(move |cause| go(resume(cause), f)))
                    }
                }
            })
        }
        go(self, Box::new(f))
    }

    /// Continue with `next` when this source ends normally. Abrupt causes
    /// skip `next` entirely.
    pub fn append(self, next: impl FnOnce() -> Source<T> + 'static) -> Source<T> {
        Source::new(async move {
            match self.step().await {
                Step::Halt(Cause::End) => next().step().await,
                Step::Halt(abrupt) => Step::Halt(abrupt),
                Step::Emit(chunk, resume) => Step::Emit(
                    chunk,
                    Box::new(move |cause| match cause {
                        Cause::End => resume(Cause::End).append(next),
                        abrupt => resume(abrupt),
                    }),
                ),
            }
        })
    }

    /// Run `fin` exactly once when this source halts, for any cause, or
    /// when it is dropped mid-stream.
    ///
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// use stream_confluence::source::Source;
    ///
    /// let fired = Rc::new(Cell::new(0));
    /// let counter = Rc::clone(&fired);
    /// futures_lite::future::block_on(async move {
    ///     let source = Source::from_iter(vec![1, 2])
    ///         .with_finalizer(move || counter.set(counter.get() + 1));
    ///     source.run_collect().await;
    /// });
    /// assert_eq!(fired.get(), 1);
    /// ```
    pub fn with_finalizer(self, fin: impl FnOnce() + 'static) -> Source<T> {
        fn go<T: 'static>(src: Source<T>, guard: FinalizerGuard) -> Source<T> {
            Source::new(async move {
                match src.step().await {
                    Step::Halt(cause) => {
                        guard.run();
                        Step::Halt(cause)
                    }
                    Step::Emit(chunk, resume) => {
                        Step::Emit(chunk, Box::new(move |cause| go(resume(cause), guard)))
                    }
                }
            })
        }
        go(self, FinalizerGuard::new(fin))
    }

    /// Drive the source to completion, collecting every element and the
    /// terminal cause.
    pub async fn run_collect(self) -> (Vec<T>, Cause) {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            match cur.step().await {
                Step::Emit(chunk, resume) => {
                    out.extend(chunk);
                    cur = resume(Cause::End);
                }
                Step::Halt(cause) => return (out, cause),
            }
        }
    }

    /// Request abrupt termination: step once, then drive the cleanup to
    /// completion, discarding elements. Returns the terminal cause.
    pub async fn kill(self) -> Cause {
        let mut cur = self;
        loop {
            match cur.step().await {
                Step::Emit(_, resume) => cur = resume(Cause::Kill),
                Step::Halt(cause) => return cause,
            }
        }
    }
}

/// Drive a continuation with [`Cause::Kill`] until its stream halts,
/// discarding elements. Used by the engines to finalize idle sides.
pub(crate) async fn drive_kill<T: 'static>(resume: Resume<T>) -> Cause {
    let mut cur = resume(Cause::Kill);
    loop {
        match cur.step().await {
            Step::Emit(_, resume) => cur = resume(Cause::Kill),
            Step::Halt(cause) => return cause,
        }
    }
}

/// Runs a cleanup action exactly once: explicitly on halt, or on drop when
/// the owning step future is cancelled mid-fetch.
struct FinalizerGuard {
    fin: Option<Box<dyn FnOnce()>>,
}

impl FinalizerGuard {
    fn new(fin: impl FnOnce() + 'static) -> Self {
        Self {
            fin: Some(Box::new(fin)),
        }
    }

    fn run(mut self) {
        if let Some(fin) = self.fin.take() {
            fin();
        }
    }
}

impl Drop for FinalizerGuard {
    fn drop(&mut self) {
        if let Some(fin) = self.fin.take() {
            fin();
        }
    }
}
