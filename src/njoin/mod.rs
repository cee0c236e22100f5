//! NJOIN: a dynamic many-stream merge with bounded concurrency and
//! bounded buffering.
//!
//! [`njoin`] flattens an outer source of inner sources into one output
//! source. At most `max_open` inner sources run at a time (`0` means
//! unlimited): when the cap is reached, the outer source is parked until
//! an inner finishes. Emitted elements pass through a buffer holding at
//! most `max_queued` elements (`0` means unlimited): an inner whose chunk
//! does not fit is parked until the consumer drains the buffer. Any
//! inner's `Kill` or `Error` stops the whole merge, outer included, as
//! does the consumer stopping the output.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::task::{Context, Poll};

use slab::Slab;
use smallvec::SmallVec;

use crate::cause::Cause;
use crate::source::{drive_kill, IntoSource, Resume, Source, Step};
use crate::utils::WakerVec;

/// The waker-table slot reserved for the outer source.
const OUTER_INDEX: usize = 0;

/// Merge a dynamic set of inner sources into one output source.
///
/// Elements from distinct inners interleave arbitrarily; within one inner,
/// order is preserved. The merge ends with `End` once the outer source and
/// every inner have ended; it ends with the failing cause as soon as any
/// inner (or the outer) fails or is killed.
///
/// ```
/// use stream_confluence::njoin::njoin;
/// use stream_confluence::source::Source;
///
/// futures_lite::future::block_on(async {
///     let outer = Source::from_iter(vec![
///         Source::from_iter(vec![1, 2]),
///         Source::from_iter(vec![3, 4]),
///     ]);
///     let (mut items, cause) = njoin(2, 4, outer).run_collect().await;
///     items.sort_unstable();
///     assert_eq!(items, vec![1, 2, 3, 4]);
///     assert!(cause.is_end());
/// });
/// ```
pub fn njoin<P, A>(max_open: usize, max_queued: usize, source: P) -> Source<A>
where
    P: IntoSource<Item = Source<A>>,
    A: 'static,
{
    engine_step(Engine {
        outer: Outer::Fetching(source.into_source()),
        inners: Slab::new(),
        buffer: VecDeque::new(),
        max_open,
        max_queued,
        wakers: WakerVec::new(1),
    })
}

struct Engine<A> {
    outer: Outer<A>,
    inners: Slab<Inner<A>>,
    buffer: VecDeque<A>,
    max_open: usize,
    max_queued: usize,
    wakers: WakerVec,
}

/// The outer source of inner sources.
enum Outer<A> {
    /// A fetch is in flight.
    Fetching(Source<Source<A>>),
    /// Paused at the open-count cap; `pending` holds offered inners that
    /// have not been admitted yet.
    Backoff {
        pending: VecDeque<Source<A>>,
        resume: Resume<Source<A>>,
    },
    /// The outer terminated.
    Done(Cause),
}

/// One open inner source.
enum Inner<A> {
    /// A fetch is in flight.
    Running(Source<A>),
    /// Waiting for buffer space; `rest` holds the elements of the last
    /// chunk that did not fit.
    Parked {
        rest: VecDeque<A>,
        resume: Resume<A>,
    },
}

enum Event<A> {
    Outer(Step<Source<A>>),
    Inner(usize, Step<A>),
}

fn engine_step<A: 'static>(mut this: Engine<A>) -> Source<A> {
    Source::new(async move {
        loop {
            this.refill_from_parked();
            if !this.buffer.is_empty() {
                let chunk: Vec<A> = this.buffer.drain(..).collect();
                return Step::Emit(
                    chunk,
                    Box::new(move |cause| {
                        let mut this = this;
                        match cause {
                            Cause::End => engine_step(this),
                            abrupt => Source::new(async move {
                                Step::Halt(this.shutdown(abrupt.kill()).await)
                            }),
                        }
                    }),
                );
            }
            if let Outer::Done(cause) = &this.outer {
                if this.inners.is_empty() {
                    return Step::Halt(cause.clone());
                }
            }
            let event = this.next_event().await;
            if let Some(fatal) = this.handle_event(event).await {
                return Step::Halt(fatal);
            }
        }
    })
}

impl<A: 'static> Engine<A> {
    fn buffer_space(&self) -> usize {
        if self.max_queued == 0 {
            usize::MAX
        } else {
            self.max_queued.saturating_sub(self.buffer.len())
        }
    }

    fn has_capacity(&self) -> bool {
        self.max_open == 0 || self.inners.len() < self.max_open
    }

    fn mark_ready(&mut self, index: usize) {
        self.wakers.readiness().set_ready(index);
    }

    /// Move elements of parked inners into freed buffer space; an inner
    /// whose backlog drains resumes fetching.
    fn refill_from_parked(&mut self) {
        if self.max_queued == 0 {
            return;
        }
        let max_queued = self.max_queued;
        let mut unparked: SmallVec<[usize; 4]> = SmallVec::new();
        for (key, slot) in self.inners.iter_mut() {
            if self.buffer.len() >= max_queued {
                break;
            }
            if let Inner::Parked { rest, .. } = slot {
                while self.buffer.len() < max_queued {
                    match rest.pop_front() {
                        Some(item) => self.buffer.push_back(item),
                        None => break,
                    }
                }
                if rest.is_empty() {
                    unparked.push(key);
                }
            }
        }
        for key in unparked {
            let slot = std::mem::replace(&mut self.inners[key], Inner::Running(Source::empty()));
            if let Inner::Parked { resume, .. } = slot {
                self.inners[key] = Inner::Running(resume(Cause::End));
            }
            self.mark_ready(key + 1);
        }
    }

    async fn next_event(&mut self) -> Event<A> {
        poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Poll only the children whose waker fired since the last pass.
    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Event<A>> {
        let awake: SmallVec<[usize; 8]> = {
            let mut readiness = self.wakers.readiness();
            readiness.set_waker(cx.waker());
            if !readiness.any_ready() {
                return Poll::Pending;
            }
            readiness.awake().collect()
        };
        for index in awake {
            if index == OUTER_INDEX {
                if let Outer::Fetching(source) = &mut self.outer {
                    let Some(waker) = self.wakers.get(index) else {
                        continue;
                    };
                    let mut child_cx = Context::from_waker(waker);
                    match source.poll_step(&mut child_cx) {
                        Poll::Ready(step) => return Poll::Ready(Event::Outer(step)),
                        Poll::Pending => {
                            self.wakers.readiness().clear_ready(index);
                        }
                    }
                } else {
                    self.wakers.readiness().clear_ready(index);
                }
            } else {
                let key = index - 1;
                match self.inners.get_mut(key) {
                    Some(Inner::Running(source)) => {
                        let Some(waker) = self.wakers.get(index) else {
                            continue;
                        };
                        let mut child_cx = Context::from_waker(waker);
                        match source.poll_step(&mut child_cx) {
                            Poll::Ready(step) => return Poll::Ready(Event::Inner(key, step)),
                            Poll::Pending => {
                                self.wakers.readiness().clear_ready(index);
                            }
                        }
                    }
                    _ => {
                        self.wakers.readiness().clear_ready(index);
                    }
                }
            }
        }
        Poll::Pending
    }

    /// Handle one child completion. Returns the terminal cause when the
    /// completion was fatal for the whole merge.
    async fn handle_event(&mut self, event: Event<A>) -> Option<Cause> {
        match event {
            Event::Outer(Step::Emit(sources, resume)) => {
                let mut pending: VecDeque<Source<A>> = sources.into();
                self.admit(&mut pending);
                if pending.is_empty() && self.has_capacity() {
                    self.outer = Outer::Fetching(resume(Cause::End));
                    self.mark_ready(OUTER_INDEX);
                } else {
                    self.outer = Outer::Backoff { pending, resume };
                }
                None
            }
            Event::Outer(Step::Halt(Cause::End)) => {
                self.outer = Outer::Done(Cause::End);
                None
            }
            Event::Outer(Step::Halt(cause)) => Some(self.shutdown(cause.kill()).await),
            Event::Inner(key, Step::Emit(chunk, resume)) => {
                let mut rest: VecDeque<A> = chunk.into();
                while self.buffer_space() > 0 {
                    match rest.pop_front() {
                        Some(item) => self.buffer.push_back(item),
                        None => break,
                    }
                }
                self.inners[key] = if rest.is_empty() {
                    self.mark_ready(key + 1);
                    Inner::Running(resume(Cause::End))
                } else {
                    Inner::Parked { rest, resume }
                };
                None
            }
            Event::Inner(key, Step::Halt(Cause::End)) => {
                self.inners.remove(key);
                self.wakers.readiness().clear_ready(key + 1);
                self.admit_after_finish();
                None
            }
            // an inner's Kill or Error is fatal for the whole merge
            Event::Inner(key, Step::Halt(cause)) => {
                self.inners.remove(key);
                Some(self.shutdown(cause.kill()).await)
            }
        }
    }

    /// Admit pending inners while the open-count cap allows.
    fn admit(&mut self, pending: &mut VecDeque<Source<A>>) {
        while self.has_capacity() {
            let Some(source) = pending.pop_front() else {
                break;
            };
            let key = self.inners.insert(Inner::Running(source));
            let index = key + 1;
            self.wakers.resize(index + 1);
            self.mark_ready(index);
        }
    }

    /// An inner finished: resume the parked outer if the cap now allows.
    fn admit_after_finish(&mut self) {
        let outer = std::mem::replace(&mut self.outer, Outer::Done(Cause::End));
        self.outer = match outer {
            Outer::Backoff {
                mut pending,
                resume,
            } => {
                self.admit(&mut pending);
                if pending.is_empty() && self.has_capacity() {
                    self.mark_ready(OUTER_INDEX);
                    Outer::Fetching(resume(Cause::End))
                } else {
                    Outer::Backoff { pending, resume }
                }
            }
            other => other,
        };
    }

    /// Stop everything: cancel in-flight fetches, drive parked and backoff
    /// continuations with `Kill`, discard the buffer. Returns `cause`
    /// folded with any cleanup errors.
    async fn shutdown(&mut self, cause: Cause) -> Cause {
        let mut terminal = cause;
        match std::mem::replace(&mut self.outer, Outer::Done(Cause::Kill)) {
            Outer::Fetching(source) => drop(source),
            Outer::Backoff { pending, resume } => {
                drop(pending);
                terminal = terminal.caused_by(drive_kill(resume).await.residual());
            }
            Outer::Done(_) => {}
        }
        let keys: SmallVec<[usize; 8]> = self.inners.iter().map(|(key, _)| key).collect();
        for key in keys {
            match self.inners.remove(key) {
                Inner::Running(source) => drop(source),
                Inner::Parked { rest, resume } => {
                    drop(rest);
                    terminal = terminal.caused_by(drive_kill(resume).await.residual());
                }
            }
        }
        self.buffer.clear();
        terminal
    }
}
