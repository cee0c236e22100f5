//! WYE: a two-source nondeterministic merge driven by a merge program.
//!
//! [`wye`] connects a left source, a right source, and a [`Wye`] merge
//! program. The engine fetches from whichever side(s) the program requests,
//! feeds arrivals back into the program element by element, and surfaces
//! the program's emits as the output source. Termination of any kind
//! propagates to both sides so that every
//! finalizer runs exactly once and neither producer outlives its consumer.

mod program;
pub mod programs;

pub use program::{ReceiveY, Wye};

use std::future::poll_fn;
use std::task::Poll;

use crate::cause::Cause;
use crate::source::{drive_kill, IntoSource, Resume, Source, Step};

/// Merge two sources with the given merge program.
///
/// The program observes deliveries in the order it requested them, except
/// that [`Wye::AwaitBoth`] delivers whichever side arrives first (with the
/// dispatch order alternating between the sides). When the program halts,
/// or the consumer stops the output with an abrupt cause, both sides are
/// stopped before the output terminates; a side's `Error` reaches the
/// program as that side's halt, and the program decides whether to
/// continue.
///
/// ```
/// use stream_confluence::wye::{programs, wye};
///
/// futures_lite::future::block_on(async {
///     let out = wye(vec![1, 2, 3], vec![10, 20], programs::yip());
///     let (pairs, cause) = out.run_collect().await;
///     assert_eq!(pairs, vec![(1, 10), (2, 20)]);
///     assert!(cause.is_end());
/// });
/// ```
pub fn wye<PL, PR, O>(left: PL, right: PR, program: Wye<PL::Item, PR::Item, O>) -> Source<O>
where
    PL: IntoSource,
    PR: IntoSource,
    PL::Item: 'static,
    PR::Item: 'static,
    O: 'static,
{
    engine_step(Engine {
        program,
        left: Side::idle(left.into_source()),
        right: Side::idle(right.into_source()),
        left_bias: true,
    })
}

/// One input of the merge.
enum Side<T> {
    /// The next-step continuation has not been invoked yet.
    Idle(Resume<T>),
    /// A fetch is in flight.
    Running(Source<T>),
    /// The side terminated; no further reads.
    Done(Cause),
}

impl<T: 'static> Side<T> {
    fn idle(source: Source<T>) -> Self {
        Side::Idle(Box::new(move |cause| match cause {
            Cause::End => source,
            abrupt => {
                drop(source);
                Source::halt(abrupt)
            }
        }))
    }

    /// Start a fetch; no-op unless the side is idle.
    fn start(&mut self) {
        let state = std::mem::replace(self, Side::Done(Cause::End));
        *self = match state {
            Side::Idle(resume) => Side::Running(resume(Cause::End)),
            other => other,
        };
    }
}

struct Engine<L, R, O> {
    program: Wye<L, R, O>,
    left: Side<L>,
    right: Side<R>,
    left_bias: bool,
}

enum Arrival<L, R> {
    Left(Step<L>),
    Right(Step<R>),
}

impl<L: 'static, R: 'static, O: 'static> Engine<L, R, O> {
    fn take_program(&mut self) -> Wye<L, R, O> {
        std::mem::replace(&mut self.program, Wye::Halt(Cause::End))
    }

    /// Wait for any running side to complete its fetch, then record the
    /// result and feed it to the program.
    async fn next_arrival(&mut self) {
        let arrival = poll_fn(|cx| {
            if self.left_bias {
                if let Side::Running(source) = &mut self.left {
                    if let Poll::Ready(step) = source.poll_step(cx) {
                        return Poll::Ready(Arrival::Left(step));
                    }
                }
                if let Side::Running(source) = &mut self.right {
                    if let Poll::Ready(step) = source.poll_step(cx) {
                        return Poll::Ready(Arrival::Right(step));
                    }
                }
            } else {
                if let Side::Running(source) = &mut self.right {
                    if let Poll::Ready(step) = source.poll_step(cx) {
                        return Poll::Ready(Arrival::Right(step));
                    }
                }
                if let Side::Running(source) = &mut self.left {
                    if let Poll::Ready(step) = source.poll_step(cx) {
                        return Poll::Ready(Arrival::Left(step));
                    }
                }
            }
            Poll::Pending
        })
        .await;

        match arrival {
            Arrival::Left(Step::Emit(chunk, resume)) => {
                self.left = Side::Idle(resume);
                let program = self.take_program();
                self.program = program.feed_l(chunk);
            }
            Arrival::Left(Step::Halt(cause)) => {
                self.left = Side::Done(cause.clone());
                let program = self.take_program();
                self.program = program.disconnect_l(cause);
            }
            Arrival::Right(Step::Emit(chunk, resume)) => {
                self.right = Side::Idle(resume);
                let program = self.take_program();
                self.program = program.feed_r(chunk);
            }
            Arrival::Right(Step::Halt(cause)) => {
                self.right = Side::Done(cause.clone());
                let program = self.take_program();
                self.program = program.disconnect_r(cause);
            }
        }
    }
}

fn engine_step<L: 'static, R: 'static, O: 'static>(mut this: Engine<L, R, O>) -> Source<O> {
    Source::new(async move {
        loop {
            match this.take_program() {
                Wye::Emit(chunk, resume) if chunk.is_empty() => {
                    this.program = resume(Cause::End);
                }
                Wye::Emit(chunk, resume) => {
                    return Step::Emit(
                        chunk,
                        Box::new(move |cause| {
                            let mut this = this;
                            match cause {
                                Cause::End => {
                                    this.program = resume(Cause::End);
                                    engine_step(this)
                                }
                                abrupt => {
                                    this.program = Wye::Emit(Vec::new(), resume);
                                    shutdown(this, abrupt)
                                }
                            }
                        }),
                    );
                }
                Wye::Halt(cause) => {
                    return finish(this.left, this.right, cause).await;
                }
                Wye::AwaitL(k) => {
                    if let Side::Done(cause) = &this.left {
                        let cause = cause.clone();
                        this.program = Wye::AwaitL(k).disconnect_l(cause);
                        continue;
                    }
                    this.program = Wye::AwaitL(k);
                    this.left_bias = false;
                    this.left.start();
                    this.next_arrival().await;
                }
                Wye::AwaitR(k) => {
                    if let Side::Done(cause) = &this.right {
                        let cause = cause.clone();
                        this.program = Wye::AwaitR(k).disconnect_r(cause);
                        continue;
                    }
                    this.program = Wye::AwaitR(k);
                    this.left_bias = true;
                    this.right.start();
                    this.next_arrival().await;
                }
                Wye::AwaitBoth(k) => {
                    if let Side::Done(cause) = &this.left {
                        let cause = cause.clone();
                        this.program = Wye::AwaitBoth(k).disconnect_l(cause);
                        continue;
                    }
                    if let Side::Done(cause) = &this.right {
                        let cause = cause.clone();
                        this.program = Wye::AwaitBoth(k).disconnect_r(cause);
                        continue;
                    }
                    this.program = Wye::AwaitBoth(k);
                    if this.left_bias {
                        this.left.start();
                        this.right.start();
                    } else {
                        this.right.start();
                        this.left.start();
                    }
                    this.left_bias = !this.left_bias;
                    this.next_arrival().await;
                }
            }
        }
    })
}

/// The consumer stopped the output: drain the program, stop both sides,
/// and halt with the combined cause.
fn shutdown<L: 'static, R: 'static, O: 'static>(
    engine: Engine<L, R, O>,
    cause: Cause,
) -> Source<O> {
    Source::new(async move {
        let Engine {
            program,
            left,
            right,
            ..
        } = engine;
        let program_cause = program.drain_abrupt(cause.clone());
        finish(left, right, cause.kill().caused_by(program_cause)).await
    })
}

/// Stop both sides and compose the terminal cause. A side cause produced by
/// the kill request itself contributes nothing; a side's error always
/// surfaces.
async fn finish<L: 'static, R: 'static, O: 'static>(
    left: Side<L>,
    right: Side<R>,
    cause: Cause,
) -> Step<O> {
    let left_residual = kill_side(left).await;
    let right_residual = kill_side(right).await;
    Step::Halt(cause.caused_by(left_residual.caused_by(right_residual)))
}

async fn kill_side<T: 'static>(side: Side<T>) -> Cause {
    match side {
        Side::Done(cause) => cause.residual(),
        // cancel the in-flight fetch at its current suspension
        Side::Running(source) => {
            drop(source);
            Cause::End
        }
        Side::Idle(resume) => drive_kill(resume).await.residual(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use futures_lite::future::block_on;

    use crate::cause::Fault;
    use crate::utils::channel::channel;

    use super::*;

    fn counter() -> (Rc<Cell<usize>>, impl FnOnce()) {
        let count = Rc::new(Cell::new(0));
        let fin = {
            let count = Rc::clone(&count);
            move || count.set(count.get() + 1)
        };
        (count, fin)
    }

    #[test]
    fn yip_pairs_until_the_shorter_side_ends() {
        block_on(async {
            let out = wye(vec![1, 2, 3], vec![10, 20], programs::yip());
            let (pairs, cause) = out.run_collect().await;
            assert_eq!(pairs, vec![(1, 10), (2, 20)]);
            assert!(cause.is_end());
        });
    }

    #[test]
    fn merge_emits_everything_from_both_sides() {
        block_on(async {
            let out = wye(vec![1, 2, 3], vec![10, 20], programs::merge());
            let (mut items, cause) = out.run_collect().await;
            items.sort_unstable();
            assert_eq!(items, vec![1, 2, 3, 10, 20]);
            assert!(cause.is_end());
        });
    }

    #[test]
    fn merge_surfaces_a_side_error() {
        block_on(async {
            let right = Source::<i32>::fail(Fault::message("boom"));
            let out = wye(vec![1, 2, 3], right, programs::merge());
            let (items, cause) = out.run_collect().await;
            assert!(items.iter().all(|item| [1, 2, 3].contains(item)));
            assert!(cause.is_error());
        });
    }

    #[test]
    fn finalizers_run_exactly_once_on_normal_end() {
        let (left_count, left_fin) = counter();
        let (right_count, right_fin) = counter();
        block_on(async {
            let left = Source::from_iter(vec![1, 2, 3]).with_finalizer(left_fin);
            let right = Source::from_iter(vec![10, 20]).with_finalizer(right_fin);
            let (_, cause) = wye(left, right, programs::yip()).run_collect().await;
            assert!(cause.is_end());
        });
        assert_eq!(left_count.get(), 1);
        assert_eq!(right_count.get(), 1);
    }

    #[test]
    fn consumer_kill_stops_both_sides() {
        let (left_count, left_fin) = counter();
        let (right_count, right_fin) = counter();
        block_on(async {
            let left = Source::from_iter(vec![1, 2, 3]).with_finalizer(left_fin);
            let right = Source::from_iter(vec![10, 20]).with_finalizer(right_fin);
            let out = wye(left, right, programs::merge());
            let Step::Emit(chunk, resume) = out.step().await else {
                panic!("expected a first chunk");
            };
            assert!(!chunk.is_empty());
            let Step::Halt(cause) = resume(Cause::Kill).step().await else {
                panic!("expected the kill to terminate the merge");
            };
            assert!(cause.is_kill());
        });
        assert_eq!(left_count.get(), 1);
        assert_eq!(right_count.get(), 1);
    }

    #[test]
    fn interrupt_kills_a_side_mid_fetch() {
        let (right_count, right_fin) = counter();
        block_on(async {
            let right = Source::<i32>::pending().with_finalizer(right_fin);
            let out = wye(vec![true], right, programs::interrupt());
            let (items, cause) = out.run_collect().await;
            assert!(items.is_empty());
            assert!(cause.is_end());
        });
        assert_eq!(right_count.get(), 1);
    }

    #[test]
    fn either_tags_the_originating_side() {
        block_on(async {
            let out = wye(vec![1], vec![10], programs::either());
            let (items, cause) = out.run_collect().await;
            let (lefts, rights): (Vec<_>, Vec<_>) =
                items.into_iter().partition(|item| item.is_left());
            assert_eq!(lefts.len(), 1);
            assert_eq!(rights.len(), 1);
            assert!(cause.is_end());
        });
    }

    /// Channel-fed sides stay pending until their producer sends, so this
    /// exercises the wake path rather than always-ready sources.
    #[test]
    fn merge_interleaves_channel_sides() {
        let mut pool = LocalPool::new();
        let done = Rc::new(Cell::new(false));
        let observed = Rc::clone(&done);

        pool.spawner()
            .spawn_local(async move {
                let (left_send, left) = channel::<u32>();
                let (right_send, right) = channel::<u32>();
                let consumer = async move {
                    let (mut items, cause) =
                        wye(left, right, programs::merge()).run_collect().await;
                    items.sort_unstable();
                    assert_eq!(items, vec![1, 2, 3, 4]);
                    assert!(cause.is_end());
                };
                let producer = async move {
                    left_send.send(1);
                    right_send.send(2);
                    left_send.send(3);
                    right_send.send(4);
                    drop(left_send);
                    drop(right_send);
                };
                futures::join!(consumer, producer);
                observed.set(true);
            })
            .unwrap();

        pool.run();
        assert!(done.get());
    }
}
