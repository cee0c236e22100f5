use core::fmt;
use std::collections::VecDeque;

use crate::cause::Cause;

/// Delivery for a [`Wye::AwaitBoth`] suspension: whichever side produced
/// first, or the halt of one side.
#[derive(Debug)]
pub enum ReceiveY<L, R> {
    /// An element arrived from the left side.
    ReceiveL(L),
    /// An element arrived from the right side.
    ReceiveR(R),
    /// The left side halted.
    HaltL(Cause),
    /// The right side halted.
    HaltR(Cause),
}

type EmitK<L, R, O> = Box<dyn FnOnce(Cause) -> Wye<L, R, O>>;
type OneK<T, L, R, O> = Box<dyn FnOnce(Result<T, Cause>) -> Wye<L, R, O>>;
type BothK<L, R, O> = Box<dyn FnOnce(ReceiveY<L, R>) -> Wye<L, R, O>>;

/// A merge program: a pure, suspended state machine that decides at each
/// step which side(s) of a [`wye`][super::wye] merge to read from and what
/// to emit.
///
/// A program never performs I/O itself. The engine fetches chunks from the
/// two sources and feeds them in with [`feed_l`][Wye::feed_l] /
/// [`feed_r`][Wye::feed_r]; when a side halts, the engine disconnects it
/// with [`disconnect_l`][Wye::disconnect_l] /
/// [`disconnect_r`][Wye::disconnect_r] so every pending and future request
/// for that side immediately observes the halt.
pub enum Wye<L, R, O> {
    /// Emit a chunk, then continue with the continuation.
    Emit(Vec<O>, EmitK<L, R, O>),
    /// Wait for an element from the left side; `Err` is the left halt.
    AwaitL(OneK<L, L, R, O>),
    /// Wait for an element from the right side; `Err` is the right halt.
    AwaitR(OneK<R, L, R, O>),
    /// Wait for whichever side produces first.
    AwaitBoth(BothK<L, R, O>),
    /// The program is finished.
    Halt(Cause),
}

impl<L, R, O: fmt::Debug> fmt::Debug for Wye<L, R, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wye::Emit(chunk, _) => f.debug_tuple("Emit").field(chunk).finish(),
            Wye::AwaitL(_) => f.write_str("AwaitL"),
            Wye::AwaitR(_) => f.write_str("AwaitR"),
            Wye::AwaitBoth(_) => f.write_str("AwaitBoth"),
            Wye::Halt(cause) => f.debug_tuple("Halt").field(cause).finish(),
        }
    }
}

impl<L: 'static, R: 'static, O: 'static> Wye<L, R, O> {
    /// Emit one element, then continue with `then` (on abrupt causes the
    /// program halts with that cause instead).
    pub fn emit_one(item: O, then: impl FnOnce() -> Self + 'static) -> Self {
        Wye::Emit(
            vec![item],
            Box::new(move |cause| match cause {
                Cause::End => then(),
                abrupt => Wye::Halt(abrupt),
            }),
        )
    }

    /// Suspend on the left side.
    pub fn receive_l(f: impl FnOnce(Result<L, Cause>) -> Self + 'static) -> Self {
        Wye::AwaitL(Box::new(f))
    }

    /// Suspend on the right side.
    pub fn receive_r(f: impl FnOnce(Result<R, Cause>) -> Self + 'static) -> Self {
        Wye::AwaitR(Box::new(f))
    }

    /// Suspend on whichever side produces first.
    pub fn receive_both(f: impl FnOnce(ReceiveY<L, R>) -> Self + 'static) -> Self {
        Wye::AwaitBoth(Box::new(f))
    }

    /// Feed left-side elements into the program, one at a time, for as long
    /// as it keeps requesting the left side. Elements that are not consumed
    /// are buffered inside the returned program and fed after the next step
    /// that unblocks it.
    #[must_use]
    pub fn feed_l(self, elems: impl IntoIterator<Item = L>) -> Self {
        let mut elems: VecDeque<L> = elems.into_iter().collect();
        let mut cur = self;
        loop {
            cur = match cur {
                Wye::AwaitL(k) => match elems.pop_front() {
                    Some(elem) => k(Ok(elem)),
                    None => return Wye::AwaitL(k),
                },
                Wye::AwaitBoth(k) => match elems.pop_front() {
                    Some(elem) => k(ReceiveY::ReceiveL(elem)),
                    None => return Wye::AwaitBoth(k),
                },
                Wye::Emit(chunk, k) if elems.is_empty() => return Wye::Emit(chunk, k),
                Wye::Emit(chunk, k) => {
                    return Wye::Emit(chunk, Box::new(move |cause| k(cause).feed_l(elems)))
                }
                Wye::AwaitR(k) if elems.is_empty() => return Wye::AwaitR(k),
                Wye::AwaitR(k) => {
                    return Wye::AwaitR(Box::new(move |delivery| k(delivery).feed_l(elems)))
                }
                halted @ Wye::Halt(_) => return halted,
            };
        }
    }

    /// Feed right-side elements into the program; see [`feed_l`][Wye::feed_l].
    #[must_use]
    pub fn feed_r(self, elems: impl IntoIterator<Item = R>) -> Self {
        let mut elems: VecDeque<R> = elems.into_iter().collect();
        let mut cur = self;
        loop {
            cur = match cur {
                Wye::AwaitR(k) => match elems.pop_front() {
                    Some(elem) => k(Ok(elem)),
                    None => return Wye::AwaitR(k),
                },
                Wye::AwaitBoth(k) => match elems.pop_front() {
                    Some(elem) => k(ReceiveY::ReceiveR(elem)),
                    None => return Wye::AwaitBoth(k),
                },
                Wye::Emit(chunk, k) if elems.is_empty() => return Wye::Emit(chunk, k),
                Wye::Emit(chunk, k) => {
                    return Wye::Emit(chunk, Box::new(move |cause| k(cause).feed_r(elems)))
                }
                Wye::AwaitL(k) if elems.is_empty() => return Wye::AwaitL(k),
                Wye::AwaitL(k) => {
                    return Wye::AwaitL(Box::new(move |delivery| k(delivery).feed_r(elems)))
                }
                halted @ Wye::Halt(_) => return halted,
            };
        }
    }

    /// Deliver the left side's halt to every pending and future request for
    /// the left side.
    #[must_use]
    pub fn disconnect_l(self, cause: Cause) -> Self {
        let mut cur = self;
        loop {
            cur = match cur {
                Wye::AwaitL(k) => k(Err(cause.clone())),
                Wye::AwaitBoth(k) => k(ReceiveY::HaltL(cause.clone())),
                Wye::Emit(chunk, k) => {
                    return Wye::Emit(chunk, Box::new(move |c| k(c).disconnect_l(cause)))
                }
                Wye::AwaitR(k) => {
                    return Wye::AwaitR(Box::new(move |delivery| k(delivery).disconnect_l(cause)))
                }
                halted @ Wye::Halt(_) => return halted,
            };
        }
    }

    /// Deliver the right side's halt to every pending and future request
    /// for the right side.
    #[must_use]
    pub fn disconnect_r(self, cause: Cause) -> Self {
        let mut cur = self;
        loop {
            cur = match cur {
                Wye::AwaitR(k) => k(Err(cause.clone())),
                Wye::AwaitBoth(k) => k(ReceiveY::HaltR(cause.clone())),
                Wye::Emit(chunk, k) => {
                    return Wye::Emit(chunk, Box::new(move |c| k(c).disconnect_r(cause)))
                }
                Wye::AwaitL(k) => {
                    return Wye::AwaitL(Box::new(move |delivery| k(delivery).disconnect_r(cause)))
                }
                halted @ Wye::Halt(_) => return halted,
            };
        }
    }

    /// Abruptly drain the program: disconnect both sides with the killed
    /// cause, fold away its remaining emits, and return its halt cause.
    pub(crate) fn drain_abrupt(self, cause: Cause) -> Cause {
        let kill = cause.kill();
        let mut cur = self
            .disconnect_l(kill.clone())
            .disconnect_r(kill.clone());
        loop {
            match cur {
                Wye::Emit(_, k) => cur = k(kill.clone()),
                Wye::Halt(halted) => return halted,
                Wye::AwaitL(_) | Wye::AwaitR(_) | Wye::AwaitBoth(_) => {
                    unreachable!("disconnected program cannot suspend")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wye::programs;

    fn emits<L: 'static, R: 'static, O: 'static>(program: Wye<L, R, O>) -> (Vec<O>, Wye<L, R, O>) {
        let mut out = Vec::new();
        let mut cur = program;
        loop {
            match cur {
                Wye::Emit(chunk, k) => {
                    out.extend(chunk);
                    cur = k(Cause::End);
                }
                other => return (out, other),
            }
        }
    }

    #[test]
    fn feed_l_buffers_unconsumed_elements() {
        // yip consumes one left element, then requests the right side; the
        // rest of the chunk must wait inside the program.
        let program = programs::yip::<u32, u32>().feed_l(vec![1, 2, 3]);
        assert!(matches!(program, Wye::AwaitR(_)));

        let program = program.feed_r(vec![10]);
        let (out, rest) = emits(program);
        assert_eq!(out, vec![(1, 10)]);
        // the buffered 2 was fed after the emit; 3 is still queued
        assert!(matches!(rest, Wye::AwaitR(_)));

        let (out, rest) = emits(rest.feed_r(vec![20, 30]));
        assert_eq!(out, vec![(2, 20), (3, 30)]);
        assert!(matches!(rest, Wye::AwaitL(_)));
    }

    #[test]
    fn disconnect_l_resolves_pending_awaits() {
        let program = programs::yip::<u32, u32>().disconnect_l(Cause::End);
        assert!(matches!(program, Wye::Halt(Cause::End)));
    }

    #[test]
    fn disconnect_r_seals_future_requests() {
        // feed one left element so yip suspends on the right, then cut the
        // right side: the program must halt rather than wait forever.
        let program = programs::yip::<u32, u32>()
            .feed_l(vec![1])
            .disconnect_r(Cause::Kill);
        assert!(matches!(program, Wye::Halt(Cause::Kill)));
    }

    #[test]
    fn merge_continues_after_one_side_ends() {
        let program = programs::merge::<u32>()
            .feed_l(vec![1])
            .disconnect_l(Cause::End)
            .feed_r(vec![2, 3]);
        let (out, rest) = emits(program);
        assert_eq!(out, vec![1, 2, 3]);
        assert!(matches!(rest, Wye::AwaitR(_)));
    }

    #[test]
    fn drain_abrupt_reports_the_program_cause() {
        let cause = programs::merge::<u32>()
            .feed_l(vec![1, 2])
            .drain_abrupt(Cause::Kill);
        assert!(cause.is_kill());
    }

    #[test]
    fn interrupt_halts_on_true_signal() {
        let program = programs::interrupt::<u32>().feed_r(vec![7]);
        let (out, rest) = emits(program);
        assert_eq!(out, vec![7]);
        let stopped = rest.feed_l(vec![true]);
        assert!(matches!(stopped, Wye::Halt(Cause::End)));
    }
}
