use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::VecDeque;

use futures_core::Stream;

use crate::cause::{Cause, Fault};

use super::{Source, Step};

impl<T: 'static> Source<T> {
    /// Adapt this source into a [`futures_core::Stream`].
    ///
    /// Elements are yielded one at a time; an `Error` halt surfaces as a
    /// final `Err` item, while `End` and `Kill` end the stream silently.
    ///
    /// ```
    /// use futures_lite::StreamExt;
    /// use stream_confluence::source::Source;
    ///
    /// futures_lite::future::block_on(async {
    ///     let mut stream = Source::from_iter(vec![1, 2]).into_stream();
    ///     assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    ///     assert_eq!(stream.next().await.unwrap().unwrap(), 2);
    ///     assert!(stream.next().await.is_none());
    /// });
    /// ```
    pub fn into_stream(self) -> IntoStream<T> {
        IntoStream {
            buffered: VecDeque::new(),
            state: State::Running(self),
        }
    }
}

/// Stream adapter returned by [`Source::into_stream`].
#[must_use = "streams do nothing unless polled"]
pub struct IntoStream<T> {
    buffered: VecDeque<T>,
    state: State<T>,
}

enum State<T> {
    Running(Source<T>),
    Failed(Fault),
    Done,
}

impl<T> fmt::Debug for IntoStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntoStream").finish_non_exhaustive()
    }
}

impl<T: 'static> Stream for IntoStream<T> {
    type Item = Result<T, Fault>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // SAFETY: `IntoStream` never relies on pinning its fields; `Source<T>` is
        // polled directly (not through a `Pin`), so moving it out is sound.
        let this = unsafe { self.get_unchecked_mut() };
        loop {
            if let Some(item) = this.buffered.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            match core::mem::replace(&mut this.state, State::Done) {
                State::Done => return Poll::Ready(None),
                State::Failed(fault) => return Poll::Ready(Some(Err(fault))),
                State::Running(mut source) => match source.poll_step(cx) {
                    Poll::Pending => {
                        this.state = State::Running(source);
                        return Poll::Pending;
                    }
                    Poll::Ready(Step::Emit(chunk, resume)) => {
                        this.buffered.extend(chunk);
                        this.state = State::Running(resume(Cause::End));
                    }
                    Poll::Ready(Step::Halt(Cause::Error(fault))) => {
                        this.state = State::Failed(fault);
                    }
                    Poll::Ready(Step::Halt(_)) => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_lite::future::block_on;
    use futures_lite::StreamExt;

    use super::*;

    #[test]
    fn yields_elements_then_ends() {
        block_on(async {
            let stream = Source::from_iter(vec![1, 2, 3]).into_stream();
            let items: Vec<_> = stream.map(Result::unwrap).collect().await;
            assert_eq!(items, vec![1, 2, 3]);
        });
    }

    #[test]
    fn error_halt_surfaces_as_err_item() {
        block_on(async {
            let source = Source::from_iter(vec![1]).append(|| Source::fail(Fault::message("boom")));
            let mut stream = source.into_stream();
            assert!(matches!(stream.next().await, Some(Ok(1))));
            assert!(matches!(stream.next().await, Some(Err(_))));
            assert!(stream.next().await.is_none());
        });
    }
}
