//! Termination causes.
//!
//! Every stream in this crate terminates with a [`Cause`]: `End` for normal
//! exhaustion, `Kill` for forced cancellation, `Error` for failure. Causes
//! flow through the same channels as data, so cleanup and error propagation
//! need no out-of-band signalling.

use core::fmt;
use std::error::Error as StdError;
use std::sync::Arc;

use smallvec::SmallVec;

/// Why a stream terminated.
#[derive(Clone, Debug)]
pub enum Cause {
    /// The stream was exhausted normally.
    End,
    /// The stream was cancelled; finalizers run but no new work starts.
    Kill,
    /// The stream failed.
    Error(Fault),
}

impl Cause {
    /// Combine two causes into one.
    ///
    /// `Error` dominates non-`Error`, `Kill` dominates `End`, and two
    /// `Error`s chain into a single `Error` recording both faults.
    ///
    /// ```
    /// use stream_confluence::cause::Cause;
    ///
    /// assert!(Cause::End.caused_by(Cause::Kill).is_kill());
    /// assert!(Cause::Kill.caused_by(Cause::End).is_kill());
    /// assert!(Cause::End.caused_by(Cause::End).is_end());
    /// ```
    #[must_use]
    pub fn caused_by(self, other: Cause) -> Cause {
        match (self, other) {
            (Cause::Error(a), Cause::Error(b)) => Cause::Error(a.chain(b)),
            (Cause::Error(fault), _) | (_, Cause::Error(fault)) => Cause::Error(fault),
            (Cause::Kill, _) | (_, Cause::Kill) => Cause::Kill,
            (Cause::End, Cause::End) => Cause::End,
        }
    }

    /// Promote `End` to `Kill`; `Kill` and `Error` are unchanged.
    #[must_use]
    pub fn kill(self) -> Cause {
        match self {
            Cause::End => Cause::Kill,
            other => other,
        }
    }

    /// Returns `true` for [`Cause::End`].
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Cause::End)
    }

    /// Returns `true` for [`Cause::Kill`].
    #[must_use]
    pub const fn is_kill(&self) -> bool {
        matches!(self, Cause::Kill)
    }

    /// Returns `true` for [`Cause::Error`].
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Cause::Error(_))
    }

    /// The outcome of an engine-requested kill: only errors survive into
    /// the terminal cause of the surrounding merge.
    #[must_use]
    pub(crate) fn residual(self) -> Cause {
        match self {
            Cause::Error(fault) => Cause::Error(fault),
            Cause::End | Cause::Kill => Cause::End,
        }
    }
}

/// The payload of a [`Cause::Error`]: a cheaply clonable chain of one or
/// more underlying errors. When two failures combine, their faults chain so
/// neither payload is lost.
#[derive(Clone)]
pub struct Fault {
    chain: SmallVec<[Arc<dyn StdError + Send + Sync>; 1]>,
}

impl Fault {
    /// Wrap an error value.
    pub fn new(error: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            chain: smallvec::smallvec![Arc::new(error) as Arc<dyn StdError + Send + Sync>],
        }
    }

    /// Create a fault from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Append another fault's errors to this one.
    #[must_use]
    pub fn chain(mut self, other: Fault) -> Self {
        self.chain.extend(other.chain);
        self
    }

    /// Iterate over the recorded errors, oldest first.
    pub fn errors(&self) -> impl Iterator<Item = &(dyn StdError + Send + Sync)> {
        self.chain.iter().map(|error| error.as_ref())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.chain.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.chain.iter().map(|error| error.to_string()))
            .finish()
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.chain
            .first()
            .map(|error| error.as_ref() as &(dyn StdError + 'static))
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}
