//! Stock merge programs.
//!
//! Each of these is an ordinary [`Wye`] value; the concurrent combinators
//! of the surrounding library are these programs fed to
//! [`wye`][super::wye].

use either::Either;

use crate::cause::Cause;

use super::program::{ReceiveY, Wye};

/// Nondeterministic merge: emit elements from whichever side produces
/// first. When one side ends, the other keeps flowing; `Kill` or `Error`
/// on either side halts the program with that cause.
pub fn merge<T: 'static>() -> Wye<T, T, T> {
    Wye::receive_both(|delivery| match delivery {
        ReceiveY::ReceiveL(item) | ReceiveY::ReceiveR(item) => Wye::emit_one(item, merge),
        ReceiveY::HaltL(Cause::End) => right_only(),
        ReceiveY::HaltR(Cause::End) => left_only(),
        ReceiveY::HaltL(cause) | ReceiveY::HaltR(cause) => Wye::Halt(cause),
    })
}

fn left_only<T: 'static>() -> Wye<T, T, T> {
    Wye::receive_l(|delivery| match delivery {
        Ok(item) => Wye::emit_one(item, left_only),
        Err(cause) => Wye::Halt(cause),
    })
}

fn right_only<T: 'static>() -> Wye<T, T, T> {
    Wye::receive_r(|delivery| match delivery {
        Ok(item) => Wye::emit_one(item, right_only),
        Err(cause) => Wye::Halt(cause),
    })
}

/// Pair elements positionally: one from the left, one from the right.
/// Halts as soon as either side halts.
pub fn yip<L: 'static, R: 'static>() -> Wye<L, R, (L, R)> {
    yip_with(|l, r| (l, r))
}

/// Like [`yip`], combining each pair with `f`.
pub fn yip_with<L: 'static, R: 'static, O: 'static>(
    f: impl FnMut(L, R) -> O + 'static,
) -> Wye<L, R, O> {
    fn go<L: 'static, R: 'static, O: 'static>(f: Box<dyn FnMut(L, R) -> O>) -> Wye<L, R, O> {
        Wye::receive_l(move |left| match left {
            Err(cause) => Wye::Halt(cause),
            Ok(l) => Wye::receive_r(move |right| match right {
                Err(cause) => Wye::Halt(cause),
                Ok(r) => {
                    let mut f = f;
                    let item = f(l, r);
                    Wye::emit_one(item, move || go(f))
                }
            }),
        })
    }
    go(Box::new(f))
}

/// Tagged merge: like [`merge`], but each element records which side it
/// came from.
pub fn either<L: 'static, R: 'static>() -> Wye<L, R, Either<L, R>> {
    Wye::receive_both(|delivery| match delivery {
        ReceiveY::ReceiveL(item) => Wye::emit_one(Either::Left(item), either),
        ReceiveY::ReceiveR(item) => Wye::emit_one(Either::Right(item), either),
        ReceiveY::HaltL(Cause::End) => either_right(),
        ReceiveY::HaltR(Cause::End) => either_left(),
        ReceiveY::HaltL(cause) | ReceiveY::HaltR(cause) => Wye::Halt(cause),
    })
}

fn either_left<L: 'static, R: 'static>() -> Wye<L, R, Either<L, R>> {
    Wye::receive_l(|delivery| match delivery {
        Ok(item) => Wye::emit_one(Either::Left(item), either_left),
        Err(cause) => Wye::Halt(cause),
    })
}

fn either_right<L: 'static, R: 'static>() -> Wye<L, R, Either<L, R>> {
    Wye::receive_r(|delivery| match delivery {
        Ok(item) => Wye::emit_one(Either::Right(item), either_right),
        Err(cause) => Wye::Halt(cause),
    })
}

/// Run the right (data) side until the left (signal) side produces `true`,
/// then halt with `End`, which makes the engine kill the data side. A
/// signal that ends without firing leaves the data side flowing.
pub fn interrupt<T: 'static>() -> Wye<bool, T, T> {
    Wye::receive_both(|delivery| match delivery {
        ReceiveY::ReceiveR(item) => Wye::emit_one(item, interrupt),
        ReceiveY::ReceiveL(true) => Wye::Halt(Cause::End),
        ReceiveY::ReceiveL(false) => interrupt(),
        ReceiveY::HaltL(Cause::End) => data_only(),
        ReceiveY::HaltL(cause) | ReceiveY::HaltR(cause) => Wye::Halt(cause),
    })
}

fn data_only<T: 'static>() -> Wye<bool, T, T> {
    Wye::receive_r(|delivery| match delivery {
        Ok(item) => Wye::emit_one(item, data_only),
        Err(cause) => Wye::Halt(cause),
    })
}
