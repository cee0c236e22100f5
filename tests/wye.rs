use std::cell::Cell;
use std::rc::Rc;

use futures_lite::future::block_on;

use stream_confluence::cause::{Cause, Fault};
use stream_confluence::source::{Source, Step};
use stream_confluence::wye::{programs, wye};

fn counter() -> (Rc<Cell<usize>>, impl FnOnce()) {
    let count = Rc::new(Cell::new(0));
    let fin = {
        let count = Rc::clone(&count);
        move || count.set(count.get() + 1)
    };
    (count, fin)
}

#[test]
fn yip_pairs_positionally_and_ends_with_the_shorter_side() {
    block_on(async {
        let out = wye(vec![1, 2, 3], vec![10, 20], programs::yip());
        let (pairs, cause) = out.run_collect().await;
        assert_eq!(pairs, vec![(1, 10), (2, 20)]);
        assert!(cause.is_end());
    });
}

#[test]
fn merge_output_is_an_interleaving_of_both_sides() {
    block_on(async {
        let out = wye(vec![1, 2, 3], vec![10, 20, 30], programs::merge());
        let (items, cause) = out.run_collect().await;
        assert_eq!(items.len(), 6);
        let lefts: Vec<_> = items.iter().copied().filter(|item| *item < 10).collect();
        let rights: Vec<_> = items.iter().copied().filter(|item| *item >= 10).collect();
        assert_eq!(lefts, vec![1, 2, 3]);
        assert_eq!(rights, vec![10, 20, 30]);
        assert!(cause.is_end());
    });
}

#[test]
fn merge_terminates_with_a_failing_side_error() {
    block_on(async {
        let right = Source::<i32>::fail(Fault::message("side failure"));
        let out = wye(vec![1, 2, 3], right, programs::merge());
        let (items, cause) = out.run_collect().await;
        assert!(items.iter().all(|item| [1, 2, 3].contains(item)));
        assert!(cause.is_error());
    });
}

#[test]
fn both_finalizers_run_exactly_once() {
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
fn abandoning_the_output_stops_both_sides() {
    let (left_count, left_fin) = counter();
    let (right_count, right_fin) = counter();
    block_on(async {
        let left = Source::from_iter(vec![1, 2, 3]).with_finalizer(left_fin);
        let right = Source::from_iter(vec![10, 20]).with_finalizer(right_fin);
        let out = wye(left, right, programs::merge());
        let Step::Emit(_, resume) = out.step().await else {
            panic!("expected a first chunk");
        };
        let Step::Halt(cause) = resume(Cause::Kill).step().await else {
            panic!("expected the kill to terminate the merge");
        };
        assert!(cause.is_kill());
    });
    assert_eq!(left_count.get(), 1);
    assert_eq!(right_count.get(), 1);
}

#[test]
fn interrupt_ends_while_the_data_side_is_mid_fetch() {
    let (data_count, data_fin) = counter();
    block_on(async {
        let data = Source::<i32>::pending().with_finalizer(data_fin);
        let out = wye(vec![true], data, programs::interrupt());
        let (items, cause) = out.run_collect().await;
        assert!(items.is_empty());
        assert!(cause.is_end());
    });
    assert_eq!(data_count.get(), 1);
}

#[test]
fn yip_with_combines_pairs() {
    block_on(async {
        let out = wye(vec![1, 2], vec![10, 20], programs::yip_with(|l, r| l + r));
        let (items, cause) = out.run_collect().await;
        assert_eq!(items, vec![11, 22]);
        assert!(cause.is_end());
    });
}
