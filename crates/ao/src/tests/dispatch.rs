use std::sync::mpsc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::{
    ActiveObject, Behavior, CallError, CallResult, Callback, Deferred, DeferredMethod, Method,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Sequencer {
    next: u64,
}

impl Behavior for Sequencer {}

impl Sequencer {
    fn stamp(&mut self, tag: u32) -> (u32, u64) {
        self.next += 1;
        (tag, self.next)
    }

    fn add(&mut self, (a, b): (i64, i64)) -> i64 {
        self.next += 1;
        a + b
    }

    fn touch(&mut self, _: ()) {
        self.next += 1;
    }

    fn count(&mut self, _: ()) -> u64 {
        self.next
    }

    fn explode(&mut self, _: ()) -> u64 {
        panic!("method exploded")
    }
}

#[test]
fn async_results_follow_enqueue_order() {
    let ao = ActiveObject::spawn(Sequencer::default()).unwrap();
    let stamp = Method::new(ao.handle(), Sequencer::stamp);

    let futures: Vec<_> = (0..32).map(|tag| stamp.call_async(tag)).collect();
    for (expected, future) in futures.into_iter().enumerate() {
        let (tag, seq) = future.wait().unwrap();
        assert_eq!(tag as usize, expected);
        assert_eq!(seq, expected as u64 + 1);
    }
}

#[test]
fn per_producer_order_holds_with_many_producers() {
    let ao = ActiveObject::spawn(Sequencer::default()).unwrap();
    let stamp = Method::new(ao.handle(), Sequencer::stamp);

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let stamp = stamp.clone();
            thread::spawn(move || {
                let futures: Vec<_> = (0..50).map(|_| stamp.call_async(producer)).collect();
                futures
                    .into_iter()
                    .map(|future| future.wait().unwrap().1)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for producer in producers {
        let seqs = producer.join().unwrap();
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
        all.extend(seqs);
    }
    all.sort_unstable();
    assert_eq!(all, (1..=200).collect::<Vec<_>>());
}

#[test]
fn blocking_call_matches_async_call() {
    let ao = ActiveObject::spawn(Sequencer::default()).unwrap();
    let add = Method::new(ao.handle(), Sequencer::add);

    let blocking = add.call((40, 2));
    let deferred = add.call_async((40, 2)).wait();
    assert_eq!(blocking, Ok(42));
    assert_eq!(blocking, deferred);
}

#[test]
fn unit_methods_use_the_same_surface() {
    let ao = ActiveObject::spawn(Sequencer::default()).unwrap();
    let touch = Method::new(ao.handle(), Sequencer::touch);
    let count = Method::new(ao.handle(), Sequencer::count);

    assert_eq!(touch.call(()), Ok(()));
    assert_eq!(touch.call_async(()).wait(), Ok(()));
    for _ in 0..10 {
        touch.call_and_forget(());
    }
    assert_eq!(count.call(()), Ok(12));
}

#[test]
fn panicking_method_reports_fault_and_object_survives() {
    let ao = ActiveObject::spawn(Sequencer::default()).unwrap();
    let explode = Method::new(ao.handle(), Sequencer::explode);
    let count = Method::new(ao.handle(), Sequencer::count);

    assert_eq!(
        explode.call(()),
        Err(CallError::Panicked("method exploded".into()))
    );
    explode.call_and_forget(());
    assert_eq!(count.call(()), Ok(0));
    ao.shutdown().unwrap();
}

#[test]
fn blocking_call_from_own_worker_is_refused() {
    let ao = ActiveObject::spawn(Sequencer::default()).unwrap();
    let (tx, rx) = mpsc::channel();

    ao.send(move |_sequencer, ctx| {
        let count = Method::new(ctx.handle().clone(), Sequencer::count);
        tx.send(count.call(())).unwrap();
    })
    .unwrap();

    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), Err(CallError::Reentrant));
}

struct Client {
    replies: mpsc::Sender<(CallResult<i64>, ThreadId)>,
}

impl Behavior for Client {}

#[test]
fn callback_runs_on_the_callback_owners_thread() {
    let server = ActiveObject::spawn(Sequencer::default()).unwrap();
    let (tx, rx) = mpsc::channel();
    let client = ActiveObject::spawn(Client { replies: tx }).unwrap();

    let add = Method::new(server.handle(), Sequencer::add);
    add.call_then(
        (20, 22),
        Callback::new(client.handle(), |client: &mut Client, result: CallResult<i64>| {
            client
                .replies
                .send((result, thread::current().id()))
                .unwrap();
        }),
    );

    let (result, ran_on) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(result, Ok(42));
    assert_eq!(Some(ran_on), client.thread_id());
    assert_ne!(Some(ran_on), server.thread_id());
    assert_ne!(ran_on, thread::current().id());
}

#[test]
fn callback_receives_rejection_from_terminated_target() {
    let server = ActiveObject::spawn(Sequencer::default()).unwrap();
    let add = Method::new(server.handle(), Sequencer::add);
    server.shutdown().unwrap();

    let (tx, rx) = mpsc::channel();
    let client = ActiveObject::spawn(Client { replies: tx }).unwrap();
    add.call_then(
        (1, 1),
        Callback::new(client.handle(), |client: &mut Client, result: CallResult<i64>| {
            client
                .replies
                .send((result, thread::current().id()))
                .unwrap();
        }),
    );

    let (result, ran_on) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(result, Err(CallError::NotAccepting));
    assert_eq!(Some(ran_on), client.thread_id());

    // nothing to observe, but it must not panic
    add.call_and_forget((2, 2));
}

/// Holds deferred calls until they are released by a later command.
#[derive(Default)]
struct Gate {
    waiting: Vec<Deferred<u32>>,
}

impl Behavior for Gate {}

impl Gate {
    fn double_now(&mut self, call: Deferred<u32>, value: u32) {
        call.complete(value * 2);
    }

    fn wait_for_open(&mut self, call: Deferred<u32>, _: ()) {
        self.waiting.push(call);
    }

    fn open(&mut self, value: u32) -> usize {
        let released = self.waiting.len();
        for call in self.waiting.drain(..) {
            call.complete(value);
        }
        released
    }

    fn complete_elsewhere(&mut self, call: Deferred<(u32, ThreadId)>, value: u32) {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            call.complete((value + 1, thread::current().id()));
        });
    }

    fn refuse(&mut self, call: Deferred<u32>, _: ()) {
        call.fail("gate is locked");
    }

    fn forget(&mut self, call: Deferred<u32>, _: ()) {
        drop(call);
    }

    fn explode(&mut self, _call: Deferred<u32>, _: ()) {
        panic!("gate exploded");
    }
}

#[test]
fn deferred_completed_inline() {
    let ao = ActiveObject::spawn(Gate::default()).unwrap();
    let double = DeferredMethod::new(ao.handle(), Gate::double_now);

    assert_eq!(double.call(21), Ok(42));
    assert_eq!(double.call_async(5).wait(), Ok(10));
}

#[test]
fn deferred_completed_from_another_thread() {
    let ao = ActiveObject::spawn(Gate::default()).unwrap();
    let remote = DeferredMethod::new(ao.handle(), Gate::complete_elsewhere);

    let (value, completer) = remote.call_async(41).wait().unwrap();
    assert_eq!(value, 42);
    assert_ne!(Some(completer), ao.thread_id());
    assert_ne!(completer, thread::current().id());
}

#[test]
fn deferred_completed_by_a_later_command() {
    let ao = ActiveObject::spawn(Gate::default()).unwrap();
    let wait_for_open = DeferredMethod::new(ao.handle(), Gate::wait_for_open);
    let open = Method::new(ao.handle(), Gate::open);

    let first = wait_for_open.call_async(());
    let second = wait_for_open.call_async(());
    assert!(first.wait_timeout(Duration::from_millis(10)).is_err());

    assert_eq!(open.call(9), Ok(2));
    assert_eq!(second.wait(), Ok(9));
}

#[test]
fn deferred_failures_are_delivered() {
    let ao = ActiveObject::spawn(Gate::default()).unwrap();

    let refuse = DeferredMethod::new(ao.handle(), Gate::refuse);
    assert_eq!(
        refuse.call(()),
        Err(CallError::Failed("gate is locked".into()))
    );

    let forget = DeferredMethod::new(ao.handle(), Gate::forget);
    assert_eq!(forget.call(()), Err(CallError::Abandoned));

    let explode = DeferredMethod::new(ao.handle(), Gate::explode);
    assert!(matches!(explode.call(()), Err(CallError::Panicked(_))));
}

#[test]
fn pending_deferred_calls_are_abandoned_when_the_object_stops() {
    let ao = ActiveObject::spawn(Gate::default()).unwrap();
    let wait_for_open = DeferredMethod::new(ao.handle(), Gate::wait_for_open);

    let pending = wait_for_open.call_async(());
    ao.shutdown().unwrap();

    assert_eq!(pending.wait(), Err(CallError::Abandoned));
    assert_eq!(
        wait_for_open.call_async(()).wait(),
        Err(CallError::NotAccepting)
    );
}

#[test]
fn deferred_result_feeds_a_callback() {
    let gate = ActiveObject::spawn(Gate::default()).unwrap();
    let (tx, rx) = mpsc::channel();
    let client = ActiveObject::spawn(Client { replies: tx }).unwrap();

    let double = DeferredMethod::new(gate.handle(), Gate::double_now);
    double.call_then(
        8,
        Callback::new(client.handle(), |client: &mut Client, result: CallResult<u32>| {
            client
                .replies
                .send((result.map(i64::from), thread::current().id()))
                .unwrap();
        }),
    );

    let (result, ran_on) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(result, Ok(16));
    assert_eq!(Some(ran_on), client.thread_id());
}
