//! Integration tests exercising dispatch and transaction semantics together.
//!
//! These cover the three guarantees the bus exists to provide: receivers run
//! synchronously and block the emitter, they run on the emitting thread, and
//! they share the emitter's transaction scope so one rollback undoes both
//! sides' writes.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tandem_bus::{Error, Event, EventBus, Receiver, SubscriptionHandle, TransactionContext};
use tandem_store_memory::MemoryStore;
use tandem_transaction::{Error as TxnError, TransactionManager};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Appends a marker to a shared log and records the undo with the manager.
struct LogAppender {
    marker: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    transactions: Arc<TransactionManager>,
}

impl Receiver for LogAppender {
    fn receive(&self, _: &Event, _: Option<&TransactionContext>) -> anyhow::Result<Value> {
        self.log.lock().push(self.marker.to_string());
        let log = Arc::clone(&self.log);
        self.transactions.record(move || {
            log.lock().pop();
            Ok(())
        });
        Ok(json!(self.marker))
    }
}

/// Overwrites a store key, the way an update-on-save hook would.
struct StoreWriter {
    store: MemoryStore,
    key: &'static str,
    value: &'static [u8],
}

impl Receiver for StoreWriter {
    fn receive(&self, _: &Event, _: Option<&TransactionContext>) -> anyhow::Result<Value> {
        self.store.put(self.key, Bytes::from_static(self.value));
        Ok(Value::Null)
    }
}

struct ThreadProbe {
    observed: Arc<Mutex<Vec<ThreadId>>>,
}

impl Receiver for ThreadProbe {
    fn receive(&self, event: &Event, _: Option<&TransactionContext>) -> anyhow::Result<Value> {
        // The event's stamp and the thread actually running the receiver
        // must be one and the same.
        assert_eq!(event.emitted_thread(), thread::current().id());
        self.observed.lock().push(thread::current().id());
        Ok(Value::Null)
    }
}

#[test]
fn test_emit_blocks_until_receiver_completes() {
    init_logging();
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let order_in_receiver = Arc::clone(&order);
    bus.subscribe(
        "user.saved",
        move |_: &Event, _: Option<&TransactionContext>| -> anyhow::Result<Value> {
            thread::sleep(Duration::from_millis(150));
            order_in_receiver.lock().push("receiver finished");
            Ok(Value::Null)
        },
    );

    let started = Instant::now();
    bus.emit("user.saved", json!({ "username": "testuser" })).unwrap();
    order.lock().push("emitter resumed");

    // The emitter was blocked for the receiver's full duration and only
    // resumed after it finished.
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(*order.lock(), vec!["receiver finished", "emitter resumed"]);
}

#[test]
fn test_receivers_run_on_the_emitting_thread() {
    init_logging();
    let bus = EventBus::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe("user.saved", ThreadProbe { observed: Arc::clone(&observed) });

    bus.emit("user.saved", json!({})).unwrap();
    assert_eq!(*observed.lock(), vec![thread::current().id()]);

    let worker = {
        let bus = bus.clone();
        thread::spawn(move || {
            bus.emit("user.saved", json!({})).unwrap();
            thread::current().id()
        })
    };
    let worker_id = worker.join().unwrap();

    let observed = observed.lock();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[1], worker_id);
    assert_ne!(observed[1], thread::current().id());
}

#[test]
fn test_rollback_undoes_emitter_and_receiver_writes() {
    init_logging();
    let bus = EventBus::new();
    let store = MemoryStore::new(bus.transactions());

    bus.subscribe(
        "user.saved",
        StoreWriter { store: store.clone(), key: "user", value: b"updated_by_receiver" },
    );

    let result: Result<(), Error> = bus.run_in_transaction(|_ctx| {
        store.put("user", Bytes::from_static(b"original_user"));
        bus.emit("user.saved", json!({ "username": "original_user" }))?;

        // The receiver's overwrite is already visible to the emitter.
        assert_eq!(store.get("user"), Some(Bytes::from_static(b"updated_by_receiver")));

        anyhow::bail!("simulated failure, rolling back");
    });

    assert_matches!(result, Err(Error::Aborted { .. }));
    // Neither the emitter's insert nor the receiver's overwrite survived.
    assert_eq!(store.get("user"), None);
    assert!(store.is_empty());
}

#[test]
fn test_commit_keeps_emitter_and_receiver_writes() {
    let bus = EventBus::new();
    let store = MemoryStore::new(bus.transactions());

    bus.subscribe(
        "user.saved",
        StoreWriter { store: store.clone(), key: "audit", value: b"saved" },
    );

    bus.run_in_transaction(|_ctx| {
        store.put("user", Bytes::from_static(b"original_user"));
        bus.emit("user.saved", json!({}))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(store.get("user"), Some(Bytes::from_static(b"original_user")));
    assert_eq!(store.get("audit"), Some(Bytes::from_static(b"saved")));
}

#[test]
fn test_action_failure_restores_pre_transaction_log() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(
        "appended",
        LogAppender { marker: "a", log: Arc::clone(&log), transactions: bus.transactions() },
    );
    bus.subscribe(
        "appended",
        LogAppender { marker: "b", log: Arc::clone(&log), transactions: bus.transactions() },
    );

    // Success path first: both receivers append, in registration order.
    let outcomes = bus
        .run_in_transaction(|_ctx| Ok(bus.emit("appended", json!({}))?))
        .unwrap();
    assert_eq!(outcomes.outcomes(), vec![json!("a"), json!("b")]);
    assert_eq!(*log.lock(), vec!["a", "b"]);

    log.lock().clear();

    // Failure path: the same appends happen, then roll back with the action.
    let result: Result<(), Error> = bus.run_in_transaction(|_ctx| {
        bus.emit("appended", json!({}))?;
        assert_eq!(*log.lock(), vec!["a", "b"]);
        anyhow::bail!("abort after emit");
    });

    assert_matches!(result, Err(Error::Aborted { .. }));
    assert!(log.lock().is_empty());
}

#[test]
fn test_receiver_failure_reaches_the_emitter_fail_fast() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(
        "appended",
        LogAppender { marker: "ran", log: Arc::clone(&log), transactions: bus.transactions() },
    );
    bus.subscribe(
        "appended",
        |_: &Event, _: Option<&TransactionContext>| -> anyhow::Result<Value> {
            anyhow::bail!("receiver exploded")
        },
    );
    bus.subscribe(
        "appended",
        LogAppender { marker: "skipped", log: Arc::clone(&log), transactions: bus.transactions() },
    );

    let result: Result<(), Error> = bus.run_in_transaction(|_ctx| {
        bus.emit("appended", json!({}))?;
        Ok(())
    });

    // The failure propagated out of emit, aborted the transaction, and the
    // third receiver never ran.
    assert_matches!(result, Err(Error::Aborted { .. }));
    assert!(log.lock().is_empty());

    // Outside any transaction the same failure surfaces directly.
    let err = bus.emit("appended", json!({})).unwrap_err();
    assert_matches!(err, Error::Receiver { index: 1, .. });
    assert_eq!(*log.lock(), vec!["ran"]);
}

#[test]
fn test_nested_emission_completes_before_outer_dispatch_continues() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    {
        let order = Arc::clone(&order);
        bus.subscribe(
            "inner",
            move |_: &Event, _: Option<&TransactionContext>| -> anyhow::Result<Value> {
                order.lock().push("inner");
                Ok(Value::Null)
            },
        );
    }
    {
        let order = Arc::clone(&order);
        let bus_inner = bus.clone();
        bus.subscribe(
            "outer",
            move |_: &Event, _: Option<&TransactionContext>| -> anyhow::Result<Value> {
                order.lock().push("outer start");
                bus_inner.emit("inner", json!({}))?;
                order.lock().push("outer end");
                Ok(Value::Null)
            },
        );
    }

    bus.emit("outer", json!({})).unwrap();

    assert_eq!(*order.lock(), vec!["outer start", "inner", "outer end"]);
}

#[test]
fn test_unsubscribe_during_dispatch_keeps_the_snapshot() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let second: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

    {
        let bus = bus.clone();
        let log = Arc::clone(&log);
        let second = Arc::clone(&second);
        bus.clone().subscribe(
            "appended",
            move |_: &Event, _: Option<&TransactionContext>| -> anyhow::Result<Value> {
                log.lock().push("first");
                if let Some(handle) = second.lock().as_ref() {
                    bus.unsubscribe(handle);
                }
                Ok(Value::Null)
            },
        );
    }
    {
        let log = Arc::clone(&log);
        let handle = bus.subscribe(
            "appended",
            move |_: &Event, _: Option<&TransactionContext>| -> anyhow::Result<Value> {
                log.lock().push("second");
                Ok(Value::Null)
            },
        );
        *second.lock() = Some(handle);
    }

    // The in-flight dispatch still invokes the receiver removed mid-way.
    bus.emit("appended", json!({})).unwrap();
    assert_eq!(*log.lock(), vec!["first", "second"]);

    // The next emission sees the mutated registry.
    bus.emit("appended", json!({})).unwrap();
    assert_eq!(*log.lock(), vec!["first", "second", "first"]);
}

#[test]
fn test_inner_scope_failure_is_isolated_from_the_outer_scope() {
    let bus = EventBus::new();
    let store = MemoryStore::new(bus.transactions());

    bus.run_in_transaction(|_outer| {
        store.put("kept", Bytes::from_static(b"yes"));

        // The nested scope fails on its own; swallowing the error keeps the
        // outer scope alive. Savepoint semantics.
        let inner: Result<(), Error> = bus.run_in_transaction(|_inner| {
            store.put("discarded", Bytes::from_static(b"no"));
            anyhow::bail!("inner failure");
        });
        assert_matches!(inner, Err(Error::Aborted { .. }));
        assert_eq!(store.get("discarded"), None);

        Ok(())
    })
    .unwrap();

    assert_eq!(store.get("kept"), Some(Bytes::from_static(b"yes")));
}

#[test]
fn test_inner_commit_merges_into_outer_rollback() {
    let bus = EventBus::new();
    let store = MemoryStore::new(bus.transactions());

    let outer = bus.begin();
    store.put("outer", Bytes::from_static(b"a"));

    let inner = bus.begin();
    store.put("inner", Bytes::from_static(b"b"));
    bus.commit(&inner).unwrap();

    // The committed inner records moved to the outer scope; rolling the
    // outer scope back undoes both writes.
    bus.rollback(&outer).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_context_free_emission_has_no_rollback_capability() {
    let bus = EventBus::new();
    let store = MemoryStore::new(bus.transactions());
    let saw_context = Arc::new(Mutex::new(Vec::new()));

    {
        let store = store.clone();
        let saw_context = Arc::clone(&saw_context);
        bus.subscribe(
            "user.saved",
            move |_: &Event, txn: Option<&TransactionContext>| -> anyhow::Result<Value> {
                saw_context.lock().push(txn.is_some());
                store.put("user", Bytes::from_static(b"durable"));
                Ok(Value::Null)
            },
        );
    }

    bus.emit("user.saved", json!({})).unwrap();

    assert_eq!(*saw_context.lock(), vec![false]);
    // Nothing was recorded, so a later rollback cannot touch the write.
    let ctx = bus.begin();
    bus.rollback(&ctx).unwrap();
    assert_eq!(store.get("user"), Some(Bytes::from_static(b"durable")));
}

#[test]
fn test_receiver_observes_the_emitters_scope() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    {
        let seen = Arc::clone(&seen);
        bus.subscribe(
            "user.saved",
            move |_: &Event, txn: Option<&TransactionContext>| -> anyhow::Result<Value> {
                seen.lock().push(txn.map(TransactionContext::id));
                Ok(Value::Null)
            },
        );
    }

    bus.run_in_transaction(|ctx| {
        bus.emit("user.saved", json!({}))?;
        assert_eq!(*seen.lock(), vec![Some(ctx.id())]);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_undo_failure_takes_precedence_over_abort() {
    let bus = EventBus::new();
    let transactions = bus.transactions();

    let result: Result<(), Error> = bus.run_in_transaction(|_ctx| {
        transactions.record(|| anyhow::bail!("undo exploded"));
        anyhow::bail!("action failed");
    });

    // The rollback itself failed, which outranks the ordinary abort: the
    // caller must treat this chain as unrecoverable.
    assert_matches!(result, Err(Error::Transaction(TxnError::Undo { .. })));
}

#[test]
fn test_concurrent_transactions_on_distinct_threads_are_independent() {
    init_logging();
    let bus = EventBus::new();
    let store = MemoryStore::new(bus.transactions());

    bus.subscribe(
        "order.placed",
        StoreWriter { store: store.clone(), key: "receipt", value: b"printed" },
    );

    let committer = {
        let bus = bus.clone();
        let store = store.clone();
        thread::spawn(move || {
            bus.run_in_transaction(|_ctx| {
                store.put("order", Bytes::from_static(b"kept"));
                bus.emit("order.placed", json!({}))?;
                Ok(())
            })
            .unwrap();
        })
    };
    let aborter = {
        let bus = bus.clone();
        let store = store.clone();
        thread::spawn(move || {
            let result: Result<(), Error> = bus.run_in_transaction(|_ctx| {
                store.put("draft", Bytes::from_static(b"gone"));
                anyhow::bail!("change of heart");
            });
            assert_matches!(result, Err(Error::Aborted { .. }));
        })
    };

    committer.join().unwrap();
    aborter.join().unwrap();

    assert_eq!(store.get("order"), Some(Bytes::from_static(b"kept")));
    assert_eq!(store.get("receipt"), Some(Bytes::from_static(b"printed")));
    assert_eq!(store.get("draft"), None);
}
