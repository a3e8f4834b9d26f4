//! Concurrency tests.
//!
//! Races many registrations, cancellations, and webhook deliveries against
//! the same event and checks that the capacity invariant and FIFO promotion
//! guarantees hold in every interleaving the scheduler produces.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use turnout::clock::ManualClock;
use turnout::coordinator::{PaymentConfirmation, RegistrationCoordinator};
use turnout::error::RegistrationError;
use turnout::notify::TracingNotifier;
use turnout::payments::gateway::MockPaymentGateway;
use turnout::payments::signature::{sign, SignatureVerifier};
use turnout::stores::{CapacityLedger, InMemoryStore, PaymentIntentStore, RegistrationStore};
use turnout::types::{
    Capacity, EventId, EventSnapshot, Money, PaymentIntentStatus, RegistrationOutcome, UserId,
};

const CHECKOUT_SECRET: &str = "checkout-secret";
const WEBHOOK_SECRET: &str = "webhook-secret";

fn build_coordinator(store: &Arc<InMemoryStore>) -> Arc<RegistrationCoordinator> {
    Arc::new(RegistrationCoordinator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(MockPaymentGateway::new()),
        SignatureVerifier::new(SecretString::from(CHECKOUT_SECRET)),
        SignatureVerifier::new(SecretString::from(WEBHOOK_SECRET)),
        Arc::new(TracingNotifier),
        Arc::new(ManualClock::new(Utc::now())),
    ))
}

fn free_event(capacity: u32) -> EventSnapshot {
    EventSnapshot {
        id: EventId::new(),
        max_capacity: Capacity::new(capacity),
        registered_count: 0,
        is_closed: false,
        price: Money::from_minor(0),
        currency: "INR".to_string(),
    }
}

/// With capacity N and N+K concurrent registrations, exactly N seat and K
/// wait, in any interleaving.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_registrations_split_exactly_into_seats_and_waits() {
    const CAPACITY: u32 = 5;
    const ATTEMPTS: usize = 12;

    let store = Arc::new(InMemoryStore::new());
    let coordinator = build_coordinator(&store);
    let event = free_event(CAPACITY);
    let event_id = event.id;
    store.put_event(event);

    let mut handles = Vec::new();
    for _ in 0..ATTEMPTS {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.register(event_id, UserId::new()).await
        }));
    }

    let mut registered = 0u32;
    let mut waiting = 0u32;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RegistrationOutcome::Registered => registered += 1,
            RegistrationOutcome::Waiting => waiting += 1,
            RegistrationOutcome::PaymentPending { .. } => panic!("free event"),
        }
    }

    assert_eq!(registered, CAPACITY);
    assert_eq!(waiting, ATTEMPTS as u32 - CAPACITY);

    let snapshot = store.event(event_id).await.unwrap().unwrap();
    assert_eq!(snapshot.registered_count, CAPACITY);
    assert_eq!(
        store.count_for_event(event_id).await.unwrap(),
        u64::from(CAPACITY)
    );
}

/// Concurrent duplicate attempts for the same user never hold two seats.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn one_user_racing_against_itself_holds_one_seat() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = build_coordinator(&store);
    let event = free_event(10);
    let event_id = event.id;
    store.put_event(event);

    let user = UserId::new();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.register(event_id, user).await
        }));
    }

    let mut successes = 0u32;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(RegistrationOutcome::Registered) => successes += 1,
            Ok(other) => panic!("unexpected outcome {other:?}"),
            Err(RegistrationError::AlreadyRegistered) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    assert_eq!(successes, 1);
    let snapshot = store.event(event_id).await.unwrap().unwrap();
    assert_eq!(snapshot.registered_count, 1);
    assert_eq!(store.count_for_event(event_id).await.unwrap(), 1);
}

/// Two concurrent cancellations promote two distinct waiters; no entry is
/// promoted twice.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_promotions_never_share_an_entry() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = build_coordinator(&store);
    let event = free_event(2);
    let event_id = event.id;
    store.put_event(event);

    let seated_a = UserId::new();
    let seated_b = UserId::new();
    let waiters: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();

    coordinator.register(event_id, seated_a).await.unwrap();
    coordinator.register(event_id, seated_b).await.unwrap();
    for waiter in &waiters {
        coordinator.register(event_id, *waiter).await.unwrap();
    }

    let cancel_a = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.cancel(event_id, seated_a).await })
    };
    let cancel_b = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.cancel(event_id, seated_b).await })
    };
    cancel_a.await.unwrap().unwrap();
    cancel_b.await.unwrap().unwrap();

    let snapshot = store.event(event_id).await.unwrap().unwrap();
    assert_eq!(snapshot.registered_count, 2);
    assert_eq!(store.count_for_event(event_id).await.unwrap(), 2);

    let promoted: Vec<&UserId> = {
        let mut seated = Vec::new();
        for waiter in &waiters {
            if store.exists(event_id, *waiter).await.unwrap() {
                seated.push(waiter);
            }
        }
        seated
    };
    assert_eq!(promoted.len(), 2);
}

/// The verify call and a doubled webhook racing for the same payment leave
/// one paid intent and at most one registration.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn verify_and_webhooks_racing_grant_at_most_one_seat() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = build_coordinator(&store);
    let mut event = free_event(5);
    event.price = Money::from_minor(500);
    let event_id = event.id;
    store.put_event(event);

    let user = UserId::new();
    let RegistrationOutcome::PaymentPending {
        internal_order_id,
        provider_order_id,
        ..
    } = coordinator.register(event_id, user).await.unwrap()
    else {
        panic!("expected payment_pending");
    };

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {"id": "pay_1", "order_id": provider_order_id}}}
    })
    .to_string()
    .into_bytes();
    let webhook_signature = sign(WEBHOOK_SECRET, &body);
    let confirmation = PaymentConfirmation {
        internal_order_id,
        provider_order_id: provider_order_id.clone(),
        provider_payment_id: "pay_1".to_string(),
        signature: sign(
            CHECKOUT_SECRET,
            format!("{provider_order_id}|pay_1").as_bytes(),
        ),
    };

    let verify = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.verify_payment(confirmation).await })
    };
    let hooks: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = coordinator.clone();
            let body = body.clone();
            let signature = webhook_signature.clone();
            tokio::spawn(async move { coordinator.webhook(&body, &signature).await })
        })
        .collect();

    // The verify call loses cleanly when a webhook got there first; any
    // other error would be a real failure.
    match verify.await.unwrap() {
        Ok(RegistrationOutcome::Registered) | Err(RegistrationError::NoMatchingIntent) => {}
        other => panic!("unexpected verify result {other:?}"),
    }
    for hook in hooks {
        match hook.await.unwrap() {
            Ok(_) | Err(RegistrationError::NoMatchingIntent) => {}
            Err(e) => panic!("unexpected webhook error {e}"),
        }
    }

    let intent = store
        .find_by_internal_order(internal_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Paid);

    let snapshot = store.event(event_id).await.unwrap().unwrap();
    let seats = u64::from(snapshot.registered_count);
    assert!(seats <= 1);
    assert_eq!(store.count_for_event(event_id).await.unwrap(), seats);
}
