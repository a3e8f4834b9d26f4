//! In-memory store implementing all four contracts.
//!
//! Used by tests, demos, and as the default wiring when no `DATABASE_URL` is
//! configured. A single mutex guards the whole state; it is held only for the
//! duration of one conditional mutation and never across an `.await`, which
//! makes every trait method the same kind of atomic step the Postgres
//! implementation gets from single-statement SQL.

use crate::error::RegistrationError;
use crate::stores::{
    CapacityLedger, PaidTransition, PaymentIntentStore, RegistrationStore, WaitlistQueue,
};
use crate::types::{
    EventId, EventSnapshot, OrderId, PaymentIntent, PaymentIntentStatus, Registration, UserId,
    WaitlistEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    events: HashMap<EventId, EventSnapshot>,
    registrations: HashMap<(EventId, UserId), Registration>,
    // seq breaks joined_at ties so FIFO order stays total.
    waitlist: HashMap<(EventId, UserId), (u64, WaitlistEntry)>,
    waitlist_seq: u64,
    intents: HashMap<OrderId, PaymentIntent>,
    provider_index: HashMap<String, OrderId>,
}

/// Shared in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces an event record. Event CRUD is owned externally;
    /// this is the boundary through which tests and dev wiring install the
    /// records the ledger reads.
    pub fn put_event(&self, event: EventSnapshot) {
        self.lock().events.insert(event.id, event);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic elsewhere; the data itself is
        // still consistent because every critical section is a single
        // conditional mutation.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CapacityLedger for InMemoryStore {
    async fn event(&self, event_id: EventId) -> Result<Option<EventSnapshot>, RegistrationError> {
        Ok(self.lock().events.get(&event_id).cloned())
    }

    async fn try_increment(&self, event_id: EventId) -> Result<bool, RegistrationError> {
        let mut inner = self.lock();
        let Some(event) = inner.events.get_mut(&event_id) else {
            return Ok(false);
        };
        if event.registered_count < event.max_capacity.value() {
            event.registered_count += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn decrement(&self, event_id: EventId) -> Result<(), RegistrationError> {
        let mut inner = self.lock();
        if let Some(event) = inner.events.get_mut(&event_id) {
            event.registered_count = event.registered_count.saturating_sub(1);
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    async fn create(
        &self,
        event_id: EventId,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Registration, RegistrationError> {
        let mut inner = self.lock();
        if inner.registrations.contains_key(&(event_id, user_id)) {
            return Err(RegistrationError::DuplicateRegistration);
        }
        let registration = Registration {
            event_id,
            user_id,
            created_at,
        };
        inner
            .registrations
            .insert((event_id, user_id), registration.clone());
        Ok(registration)
    }

    async fn delete(&self, event_id: EventId, user_id: UserId) -> Result<(), RegistrationError> {
        self.lock()
            .registrations
            .remove(&(event_id, user_id))
            .map(|_| ())
            .ok_or(RegistrationError::NotFound("registration"))
    }

    async fn exists(&self, event_id: EventId, user_id: UserId) -> Result<bool, RegistrationError> {
        Ok(self.lock().registrations.contains_key(&(event_id, user_id)))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Registration>, RegistrationError> {
        let inner = self.lock();
        let mut rows: Vec<Registration> = inner
            .registrations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn count_for_event(&self, event_id: EventId) -> Result<u64, RegistrationError> {
        let inner = self.lock();
        Ok(inner
            .registrations
            .keys()
            .filter(|(e, _)| *e == event_id)
            .count() as u64)
    }
}

#[async_trait]
impl WaitlistQueue for InMemoryStore {
    async fn enqueue(
        &self,
        event_id: EventId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<WaitlistEntry, RegistrationError> {
        let mut inner = self.lock();
        if inner.waitlist.contains_key(&(event_id, user_id)) {
            return Err(RegistrationError::DuplicateEntry);
        }
        inner.waitlist_seq += 1;
        let seq = inner.waitlist_seq;
        let entry = WaitlistEntry {
            event_id,
            user_id,
            joined_at,
        };
        inner.waitlist.insert((event_id, user_id), (seq, entry.clone()));
        Ok(entry)
    }

    async fn dequeue_oldest(
        &self,
        event_id: EventId,
    ) -> Result<Option<WaitlistEntry>, RegistrationError> {
        let mut inner = self.lock();
        let oldest = inner
            .waitlist
            .iter()
            .filter(|((e, _), _)| *e == event_id)
            .min_by_key(|(_, (seq, entry))| (entry.joined_at, *seq))
            .map(|(key, _)| *key);
        Ok(oldest.and_then(|key| inner.waitlist.remove(&key).map(|(_, entry)| entry)))
    }

    async fn remove(&self, event_id: EventId, user_id: UserId) -> Result<(), RegistrationError> {
        self.lock()
            .waitlist
            .remove(&(event_id, user_id))
            .map(|_| ())
            .ok_or(RegistrationError::NotFound("waitlist entry"))
    }

    async fn position(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<u32>, RegistrationError> {
        let inner = self.lock();
        let Some((own_seq, own_entry)) = inner.waitlist.get(&(event_id, user_id)) else {
            return Ok(None);
        };
        let own_key = (own_entry.joined_at, *own_seq);
        let ahead = inner
            .waitlist
            .iter()
            .filter(|((e, _), _)| *e == event_id)
            .filter(|(_, (seq, entry))| (entry.joined_at, *seq) <= own_key)
            .count();
        Ok(Some(u32::try_from(ahead).unwrap_or(u32::MAX)))
    }
}

#[async_trait]
impl PaymentIntentStore for InMemoryStore {
    async fn open(&self, intent: PaymentIntent) -> Result<(), RegistrationError> {
        let mut inner = self.lock();
        inner
            .provider_index
            .insert(intent.provider_order_id.clone(), intent.internal_order_id);
        inner.intents.insert(intent.internal_order_id, intent);
        Ok(())
    }

    async fn mark_paid(
        &self,
        provider_order_id: &str,
        internal_order_id: Option<OrderId>,
        provider_payment_id: &str,
        signature: &str,
        mode: PaidTransition,
    ) -> Result<Option<PaymentIntent>, RegistrationError> {
        let mut inner = self.lock();
        let Some(order_id) = inner.provider_index.get(provider_order_id).copied() else {
            return Ok(None);
        };
        if let Some(expected) = internal_order_id {
            if expected != order_id {
                return Ok(None);
            }
        }
        let Some(intent) = inner.intents.get_mut(&order_id) else {
            return Ok(None);
        };
        match (intent.status, mode) {
            (PaymentIntentStatus::Created, _) => {
                intent.status = PaymentIntentStatus::Paid;
                intent.provider_payment_id = Some(provider_payment_id.to_string());
                intent.signature = Some(signature.to_string());
                Ok(Some(intent.clone()))
            }
            (PaymentIntentStatus::Paid, PaidTransition::AllowAlreadyPaid) => {
                // Idempotent re-application: first writer's fields stand.
                Ok(Some(intent.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_refund_required(
        &self,
        internal_order_id: OrderId,
    ) -> Result<(), RegistrationError> {
        let mut inner = self.lock();
        match inner.intents.get_mut(&internal_order_id) {
            Some(intent) if intent.status == PaymentIntentStatus::Paid => {
                intent.status = PaymentIntentStatus::RefundRequired;
                Ok(())
            }
            _ => Err(RegistrationError::NotFound("paid payment intent")),
        }
    }

    async fn mark_cancelled(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), RegistrationError> {
        let mut inner = self.lock();
        for intent in inner.intents.values_mut() {
            if intent.event_id == event_id
                && intent.user_id == user_id
                && matches!(
                    intent.status,
                    PaymentIntentStatus::Created | PaymentIntentStatus::Paid
                )
            {
                intent.status = PaymentIntentStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn find_by_internal_order(
        &self,
        internal_order_id: OrderId,
    ) -> Result<Option<PaymentIntent>, RegistrationError> {
        Ok(self.lock().intents.get(&internal_order_id).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Capacity, Money};
    use chrono::Duration;
    use proptest::prelude::*;

    fn event(capacity: u32) -> EventSnapshot {
        EventSnapshot {
            id: EventId::new(),
            max_capacity: Capacity::new(capacity),
            registered_count: 0,
            is_closed: false,
            price: Money::from_minor(0),
            currency: "INR".to_string(),
        }
    }

    #[tokio::test]
    async fn increment_stops_at_capacity() {
        let store = InMemoryStore::new();
        let e = event(2);
        let event_id = e.id;
        store.put_event(e);

        assert!(store.try_increment(event_id).await.unwrap());
        assert!(store.try_increment(event_id).await.unwrap());
        assert!(!store.try_increment(event_id).await.unwrap());

        let snapshot = store.event(event_id).await.unwrap().unwrap();
        assert_eq!(snapshot.registered_count, 2);
    }

    #[tokio::test]
    async fn decrement_never_goes_below_zero() {
        let store = InMemoryStore::new();
        let e = event(1);
        let event_id = e.id;
        store.put_event(e);

        store.decrement(event_id).await.unwrap();
        let snapshot = store.event(event_id).await.unwrap().unwrap();
        assert_eq!(snapshot.registered_count, 0);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_by_the_store() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let user_id = UserId::new();

        store.create(event_id, user_id, Utc::now()).await.unwrap();
        let err = store.create(event_id, user_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateRegistration));
    }

    #[tokio::test]
    async fn dequeue_follows_joined_at_order() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let first = UserId::new();
        let second = UserId::new();
        let t0 = Utc::now();

        store.enqueue(event_id, second, t0 + Duration::seconds(10)).await.unwrap();
        store.enqueue(event_id, first, t0).await.unwrap();

        let entry = store.dequeue_oldest(event_id).await.unwrap().unwrap();
        assert_eq!(entry.user_id, first);
        let entry = store.dequeue_oldest(event_id).await.unwrap().unwrap();
        assert_eq!(entry.user_id, second);
        assert!(store.dequeue_oldest(event_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn equal_join_times_dequeue_in_arrival_order() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let first = UserId::new();
        let second = UserId::new();
        let t0 = Utc::now();

        store.enqueue(event_id, first, t0).await.unwrap();
        store.enqueue(event_id, second, t0).await.unwrap();

        let entry = store.dequeue_oldest(event_id).await.unwrap().unwrap();
        assert_eq!(entry.user_id, first);
    }

    #[tokio::test]
    async fn position_is_one_based_fifo_rank() {
        let store = InMemoryStore::new();
        let event_id = EventId::new();
        let first = UserId::new();
        let second = UserId::new();
        let t0 = Utc::now();

        store.enqueue(event_id, first, t0).await.unwrap();
        store.enqueue(event_id, second, t0 + Duration::seconds(1)).await.unwrap();

        assert_eq!(store.position(event_id, first).await.unwrap(), Some(1));
        assert_eq!(store.position(event_id, second).await.unwrap(), Some(2));
        assert_eq!(store.position(event_id, UserId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn strict_mark_paid_rejects_replay() {
        let store = InMemoryStore::new();
        let intent = PaymentIntent::open(
            OrderId::new(),
            "order_1".to_string(),
            EventId::new(),
            UserId::new(),
            Money::from_minor(500),
            "INR".to_string(),
            Utc::now(),
        );
        let order_id = intent.internal_order_id;
        store.open(intent).await.unwrap();

        let first = store
            .mark_paid("order_1", Some(order_id), "pay_1", "sig", PaidTransition::RequireCreated)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, PaymentIntentStatus::Paid);

        let replay = store
            .mark_paid("order_1", Some(order_id), "pay_1", "sig", PaidTransition::RequireCreated)
            .await
            .unwrap();
        assert!(replay.is_none());
    }

    #[tokio::test]
    async fn idempotent_mark_paid_keeps_first_writer_fields() {
        let store = InMemoryStore::new();
        let intent = PaymentIntent::open(
            OrderId::new(),
            "order_2".to_string(),
            EventId::new(),
            UserId::new(),
            Money::from_minor(500),
            "INR".to_string(),
            Utc::now(),
        );
        store.open(intent).await.unwrap();

        store
            .mark_paid("order_2", None, "pay_a", "sig_a", PaidTransition::AllowAlreadyPaid)
            .await
            .unwrap();
        let second = store
            .mark_paid("order_2", None, "pay_b", "sig_b", PaidTransition::AllowAlreadyPaid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.provider_payment_id.as_deref(), Some("pay_a"));
        assert_eq!(second.signature.as_deref(), Some("sig_a"));
    }

    #[tokio::test]
    async fn mismatched_internal_order_does_not_transition() {
        let store = InMemoryStore::new();
        let intent = PaymentIntent::open(
            OrderId::new(),
            "order_3".to_string(),
            EventId::new(),
            UserId::new(),
            Money::from_minor(500),
            "INR".to_string(),
            Utc::now(),
        );
        let order_id = intent.internal_order_id;
        store.open(intent).await.unwrap();

        let result = store
            .mark_paid(
                "order_3",
                Some(OrderId::new()),
                "pay_1",
                "sig",
                PaidTransition::RequireCreated,
            )
            .await
            .unwrap();
        assert!(result.is_none());

        let untouched = store.find_by_internal_order(order_id).await.unwrap().unwrap();
        assert_eq!(untouched.status, PaymentIntentStatus::Created);
    }

    proptest! {
        // Any interleaving of conditional increments and releases keeps the
        // counter inside [0, max].
        #[test]
        fn counter_stays_within_bounds(capacity in 1u32..16, ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async move {
                let store = InMemoryStore::new();
                let e = event(capacity);
                let event_id = e.id;
                store.put_event(e);
                let mut granted: u32 = 0;

                for increment in ops {
                    if increment {
                        if store.try_increment(event_id).await.unwrap() {
                            granted += 1;
                        }
                    } else if granted > 0 {
                        store.decrement(event_id).await.unwrap();
                        granted -= 1;
                    }
                    let snapshot = store.event(event_id).await.unwrap().unwrap();
                    prop_assert!(snapshot.registered_count <= capacity);
                    prop_assert_eq!(snapshot.registered_count, granted);
                }
                Ok(())
            })?;
        }
    }
}
