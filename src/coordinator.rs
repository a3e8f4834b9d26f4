//! Reconciliation coordinator.
//!
//! Drives the capacity ledger, registration store, waitlist queue, and
//! payment intent tracker through consistent transitions for every client
//! action and gateway signal. This is the only code that writes
//! `registered_count`, and it only ever does so through the ledger's
//! conditional primitive.
//!
//! State machine per (event, user) attempt:
//!
//! ```text
//! NONE ──register(free, seat)───────────► REGISTERED
//! NONE ──register(free, full)───────────► WAITING
//! NONE ──register(paid)──► PAYMENT_PENDING ──verify(seat)──► REGISTERED
//!                          PAYMENT_PENDING ──verify(full)──► REFUND_REQUIRED
//! REGISTERED ──cancel──► NONE (seat freed, promotion attempted)
//! WAITING ────promote──► REGISTERED
//! WAITING ────cancel───► NONE
//! ```

use crate::clock::Clock;
use crate::error::RegistrationError;
use crate::notify::Notifier;
use crate::payments::webhook::WebhookEnvelope;
use crate::payments::{PaymentGateway, SignatureVerifier};
use crate::stores::{
    CapacityLedger, PaidTransition, PaymentIntentStore, RegistrationStore, WaitlistQueue,
};
use crate::types::{
    CancelOutcome, EventId, OrderId, PaymentIntent, Registration, RegistrationOutcome, UserId,
};
use std::sync::Arc;

/// A client-driven payment confirmation, as received from the checkout page.
#[derive(Clone, Debug)]
pub struct PaymentConfirmation {
    /// Correlation id handed out by the register call.
    pub internal_order_id: OrderId,
    /// Gateway order id.
    pub provider_order_id: String,
    /// Gateway payment id.
    pub provider_payment_id: String,
    /// Hex HMAC over `provider_order_id|provider_payment_id`.
    pub signature: String,
}

/// What a webhook delivery resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A payment capture was recorded (or re-recorded idempotently).
    Recorded,
    /// The delivery was authentic but not a payment capture; acknowledged and
    /// ignored.
    Ignored,
}

/// Orchestrates seat allocation and payment reconciliation.
pub struct RegistrationCoordinator {
    ledger: Arc<dyn CapacityLedger>,
    registrations: Arc<dyn RegistrationStore>,
    waitlist: Arc<dyn WaitlistQueue>,
    intents: Arc<dyn PaymentIntentStore>,
    gateway: Arc<dyn PaymentGateway>,
    checkout_verifier: SignatureVerifier,
    webhook_verifier: SignatureVerifier,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl RegistrationCoordinator {
    /// Wires the coordinator to its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn CapacityLedger>,
        registrations: Arc<dyn RegistrationStore>,
        waitlist: Arc<dyn WaitlistQueue>,
        intents: Arc<dyn PaymentIntentStore>,
        gateway: Arc<dyn PaymentGateway>,
        checkout_verifier: SignatureVerifier,
        webhook_verifier: SignatureVerifier,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            registrations,
            waitlist,
            intents,
            gateway,
            checkout_verifier,
            webhook_verifier,
            notifier,
            clock,
        }
    }

    /// Registers a user for an event.
    ///
    /// Free events seat immediately or overflow onto the waitlist. Paid
    /// events open a payment intent and reserve nothing: an abandoned
    /// checkout must never lock a seat.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::EventMissing`], [`RegistrationError::EventClosed`],
    /// [`RegistrationError::AlreadyRegistered`],
    /// [`RegistrationError::Gateway`], or a storage error.
    pub async fn register(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let event = self
            .ledger
            .event(event_id)
            .await?
            .ok_or(RegistrationError::EventMissing(event_id))?;

        if event.is_closed {
            return Err(RegistrationError::EventClosed);
        }
        if self.registrations.exists(event_id, user_id).await? {
            return Err(RegistrationError::AlreadyRegistered);
        }

        if event.is_free() {
            return self.register_free(event_id, user_id).await;
        }

        // Paid path: the gateway order must exist before the intent is
        // persisted, so a timeout here leaves no ambiguous state behind.
        let internal_order_id = OrderId::new();
        let order = self
            .gateway
            .create_order(event.price, &event.currency, &internal_order_id.to_string())
            .await
            .map_err(|e| RegistrationError::Gateway(e.to_string()))?;

        let intent = PaymentIntent::open(
            internal_order_id,
            order.provider_order_id.clone(),
            event_id,
            user_id,
            event.price,
            event.currency.clone(),
            self.clock.now(),
        );
        self.intents.open(intent).await?;

        tracing::info!(
            %event_id,
            %user_id,
            %internal_order_id,
            provider_order_id = %order.provider_order_id,
            "payment intent opened; awaiting checkout"
        );

        Ok(RegistrationOutcome::PaymentPending {
            internal_order_id,
            provider_order_id: order.provider_order_id,
            amount: order.amount,
        })
    }

    async fn register_free(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        if self.ledger.try_increment(event_id).await? {
            match self
                .registrations
                .create(event_id, user_id, self.clock.now())
                .await
            {
                Ok(_) => {
                    tracing::info!(%event_id, %user_id, "seat granted");
                    self.notify_registered(event_id, user_id);
                    Ok(RegistrationOutcome::Registered)
                }
                Err(RegistrationError::DuplicateRegistration) => {
                    // A concurrent attempt for the same pair won; give the
                    // seat back and report the state the user is in.
                    self.ledger.decrement(event_id).await?;
                    Err(RegistrationError::AlreadyRegistered)
                }
                Err(e) => {
                    self.ledger.decrement(event_id).await?;
                    Err(e)
                }
            }
        } else {
            match self.waitlist.enqueue(event_id, user_id, self.clock.now()).await {
                Ok(_) => {
                    tracing::info!(%event_id, %user_id, "event full; user waitlisted");
                    self.notify_waiting(event_id, user_id);
                    Ok(RegistrationOutcome::Waiting)
                }
                // Registering again while waiting is an idempotent
                // observation of the same state.
                Err(RegistrationError::DuplicateEntry) => Ok(RegistrationOutcome::Waiting),
                Err(e) => Err(e),
            }
        }
    }

    /// Reconciles a client-driven payment confirmation.
    ///
    /// The signature is checked before anything is touched; only after the
    /// intent transitions to paid does the seat grant happen, against
    /// capacity as it stands now.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::TamperedPayment`],
    /// [`RegistrationError::NoMatchingIntent`],
    /// [`RegistrationError::SeatUnavailableRefundRequired`], or a storage
    /// error.
    pub async fn verify_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        self.checkout_verifier.verify_checkout(
            &confirmation.provider_order_id,
            &confirmation.provider_payment_id,
            &confirmation.signature,
        )?;

        let intent = self
            .intents
            .mark_paid(
                &confirmation.provider_order_id,
                Some(confirmation.internal_order_id),
                &confirmation.provider_payment_id,
                &confirmation.signature,
                PaidTransition::RequireCreated,
            )
            .await?
            .ok_or(RegistrationError::NoMatchingIntent)?;

        self.grant_paid_seat(&intent).await
    }

    async fn grant_paid_seat(
        &self,
        intent: &PaymentIntent,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        if self.ledger.try_increment(intent.event_id).await? {
            match self
                .registrations
                .create(intent.event_id, intent.user_id, self.clock.now())
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        event_id = %intent.event_id,
                        user_id = %intent.user_id,
                        internal_order_id = %intent.internal_order_id,
                        "payment reconciled; seat granted"
                    );
                    self.notify_registered(intent.event_id, intent.user_id);
                    Ok(RegistrationOutcome::Registered)
                }
                Err(_) => {
                    // The pair got seated through another path after paying
                    // here: release the seat and surface the refund.
                    self.ledger.decrement(intent.event_id).await?;
                    self.refund_required(intent).await
                }
            }
        } else {
            self.refund_required(intent).await
        }
    }

    async fn refund_required(
        &self,
        intent: &PaymentIntent,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        self.intents
            .mark_refund_required(intent.internal_order_id)
            .await?;
        tracing::error!(
            event_id = %intent.event_id,
            user_id = %intent.user_id,
            internal_order_id = %intent.internal_order_id,
            "payment captured but no seat available; refund required"
        );
        Err(RegistrationError::SeatUnavailableRefundRequired)
    }

    /// Applies an asynchronous gateway webhook.
    ///
    /// Updates payment status only, idempotently. Seats are granted solely by
    /// the verify path, so a webhook arriving alongside it can never seat the
    /// same payment twice.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::TamperedPayment`],
    /// [`RegistrationError::MalformedWebhook`],
    /// [`RegistrationError::NoMatchingIntent`], or a storage error.
    pub async fn webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, RegistrationError> {
        self.webhook_verifier.verify_body(body, signature)?;
        let envelope = WebhookEnvelope::decode(body)?;

        if !envelope.is_payment_captured() {
            tracing::debug!(event = %envelope.event, "ignoring non-capture webhook");
            return Ok(WebhookOutcome::Ignored);
        }

        let entity = &envelope.payload.payment.entity;
        self.intents
            .mark_paid(
                &entity.order_id,
                None,
                &entity.id,
                signature,
                PaidTransition::AllowAlreadyPaid,
            )
            .await?
            .ok_or(RegistrationError::NoMatchingIntent)?;

        tracing::info!(
            provider_order_id = %entity.order_id,
            provider_payment_id = %entity.id,
            "webhook capture recorded"
        );
        Ok(WebhookOutcome::Recorded)
    }

    /// Cancels whatever the user holds for the event: a registration (seat
    /// released, promotion attempted) or a waitlist entry.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotRegistered`] when the user holds neither, or a
    /// storage error.
    pub async fn cancel(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<CancelOutcome, RegistrationError> {
        match self.registrations.delete(event_id, user_id).await {
            Ok(()) => {
                self.ledger.decrement(event_id).await?;
                self.intents.mark_cancelled(event_id, user_id).await?;
                tracing::info!(%event_id, %user_id, "registration cancelled; seat released");
                self.promote(event_id).await?;
                Ok(CancelOutcome::SeatReleased)
            }
            Err(RegistrationError::NotFound(_)) => {
                match self.waitlist.remove(event_id, user_id).await {
                    Ok(()) => {
                        tracing::info!(%event_id, %user_id, "waitlist entry removed");
                        Ok(CancelOutcome::LeftWaitlist)
                    }
                    Err(RegistrationError::NotFound(_)) => Err(RegistrationError::NotRegistered),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Promotes the oldest waiting user into a freed seat, if both exist.
    ///
    /// Returns the promoted user, or `None` when the waitlist is empty or the
    /// seat was taken first. A dequeued entry that loses the seat race is
    /// dropped, not re-enqueued; the `warn` log is the operator's window into
    /// that happening.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a store call fails.
    pub async fn promote(&self, event_id: EventId) -> Result<Option<UserId>, RegistrationError> {
        let Some(entry) = self.waitlist.dequeue_oldest(event_id).await? else {
            return Ok(None);
        };

        if self.ledger.try_increment(event_id).await? {
            match self
                .registrations
                .create(event_id, entry.user_id, self.clock.now())
                .await
            {
                Ok(_) => {
                    tracing::info!(%event_id, user_id = %entry.user_id, "waitlisted user promoted");
                    self.notify_promoted(event_id, entry.user_id);
                    Ok(Some(entry.user_id))
                }
                Err(e) => {
                    // An entry and a registration for the same pair are
                    // mutually exclusive, so this needs an operator's eyes.
                    self.ledger.decrement(event_id).await?;
                    tracing::error!(
                        %event_id,
                        user_id = %entry.user_id,
                        error = %e,
                        "promotion found an existing registration; entry dropped"
                    );
                    Ok(None)
                }
            }
        } else {
            tracing::warn!(
                %event_id,
                user_id = %entry.user_id,
                "seat taken before promotion completed; waitlist entry dropped"
            );
            Ok(None)
        }
    }

    /// All registrations held by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub async fn registrations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Registration>, RegistrationError> {
        self.registrations.list_for_user(user_id).await
    }

    /// Current lifecycle state of a payment attempt.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotFound`] for an unknown order, or a storage
    /// error.
    pub async fn order_status(
        &self,
        internal_order_id: OrderId,
    ) -> Result<PaymentIntent, RegistrationError> {
        self.intents
            .find_by_internal_order(internal_order_id)
            .await?
            .ok_or(RegistrationError::NotFound("payment intent"))
    }

    /// 1-based waitlist position, or `None` if the user is not waiting.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub async fn waitlist_position(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<u32>, RegistrationError> {
        self.waitlist.position(event_id, user_id).await
    }

    /// Current snapshot of the event's capacity, for availability queries.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::EventMissing`] for an unknown event, or a storage
    /// error.
    pub async fn availability(
        &self,
        event_id: EventId,
    ) -> Result<crate::types::EventSnapshot, RegistrationError> {
        self.ledger
            .event(event_id)
            .await?
            .ok_or(RegistrationError::EventMissing(event_id))
    }

    fn notify_registered(&self, event_id: EventId, user_id: UserId) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify_registered(user_id, event_id).await;
        });
    }

    fn notify_waiting(&self, event_id: EventId, user_id: UserId) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify_waiting(user_id, event_id).await;
        });
    }

    fn notify_promoted(&self, event_id: EventId, user_id: UserId) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify_promoted(user_id, event_id).await;
        });
    }
}
