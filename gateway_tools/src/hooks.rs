use std::{future::Future, pin::Pin};

use ledger_engine::events::{
    EventHandlers,
    EventHooks,
    InvoicePaidEvent,
    PaymentRecordedEvent,
    ReferralCreditedEvent,
    SubscriptionActivatedEvent,
};
use log::*;

use crate::{RetryPolicy, WorkflowClient, WorkflowConfig, WorkflowError, WorkflowEvent};

/// Forwards ledger events to the workflow service. Each event type gets a queue of `buffer_size` events, normally
/// the engine's `event_buffer_size`.
///
/// Delivery never affects the ledger: by the time a handler runs the financial write has committed, and failures are
/// only logged.
///
/// 1. SubscriptionActivatedEvent - kicks off onboarding for the new subscriber. This is the one event the workflow
///    service cannot recover on its own, so it is retried with exponential backoff, up to `max_attempts` times.
/// 2. InvoicePaidEvent, PaymentRecordedEvent and ReferralCreditedEvent - informational, and sent once.
pub fn create_workflow_event_handlers(
    config: WorkflowConfig,
    buffer_size: usize,
) -> Result<EventHandlers, WorkflowError> {
    let mut hooks = EventHooks::default();
    let client = WorkflowClient::new(config)?;
    let activation_policy = RetryPolicy::new(client.config().max_attempts);

    let api = client.clone();
    hooks.on_subscription_activated(move |ev| {
        let event = activation_event(&api, &ev);
        dispatch(api.clone(), event, activation_policy)
    });
    let api = client.clone();
    hooks.on_invoice_paid(move |ev| {
        let event = invoice_paid_event(&api, &ev);
        dispatch(api.clone(), event, RetryPolicy::single_attempt())
    });
    let api = client.clone();
    hooks.on_payment_recorded(move |ev| {
        let event = payment_recorded_event(&api, &ev);
        dispatch(api.clone(), event, RetryPolicy::single_attempt())
    });
    let api = client;
    hooks.on_referral_credited(move |ev| {
        let event = referral_credited_event(&api, &ev);
        dispatch(api.clone(), event, RetryPolicy::single_attempt())
    });
    Ok(EventHandlers::new(buffer_size, hooks))
}

fn dispatch(
    api: WorkflowClient,
    event: WorkflowEvent,
    policy: RetryPolicy,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        match api.send_with_retry(&event, policy).await {
            Ok(()) => info!("🌐 Workflow {} for {} delivered", event.workflow_type, event.id),
            Err(e) => error!("🌐 Giving up on workflow {} for {}. {e}", event.workflow_type, event.id),
        }
    })
}

fn activation_event(api: &WorkflowClient, ev: &SubscriptionActivatedEvent) -> WorkflowEvent {
    api.event("subscription_activated", ev.subscription_code.as_str())
        .with("subscriberId", ev.subscriber_id)
        .with("orderNumber", ev.order_number.as_str())
        .with("transactionId", ev.transaction_id.as_str())
        .with("expiryDate", ev.expiry_date.to_rfc3339())
}

fn invoice_paid_event(api: &WorkflowClient, ev: &InvoicePaidEvent) -> WorkflowEvent {
    let invoice = &ev.invoice;
    api.event("invoice_paid", invoice.invoice_number.as_str())
        .with("customerId", invoice.customer_id.as_str())
        .with("total", invoice.total.to_string())
        .with("amountPaid", invoice.amount_paid.to_string())
        .with("currency", invoice.currency.as_str())
}

fn payment_recorded_event(api: &WorkflowClient, ev: &PaymentRecordedEvent) -> WorkflowEvent {
    api.event("payment_recorded", ev.invoice.invoice_number.as_str())
        .with("reference", ev.payment.reference.as_str())
        .with("amount", ev.payment.amount.to_string())
        .with("mode", ev.payment.mode.to_string())
        .with("reversal", ev.payment.is_reversal())
        .with("previousStatus", ev.previous_status.to_string())
        .with("status", ev.invoice.status.to_string())
}

fn referral_credited_event(api: &WorkflowClient, ev: &ReferralCreditedEvent) -> WorkflowEvent {
    let credit = &ev.credit;
    api.event("referral_credited", credit.referrer_id.to_string())
        .with("referredId", credit.referred_id)
        .with("code", credit.code.as_str())
        .with("amount", credit.amount.to_string())
}
