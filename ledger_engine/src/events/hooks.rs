use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    InvoicePaidEvent,
    PaymentRecordedEvent,
    ReferralCreditedEvent,
    SubscriptionActivatedEvent,
};

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cloned into every API that emits events. Each list holds one producer per registered handler.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_recorded_producer: Vec<EventProducer<PaymentRecordedEvent>>,
    pub invoice_paid_producer: Vec<EventProducer<InvoicePaidEvent>>,
    pub subscription_activated_producer: Vec<EventProducer<SubscriptionActivatedEvent>>,
    pub referral_credited_producer: Vec<EventProducer<ReferralCreditedEvent>>,
}

impl EventProducers {
    pub fn publish_payment_recorded(&self, event: PaymentRecordedEvent) {
        self.payment_recorded_producer.iter().for_each(|p| p.publish_event(event.clone()));
    }

    pub fn publish_invoice_paid(&self, event: InvoicePaidEvent) {
        self.invoice_paid_producer.iter().for_each(|p| p.publish_event(event.clone()));
    }

    pub fn publish_subscription_activated(&self, event: SubscriptionActivatedEvent) {
        self.subscription_activated_producer.iter().for_each(|p| p.publish_event(event.clone()));
    }

    pub fn publish_referral_credited(&self, event: ReferralCreditedEvent) {
        self.referral_credited_producer.iter().for_each(|p| p.publish_event(event.clone()));
    }

    /// Combines two sets of producers, so that events reach the handlers of both.
    pub fn merge(mut self, other: EventProducers) -> Self {
        self.payment_recorded_producer.extend(other.payment_recorded_producer);
        self.invoice_paid_producer.extend(other.invoice_paid_producer);
        self.subscription_activated_producer.extend(other.subscription_activated_producer);
        self.referral_credited_producer.extend(other.referral_credited_producer);
        self
    }
}

pub struct EventHandlers {
    pub on_payment_recorded: Option<EventHandler<PaymentRecordedEvent>>,
    pub on_invoice_paid: Option<EventHandler<InvoicePaidEvent>>,
    pub on_subscription_activated: Option<EventHandler<SubscriptionActivatedEvent>>,
    pub on_referral_credited: Option<EventHandler<ReferralCreditedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_payment_recorded: hooks.on_payment_recorded.map(|f| EventHandler::new(buffer_size, f)),
            on_invoice_paid: hooks.on_invoice_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_subscription_activated: hooks.on_subscription_activated.map(|f| EventHandler::new(buffer_size, f)),
            on_referral_credited: hooks.on_referral_credited.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_recorded {
            result.payment_recorded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_invoice_paid {
            result.invoice_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_subscription_activated {
            result.subscription_activated_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_referral_credited {
            result.referral_credited_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for each registered handler. The tasks end once every producer has been dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_recorded {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_invoice_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_subscription_activated {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_referral_credited {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_recorded: Option<Handler<PaymentRecordedEvent>>,
    pub on_invoice_paid: Option<Handler<InvoicePaidEvent>>,
    pub on_subscription_activated: Option<Handler<SubscriptionActivatedEvent>>,
    pub on_referral_credited: Option<Handler<ReferralCreditedEvent>>,
}

impl EventHooks {
    pub fn on_payment_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentRecordedEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_payment_recorded = Some(Arc::new(f));
        self
    }

    pub fn on_invoice_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoicePaidEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_invoice_paid = Some(Arc::new(f));
        self
    }

    pub fn on_subscription_activated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SubscriptionActivatedEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_subscription_activated = Some(Arc::new(f));
        self
    }

    pub fn on_referral_credited<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReferralCreditedEvent) -> BoxedHandlerFuture) + Send + Sync + 'static {
        self.on_referral_credited = Some(Arc::new(f));
        self
    }
}
