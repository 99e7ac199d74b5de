use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::dispatch::DispatchHandle;
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::event::{Event, EventType};
use crate::observability::metrics::Metrics;
use crate::store::{DeliveryStore, update_with_retry};

/// The allowed status pairs. `Delivered` and `Cancelled` are terminal;
/// `Pending -> Assigned` only happens through the assignment manager.
pub fn transition_allowed(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, InTransit)
            | (Assigned, Cancelled)
            | (InTransit, Delivered)
            | (InTransit, Cancelled)
            | (InTransit, Problem)
            | (Problem, InTransit)
            | (Problem, Cancelled)
    )
}

/// Pure transition step. Works on an owned copy, so a validation failure
/// leaves the caller's entity untouched.
pub fn apply_transition(
    mut delivery: Delivery,
    target: DeliveryStatus,
    now: DateTime<Utc>,
) -> Result<Delivery, AppError> {
    if !transition_allowed(delivery.status, target) {
        return Err(AppError::InvalidTransition {
            from: delivery.status,
            to: target,
        });
    }

    if target == DeliveryStatus::Delivered
        && delivery.requires_signature()
        && delivery.signature.is_none()
    {
        return Err(AppError::MissingEvidence(format!(
            "delivery {} has a payment and needs a signature before completion",
            delivery.id
        )));
    }

    delivery.status = target;
    match target {
        DeliveryStatus::Delivered => {
            delivery.delivered_at = Some(now);
            delivery.clear_courier();
        }
        DeliveryStatus::Cancelled => delivery.clear_courier(),
        // a problem stop leaves the route but stays with its courier so it
        // can resume; it rejoins positionless (the selector orders those
        // behind positioned stops, InTransit first)
        DeliveryStatus::Problem => delivery.route_position = None,
        _ => {}
    }

    Ok(delivery)
}

#[derive(Clone)]
pub struct DeliveryLifecycle {
    deliveries: Arc<dyn DeliveryStore>,
    dispatcher: DispatchHandle,
    metrics: Metrics,
}

impl DeliveryLifecycle {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        dispatcher: DispatchHandle,
        metrics: Metrics,
    ) -> Self {
        Self {
            deliveries,
            dispatcher,
            metrics,
        }
    }

    /// Validate and commit a status change, then notify subscribers
    /// out-of-band. Dispatch happens strictly after the commit and can
    /// never fail the transition.
    pub async fn transition(
        &self,
        delivery_id: Uuid,
        target: DeliveryStatus,
    ) -> Result<Delivery, AppError> {
        let result = update_with_retry(self.deliveries.as_ref(), delivery_id, |current| {
            apply_transition(current.clone(), target, Utc::now())
        })
        .await;

        let target_label = format!("{target:?}");
        let (previous, committed) = match result {
            Ok(pair) => pair,
            Err(err) => {
                self.metrics
                    .transitions_total
                    .with_label_values(&[&target_label, "error"])
                    .inc();
                return Err(err);
            }
        };

        self.metrics
            .transitions_total
            .with_label_values(&[&target_label, "success"])
            .inc();

        info!(
            delivery_id = %committed.id,
            from = ?previous.status,
            to = ?committed.status,
            "delivery transitioned"
        );

        match (previous.status, committed.status) {
            (DeliveryStatus::Assigned, DeliveryStatus::InTransit) => {
                self.dispatcher
                    .enqueue(Event::for_delivery(EventType::EntregaEmRota, &committed))
                    .await;
            }
            (_, DeliveryStatus::Delivered) => {
                self.dispatcher
                    .enqueue(Event::for_delivery(EventType::EntregaEntregue, &committed))
                    .await;
            }
            _ => {}
        }

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{apply_transition, transition_allowed};
    use crate::error::AppError;
    use crate::models::delivery::{
        Address, Delivery, DeliveryStatus, Payment, PaymentMethod,
    };

    fn delivery(status: DeliveryStatus) -> Delivery {
        Delivery {
            id: Uuid::from_u128(1),
            order_number: "PED-0001".to_string(),
            status,
            customer_name: "João".to_string(),
            customer_phone: "11 98888-0000".to_string(),
            address: Address {
                street: "Av. Paulista 1000".to_string(),
                city: "São Paulo".to_string(),
                zip: "01310-100".to_string(),
                complement: None,
                location: None,
            },
            courier_id: Some(Uuid::from_u128(9)),
            courier_name: Some("Carlos".to_string()),
            route_position: Some(2),
            payment: None,
            items: vec![],
            signature: None,
            photos: vec![],
            notes: None,
            created_at: Utc::now(),
            delivered_at: None,
            deadline: None,
            version: 0,
        }
    }

    fn paid(mut d: Delivery, method: PaymentMethod) -> Delivery {
        d.payment = Some(Payment {
            method,
            amount: 120.0,
            received: false,
            change_for: None,
            installments: None,
        });
        d
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for from in [DeliveryStatus::Delivered, DeliveryStatus::Cancelled] {
            for to in [
                DeliveryStatus::Pending,
                DeliveryStatus::Assigned,
                DeliveryStatus::InTransit,
                DeliveryStatus::Delivered,
                DeliveryStatus::Cancelled,
                DeliveryStatus::Problem,
            ] {
                assert!(!transition_allowed(from, to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn problem_can_resume_or_cancel_only() {
        assert!(transition_allowed(
            DeliveryStatus::Problem,
            DeliveryStatus::InTransit
        ));
        assert!(transition_allowed(
            DeliveryStatus::Problem,
            DeliveryStatus::Cancelled
        ));
        assert!(!transition_allowed(
            DeliveryStatus::Problem,
            DeliveryStatus::Delivered
        ));
    }

    #[test]
    fn invalid_transition_leaves_entity_unchanged() {
        let original = delivery(DeliveryStatus::Delivered);
        let err =
            apply_transition(original.clone(), DeliveryStatus::InTransit, Utc::now()).unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition { .. }));
        // the caller's copy is what counts; apply_transition consumed a clone
        assert_eq!(original.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn delivered_clears_courier_and_stamps_time() {
        let now = Utc::now();
        let done = apply_transition(
            delivery(DeliveryStatus::InTransit),
            DeliveryStatus::Delivered,
            now,
        )
        .unwrap();

        assert_eq!(done.status, DeliveryStatus::Delivered);
        assert_eq!(done.delivered_at, Some(now));
        assert!(done.courier_id.is_none());
        assert!(done.courier_name.is_none());
        assert!(done.route_position.is_none());
    }

    #[test]
    fn cancelled_clears_courier_from_any_live_state() {
        for from in [
            DeliveryStatus::Assigned,
            DeliveryStatus::InTransit,
            DeliveryStatus::Problem,
        ] {
            let cancelled =
                apply_transition(delivery(from), DeliveryStatus::Cancelled, Utc::now()).unwrap();
            assert!(cancelled.courier_id.is_none());
            assert!(cancelled.route_position.is_none());
        }
    }

    #[test]
    fn paid_delivery_without_signature_is_rejected() {
        let d = paid(delivery(DeliveryStatus::InTransit), PaymentMethod::Credito);
        let err = apply_transition(d, DeliveryStatus::Delivered, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::MissingEvidence(_)));
    }

    #[test]
    fn paid_delivery_with_signature_completes() {
        let mut d = paid(delivery(DeliveryStatus::InTransit), PaymentMethod::Credito);
        d.signature = Some("blob://sig/1".to_string());

        let done = apply_transition(d, DeliveryStatus::Delivered, Utc::now()).unwrap();
        assert_eq!(done.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn unpaid_method_none_needs_no_signature() {
        let d = paid(delivery(DeliveryStatus::InTransit), PaymentMethod::None);
        let done = apply_transition(d, DeliveryStatus::Delivered, Utc::now()).unwrap();
        assert_eq!(done.status, DeliveryStatus::Delivered);
    }
}
