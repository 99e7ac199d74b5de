use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::apply_transition;
use crate::engine::route::RouteSequencer;
use crate::error::AppError;
use crate::models::courier::CourierStatus;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::store::{CourierStore, DeliveryStore, update_with_retry};

#[derive(Clone)]
pub struct AssignmentManager {
    deliveries: Arc<dyn DeliveryStore>,
    couriers: Arc<dyn CourierStore>,
    sequencer: RouteSequencer,
}

impl AssignmentManager {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        couriers: Arc<dyn CourierStore>,
        sequencer: RouteSequencer,
    ) -> Self {
        Self {
            deliveries,
            couriers,
            sequencer,
        }
    }

    /// Hand a Pending delivery to an active courier and append it to the
    /// end of that courier's route.
    pub async fn assign(&self, delivery_id: Uuid, courier_id: Uuid) -> Result<Delivery, AppError> {
        let courier = self.couriers.get(courier_id).await?;
        if courier.status != CourierStatus::Active {
            return Err(AppError::BadRequest(format!(
                "courier {} is not active",
                courier.id
            )));
        }

        let (_, assigned) =
            update_with_retry(self.deliveries.as_ref(), delivery_id, |current| {
                let mut next = apply_transition(current.clone(), DeliveryStatus::Assigned, Utc::now())?;
                next.courier_id = Some(courier.id);
                next.courier_name = Some(courier.name.clone());
                Ok(next)
            })
            .await?;

        // the courier/position fields travel together; if the position write
        // fails the delivery goes back to the pool instead of staying
        // Assigned without a rank
        let sequenced = match self.sequencer.append(courier_id, assigned.id).await {
            Ok(sequenced) => sequenced,
            Err(err) => {
                warn!(
                    delivery_id = %assigned.id,
                    courier_id = %courier_id,
                    error = %err,
                    "route append failed; returning delivery to pool"
                );
                self.return_to_pool(assigned.id, courier_id).await;
                return Err(err);
            }
        };

        info!(
            delivery_id = %sequenced.id,
            courier_id = %courier_id,
            route_position = sequenced.route_position,
            "delivery assigned"
        );

        Ok(sequenced)
    }

    /// Compensation for a failed append: undo the Assigned commit, but only
    /// while the delivery is still in the state this assign produced.
    async fn return_to_pool(&self, delivery_id: Uuid, courier_id: Uuid) {
        let restored = update_with_retry(self.deliveries.as_ref(), delivery_id, |current| {
            if current.status != DeliveryStatus::Assigned
                || current.courier_id != Some(courier_id)
            {
                return Err(AppError::Conflict(format!(
                    "delivery {delivery_id} changed before it could return to the pool"
                )));
            }

            let mut next = current.clone();
            next.status = DeliveryStatus::Pending;
            next.clear_courier();
            Ok(next)
        })
        .await;

        if let Err(err) = restored {
            error!(
                delivery_id = %delivery_id,
                error = %err,
                "failed to return delivery to pool after append failure"
            );
        }
    }

    /// Return an Assigned or InTransit delivery to the pending pool. The
    /// courier's remaining stops keep their ranks; any gap closes on the
    /// next reorder.
    pub async fn unassign(&self, delivery_id: Uuid) -> Result<Delivery, AppError> {
        let (previous, pooled) =
            update_with_retry(self.deliveries.as_ref(), delivery_id, |current| {
                if !current.status.is_active_on_route() {
                    return Err(AppError::InvalidTransition {
                        from: current.status,
                        to: DeliveryStatus::Pending,
                    });
                }

                let mut next = current.clone();
                next.status = DeliveryStatus::Pending;
                next.clear_courier();
                Ok(next)
            })
            .await?;

        info!(
            delivery_id = %pooled.id,
            courier_id = ?previous.courier_id,
            "delivery returned to pool"
        );

        Ok(pooled)
    }
}
