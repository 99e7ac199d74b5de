use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::optimize::RouteOptimizer;
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::store::{CourierStore, DeliveryStore, update_with_retry};

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Keeps each courier's active stops ranked by a dense 1..N
/// `route_position`. Completing, cancelling or unassigning a stop leaves a
/// gap on purpose; density is restored by the next `reorder`.
///
/// Every mutation runs under that courier's route lock: the per-delivery
/// version CAS alone cannot serialize a read-compute-write over the whole
/// position set, so two concurrent appends would both read the same max
/// and commit duplicate ranks.
#[derive(Clone)]
pub struct RouteSequencer {
    deliveries: Arc<dyn DeliveryStore>,
    couriers: Arc<dyn CourierStore>,
    optimizer: Arc<dyn RouteOptimizer>,
    route_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RouteSequencer {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        couriers: Arc<dyn CourierStore>,
        optimizer: Arc<dyn RouteOptimizer>,
    ) -> Self {
        Self {
            deliveries,
            couriers,
            optimizer,
            route_locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock_route(&self, courier_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.route_locks.entry(courier_id).or_default().clone();
        lock.lock_owned().await
    }

    /// The courier's Assigned/InTransit stops, positioned ones first in
    /// ascending position, then positionless by creation time.
    pub async fn active_route(&self, courier_id: Uuid) -> Result<Vec<Delivery>, AppError> {
        let mut stops: Vec<Delivery> = self
            .deliveries
            .list_by_courier(courier_id)
            .await?
            .into_iter()
            .filter(|d| d.status.is_active_on_route())
            .collect();

        stops.sort_by(|a, b| {
            let key_a = (a.route_position.is_none(), a.route_position, a.created_at);
            let key_b = (b.route_position.is_none(), b.route_position, b.created_at);
            key_a.cmp(&key_b)
        });

        Ok(stops)
    }

    /// Give a newly assigned delivery the next free rank at the end of the
    /// courier's route.
    pub async fn append(&self, courier_id: Uuid, delivery_id: Uuid) -> Result<Delivery, AppError> {
        let _route = self.lock_route(courier_id).await;

        let stops = self.active_route(courier_id).await?;
        let next = stops
            .iter()
            .filter(|d| d.id != delivery_id)
            .filter_map(|d| d.route_position)
            .max()
            .unwrap_or(0)
            + 1;

        let (_, updated) = update_with_retry(self.deliveries.as_ref(), delivery_id, |current| {
            if current.courier_id != Some(courier_id) {
                return Err(AppError::BadRequest(format!(
                    "delivery {delivery_id} is not assigned to courier {courier_id}"
                )));
            }
            let mut next_state = current.clone();
            next_state.route_position = Some(next);
            Ok(next_state)
        })
        .await?;

        Ok(updated)
    }

    /// Re-rank the courier's route to exactly `ordered`. The id list must be
    /// the full set of active stops. Updates are persisted one delivery at a
    /// time; when some of them fail, the committed subset stays committed
    /// and the error names exactly which ids still need a retry.
    pub async fn reorder(
        &self,
        courier_id: Uuid,
        ordered: Vec<Uuid>,
    ) -> Result<Vec<Delivery>, AppError> {
        let _route = self.lock_route(courier_id).await;
        self.reorder_locked(courier_id, ordered).await
    }

    /// Body of `reorder`; callers must hold the courier's route lock.
    async fn reorder_locked(
        &self,
        courier_id: Uuid,
        ordered: Vec<Uuid>,
    ) -> Result<Vec<Delivery>, AppError> {
        let stops = self.active_route(courier_id).await?;

        let proposed: HashSet<Uuid> = ordered.iter().copied().collect();
        if proposed.len() != ordered.len() {
            return Err(AppError::BadRequest(
                "ordered delivery ids contain duplicates".to_string(),
            ));
        }

        let current: HashSet<Uuid> = stops.iter().map(|d| d.id).collect();
        if proposed != current {
            return Err(AppError::BadRequest(format!(
                "ordered ids must be exactly the courier's {} active deliveries",
                current.len()
            )));
        }

        let mut by_id: HashMap<Uuid, Delivery> =
            stops.into_iter().map(|d| (d.id, d)).collect();

        let mut reordered = Vec::with_capacity(ordered.len());
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for (index, id) in ordered.iter().enumerate() {
            let mut delivery = by_id.remove(id).ok_or_else(|| {
                AppError::Internal(format!("delivery {id} vanished during reorder"))
            })?;
            delivery.route_position = Some(index as u32 + 1);

            match self.deliveries.update(delivery).await {
                Ok(updated) => {
                    applied.push(*id);
                    reordered.push(updated);
                }
                Err(err) => {
                    warn!(delivery_id = %id, error = %err, "route position update failed");
                    failed.push(*id);
                }
            }
        }

        if failed.is_empty() {
            info!(courier_id = %courier_id, stops = reordered.len(), "route reordered");
            Ok(reordered)
        } else {
            Err(AppError::ReorderPartial { applied, failed })
        }
    }

    pub async fn move_up(
        &self,
        courier_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Vec<Delivery>, AppError> {
        self.shift(courier_id, delivery_id, Direction::Up).await
    }

    pub async fn move_down(
        &self,
        courier_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Vec<Delivery>, AppError> {
        self.shift(courier_id, delivery_id, Direction::Down).await
    }

    async fn shift(
        &self,
        courier_id: Uuid,
        delivery_id: Uuid,
        direction: Direction,
    ) -> Result<Vec<Delivery>, AppError> {
        let _route = self.lock_route(courier_id).await;

        let stops = self.active_route(courier_id).await?;
        let mut order: Vec<Uuid> = stops.iter().map(|d| d.id).collect();

        let index = order
            .iter()
            .position(|id| *id == delivery_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "delivery {delivery_id} is not on courier {courier_id}'s route"
                ))
            })?;

        let neighbor = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < order.len() => index + 1,
            // already at the boundary; nothing to do
            _ => return Ok(stops),
        };

        order.swap(index, neighbor);
        self.reorder_locked(courier_id, order).await
    }

    /// Run the configured optimization strategy over the courier's route and
    /// persist the resulting order.
    pub async fn optimize(&self, courier_id: Uuid) -> Result<Vec<Delivery>, AppError> {
        let courier = self.couriers.get(courier_id).await?;

        let _route = self.lock_route(courier_id).await;

        let stops = self.active_route(courier_id).await?;
        if stops.len() < 2 {
            return Ok(stops);
        }

        let order = self.optimizer.optimize(courier.last_known_position, &stops);
        self.reorder_locked(courier_id, order).await
    }
}
