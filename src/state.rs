use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dispatch::{self, DispatchHandle};
use crate::engine::assignment::AssignmentManager;
use crate::engine::lifecycle::DeliveryLifecycle;
use crate::engine::optimize::{KeepCurrentOrder, RouteOptimizer};
use crate::engine::route::RouteSequencer;
use crate::models::event::Event;
use crate::observability::metrics::Metrics;
use crate::store::memory::MemoryStore;
use crate::store::{CourierStore, DeliveryStore, SubscriptionStore};

pub struct AppState {
    pub deliveries: Arc<dyn DeliveryStore>,
    pub couriers: Arc<dyn CourierStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub lifecycle: DeliveryLifecycle,
    pub assignment: AssignmentManager,
    pub sequencer: RouteSequencer,
    pub dispatcher: DispatchHandle,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        couriers: Arc<dyn CourierStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        optimizer: Arc<dyn RouteOptimizer>,
        dispatch_queue_size: usize,
    ) -> (Self, mpsc::Receiver<Event>) {
        let metrics = Metrics::new();
        let (dispatcher, event_rx) = dispatch::channel(dispatch_queue_size, metrics.clone());

        let sequencer = RouteSequencer::new(deliveries.clone(), couriers.clone(), optimizer);
        let lifecycle =
            DeliveryLifecycle::new(deliveries.clone(), dispatcher.clone(), metrics.clone());
        let assignment =
            AssignmentManager::new(deliveries.clone(), couriers.clone(), sequencer.clone());

        (
            Self {
                deliveries,
                couriers,
                subscriptions,
                lifecycle,
                assignment,
                sequencer,
                dispatcher,
                metrics,
            },
            event_rx,
        )
    }

    /// Default binding: one in-memory store behind all three ports and the
    /// order-preserving optimizer placeholder.
    pub fn in_memory(dispatch_queue_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(KeepCurrentOrder),
            dispatch_queue_size,
        )
    }
}
