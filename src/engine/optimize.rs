use uuid::Uuid;

use crate::models::courier::GeoPoint;
use crate::models::delivery::Delivery;

/// Pluggable route optimization strategy. Implementations receive the
/// courier's last known position (when the fleet tracker has one) and the
/// active stops in their current order, and must return a permutation of
/// the stop ids. Geocoding is an external concern; stops may or may not
/// carry an `address.location`.
pub trait RouteOptimizer: Send + Sync {
    fn optimize(&self, origin: Option<GeoPoint>, stops: &[Delivery]) -> Vec<Uuid>;
}

/// Default strategy: keep the dispatcher-chosen order untouched.
pub struct KeepCurrentOrder;

impl RouteOptimizer for KeepCurrentOrder {
    fn optimize(&self, _origin: Option<GeoPoint>, stops: &[Delivery]) -> Vec<Uuid> {
        stops.iter().map(|d| d.id).collect()
    }
}

/// Greedy nearest-neighbor over haversine distance. Stops without a
/// geocoded location keep their relative order at the end of the route.
pub struct NearestNeighbor;

impl RouteOptimizer for NearestNeighbor {
    fn optimize(&self, origin: Option<GeoPoint>, stops: &[Delivery]) -> Vec<Uuid> {
        let (mut located, unlocated): (Vec<&Delivery>, Vec<&Delivery>) =
            stops.iter().partition(|d| d.address.location.is_some());

        let mut order = Vec::with_capacity(stops.len());
        let mut current = origin;

        while !located.is_empty() {
            let index = match current {
                Some(from) => located
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        let da = haversine_km(&from, &a.address.location.unwrap());
                        let db = haversine_km(&from, &b.address.location.unwrap());
                        da.total_cmp(&db)
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0),
                None => 0,
            };

            let stop = located.remove(index);
            current = stop.address.location;
            order.push(stop.id);
        }

        order.extend(unlocated.iter().map(|d| d.id));
        order
    }
}

const EARTH_RADIUS_KM: f64 = 6_371.0;

fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (delta_lng / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{haversine_km, KeepCurrentOrder, NearestNeighbor, RouteOptimizer};
    use crate::models::courier::GeoPoint;
    use crate::models::delivery::{Address, Delivery, DeliveryStatus};

    fn stop(id_seed: u128, location: Option<GeoPoint>) -> Delivery {
        Delivery {
            id: Uuid::from_u128(id_seed),
            order_number: format!("PED-{id_seed}"),
            status: DeliveryStatus::Assigned,
            customer_name: "Ana".to_string(),
            customer_phone: "11 97777-0000".to_string(),
            address: Address {
                street: "Rua A".to_string(),
                city: "São Paulo".to_string(),
                zip: "01000-000".to_string(),
                complement: None,
                location,
            },
            courier_id: Some(Uuid::from_u128(9)),
            courier_name: Some("Carlos".to_string()),
            route_position: Some(id_seed as u32),
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

    #[test]
    fn haversine_london_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        assert!((haversine_km(&london, &paris) - 343.0).abs() < 5.0);
    }

    #[test]
    fn keep_current_order_is_identity() {
        let stops = vec![stop(1, None), stop(2, None), stop(3, None)];
        let order = KeepCurrentOrder.optimize(None, &stops);
        assert_eq!(
            order,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
    }

    #[test]
    fn nearest_neighbor_visits_closer_stop_first() {
        let depot = GeoPoint {
            lat: -23.5505,
            lng: -46.6333,
        };
        let far = stop(
            1,
            Some(GeoPoint {
                lat: -23.9,
                lng: -46.9,
            }),
        );
        let near = stop(
            2,
            Some(GeoPoint {
                lat: -23.5510,
                lng: -46.6340,
            }),
        );

        let order = NearestNeighbor.optimize(Some(depot), &[far, near]);
        assert_eq!(order, vec![Uuid::from_u128(2), Uuid::from_u128(1)]);
    }

    #[test]
    fn ungeocoded_stops_trail_in_original_order() {
        let depot = GeoPoint {
            lat: -23.5505,
            lng: -46.6333,
        };
        let located = stop(
            1,
            Some(GeoPoint {
                lat: -23.6,
                lng: -46.7,
            }),
        );
        let blind_a = stop(2, None);
        let blind_b = stop(3, None);

        let order = NearestNeighbor.optimize(Some(depot), &[blind_a, located, blind_b]);
        assert_eq!(
            order,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
    }
}
