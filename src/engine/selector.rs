use std::cmp::Ordering;

use crate::models::delivery::{Delivery, DeliveryStatus};

/// Pick the courier's next stop from their open deliveries (anything not
/// Delivered or Cancelled). Pure and deterministic: same input, same pick.
///
/// The total order is: stops with a route position first (ascending), then
/// positionless stops with InTransit ahead of the rest, creation time as
/// the final tiebreak.
pub fn select_next(open: &[Delivery]) -> Option<&Delivery> {
    open.iter().min_by(|a, b| stop_order(a, b))
}

fn stop_order(a: &Delivery, b: &Delivery) -> Ordering {
    match (a.route_position, b.route_position) {
        (Some(pa), Some(pb)) => pa.cmp(&pb).then(a.created_at.cmp(&b.created_at)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => status_rank(a.status)
            .cmp(&status_rank(b.status))
            .then(a.created_at.cmp(&b.created_at)),
    }
}

fn status_rank(status: DeliveryStatus) -> u8 {
    if status == DeliveryStatus::InTransit { 0 } else { 1 }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::select_next;
    use crate::models::delivery::{Address, Delivery, DeliveryStatus};

    fn stop(
        id_seed: u128,
        status: DeliveryStatus,
        position: Option<u32>,
        created_offset_s: i64,
    ) -> Delivery {
        Delivery {
            id: Uuid::from_u128(id_seed),
            order_number: format!("PED-{id_seed}"),
            status,
            customer_name: "Cliente".to_string(),
            customer_phone: "11 90000-0000".to_string(),
            address: Address {
                street: "Rua B".to_string(),
                city: "São Paulo".to_string(),
                zip: "02000-000".to_string(),
                complement: None,
                location: None,
            },
            courier_id: Some(Uuid::from_u128(9)),
            courier_name: Some("Carlos".to_string()),
            route_position: position,
            payment: None,
            items: vec![],
            signature: None,
            photos: vec![],
            notes: None,
            created_at: Utc::now() + Duration::seconds(created_offset_s),
            delivered_at: None,
            deadline: None,
            version: 0,
        }
    }

    #[test]
    fn empty_set_selects_nothing() {
        assert!(select_next(&[]).is_none());
    }

    #[test]
    fn lowest_route_position_wins() {
        let stops = vec![
            stop(1, DeliveryStatus::Assigned, Some(3), 0),
            stop(2, DeliveryStatus::Assigned, Some(1), 10),
            stop(3, DeliveryStatus::InTransit, Some(2), -10),
        ];
        assert_eq!(select_next(&stops).unwrap().id, Uuid::from_u128(2));
    }

    #[test]
    fn positioned_beats_positionless() {
        let stops = vec![
            stop(1, DeliveryStatus::InTransit, None, -100),
            stop(2, DeliveryStatus::Assigned, Some(5), 0),
        ];
        assert_eq!(select_next(&stops).unwrap().id, Uuid::from_u128(2));
    }

    #[test]
    fn among_positionless_in_transit_comes_first() {
        let stops = vec![
            stop(1, DeliveryStatus::Problem, None, -100),
            stop(2, DeliveryStatus::InTransit, None, 0),
            stop(3, DeliveryStatus::Pending, None, -200),
        ];
        assert_eq!(select_next(&stops).unwrap().id, Uuid::from_u128(2));
    }

    #[test]
    fn created_at_breaks_remaining_ties() {
        let stops = vec![
            stop(1, DeliveryStatus::Problem, None, 50),
            stop(2, DeliveryStatus::Problem, None, -50),
        ];
        assert_eq!(select_next(&stops).unwrap().id, Uuid::from_u128(2));
    }

    #[test]
    fn selection_is_stable_across_calls() {
        let stops = vec![
            stop(1, DeliveryStatus::Assigned, Some(2), 0),
            stop(2, DeliveryStatus::InTransit, None, -10),
            stop(3, DeliveryStatus::Assigned, Some(1), 5),
        ];

        let first = select_next(&stops).unwrap().id;
        for _ in 0..10 {
            assert_eq!(select_next(&stops).unwrap().id, first);
        }
    }
}
