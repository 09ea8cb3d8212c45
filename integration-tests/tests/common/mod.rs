use std::collections::HashSet;

use chrono::Utc;
use shared::domain::{Coordinate, CreatorMeta, Driver, DriverState, FleetTag, Location, Order, OrderKind, OrderStatus};
use uuid::Uuid;

pub fn driver(id: &str, fleet: FleetTag) -> Driver {
    Driver {
        id: id.to_string(),
        short_id: id.to_string(),
        plate: "ABC-1".into(),
        fleet,
        approved: true,
        active: true,
        online: true,
        state: DriverState::Idle,
        location: Some(Coordinate::new(25.0, 121.5)),
        push_token: Some(format!("tok-{id}")),
        reject_list: HashSet::new(),
        scheduled_hold: None,
        updated_at: Utc::now(),
    }
}

pub fn instant_order(fleet: FleetTag) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        short_id: "O1".into(),
        kind: OrderKind::Instant,
        status: OrderStatus::Waiting,
        fleet,
        pickup: Location { input_text: "x".into(), resolved_address: "123 Main St".into(), coord: Some(Coordinate::new(25.0, 121.5)) },
        destination: None,
        remarks: None,
        scheduled_pickup_at: None,
        rounds: 0,
        assigned_driver: None,
        log: Vec::new(),
        creator: CreatorMeta { source: "test".into(), created_by: "test".into() },
        created_at: now,
        updated_at: now,
        driver_notified: false,
        converted_from: None,
    }
}

pub fn scheduled_order(fleet: FleetTag, pickup_in: chrono::Duration) -> Order {
    let mut order = instant_order(fleet);
    order.kind = OrderKind::Scheduled;
    order.scheduled_pickup_at = Some(Utc::now() + pickup_in);
    order
}
