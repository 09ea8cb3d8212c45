//! Stage 1 of candidate selection (spec §4.2): six independent
//! eligibility checks applied on top of the base
//! `online ∧ active ∧ approved ∧ state = idle` pool that
//! `DriverStore::find_eligible` already returns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::coordination::{driver_notification_lock, notifying_order::is_blacklisted, KvStore};
use shared::domain::{Driver, Order, OrderKind};

/// TTL for the busy probe (spec §4.2 stage 1(b)): short because the
/// probe acquires and immediately releases, so its only effect is the
/// brief window between the two calls.
const PROBE_TTL_SECS: u64 = 2;

/// Applies checks (c)-(f), which need no I/O, then (a)/(b), which do.
/// Order matches the spec's lettering but cheap checks run first so the
/// I/O-bound ones only run against drivers that could still make it.
pub async fn stage1_eligibility(
    candidates: Vec<Driver>,
    order: &Order,
    kv: Arc<dyn KvStore>,
    now: DateTime<Utc>,
    blacklist_enabled: bool,
) -> anyhow::Result<Vec<Driver>> {
    let mut survivors = Vec::with_capacity(candidates.len());

    for driver in candidates {
        if driver.location.is_none() {
            continue; // (f) missing coordinates
        }
        if !driver.fleet.may_serve(order.fleet) {
            continue; // (d) fleet-matching rule
        }
        if driver.rejects_fleet(order.fleet) {
            continue; // (e) order's fleet is in the driver's reject-list
        }
        if order.kind == OrderKind::Instant
            && driver.has_near_term_schedule_hold(chrono::Duration::hours(1), now)
        {
            continue; // (c) scheduled order within the next hour
        }

        if blacklist_enabled && is_blacklisted(&kv, &driver.id, &order.pickup.resolved_address).await? {
            continue; // (a) blacklisted at this pickup address
        }

        let probe = driver_notification_lock(kv.clone(), &driver.id, PROBE_TTL_SECS);
        if probe.probe_busy().await? {
            continue; // (b) currently being offered something else
        }

        survivors.push(driver);
    }

    Ok(survivors)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use shared::coordination::fake::InMemoryKvStore;
    use shared::domain::{Coordinate, CreatorMeta, DriverState, FleetTag, Location, OrderKind, OrderStatus};
    use uuid::Uuid;

    use super::*;

    fn base_driver(id: &str) -> Driver {
        Driver {
            id: id.to_string(),
            short_id: id.to_string(),
            plate: "ABC-1".into(),
            fleet: FleetTag::Rsk,
            approved: true,
            active: true,
            online: true,
            state: DriverState::Idle,
            location: Some(Coordinate::new(25.0, 121.5)),
            push_token: Some("tok".into()),
            reject_list: HashSet::new(),
            scheduled_hold: None,
            updated_at: Utc::now(),
        }
    }

    fn instant_order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            short_id: "O1".into(),
            kind: OrderKind::Instant,
            status: OrderStatus::Waiting,
            fleet: FleetTag::Rsk,
            pickup: Location {
                input_text: "x".into(),
                resolved_address: "123 Main St".into(),
                coord: Some(Coordinate::new(25.0, 121.5)),
            },
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

    #[tokio::test]
    async fn drops_driver_missing_coordinates() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let mut d = base_driver("D1");
        d.location = None;
        let survivors = stage1_eligibility(vec![d], &instant_order(), kv, Utc::now(), true).await.unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn wei_order_drops_non_wei_driver() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let d = base_driver("D1");
        let mut order = instant_order();
        order.fleet = FleetTag::Wei;
        let survivors = stage1_eligibility(vec![d], &order, kv, Utc::now(), true).await.unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn drops_driver_with_order_fleet_on_reject_list() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let mut d = base_driver("D1");
        d.reject_list.insert(FleetTag::Rsk);
        let survivors = stage1_eligibility(vec![d], &instant_order(), kv, Utc::now(), true).await.unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn drops_blacklisted_driver() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        shared::coordination::notifying_order::add_to_blacklist(&kv, "D1", "123 Main St", 1800)
            .await
            .unwrap();
        let d = base_driver("D1");
        let survivors = stage1_eligibility(vec![d], &instant_order(), kv, Utc::now(), true).await.unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn blacklist_disabled_skips_the_check() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        shared::coordination::notifying_order::add_to_blacklist(&kv, "D1", "123 Main St", 1800)
            .await
            .unwrap();
        let d = base_driver("D1");
        let survivors = stage1_eligibility(vec![d], &instant_order(), kv, Utc::now(), false).await.unwrap();
        assert_eq!(survivors.len(), 1, "blacklist_enabled = false must skip the blacklist read entirely");
    }

    #[tokio::test]
    async fn drops_busy_driver() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let lock = driver_notification_lock(kv.clone(), "D1", 30);
        let _token = lock.acquire().await.unwrap().unwrap();

        let d = base_driver("D1");
        let survivors = stage1_eligibility(vec![d], &instant_order(), kv, Utc::now(), true).await.unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn eligible_driver_survives() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let d = base_driver("D1");
        let survivors = stage1_eligibility(vec![d], &instant_order(), kv, Utc::now(), true).await.unwrap();
        assert_eq!(survivors.len(), 1);
    }
}
