//! Stages 2 and 3 of candidate selection (spec §4.2): straight-line
//! shortlisting, then a single external road-route call that produces
//! the final ranking.

use shared::domain::{Coordinate, Driver, FleetTag};
use shared::ports::{RouteLeg, RouteMatrixClient};
use shared::Settings;

/// One candidate with the real-route figures the caller offers on.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub driver: Driver,
    pub distance_km: f64,
    pub time_minutes: f64,
}

/// Great-circle distance ranking, capped at `D_max` unless the order's
/// fleet bypasses distance caps (spec §4.2 stage 2).
pub fn stage2_haversine_shortlist(
    mut candidates: Vec<Driver>,
    pickup: Coordinate,
    order_fleet: FleetTag,
    settings: &Settings,
) -> Vec<Driver> {
    let bypass_caps = order_fleet.bypasses_distance_caps();

    candidates.retain(|d| {
        let coord = match d.location {
            Some(c) => c,
            None => return false,
        };
        bypass_caps || coord.haversine_km(&pickup) <= settings.d_max_km
    });

    candidates.sort_by(|a, b| {
        let da = a.location.map(|c| c.haversine_km(&pickup)).unwrap_or(f64::MAX);
        let db = b.location.map(|c| c.haversine_km(&pickup)).unwrap_or(f64::MAX);
        da.total_cmp(&db)
    });

    candidates.truncate(settings.n_haversine);
    candidates
}

/// Road-route ranking via the external route-matrix service (spec §4.2
/// stage 3). Candidates beyond the length of the returned leg vector are
/// dropped rather than assumed to have zero ETA (spec §8 boundary
/// behavior).
///
/// Propagates the route-matrix client's error untouched: per spec §4.2,
/// "If the route-matrix call fails, the whole selection fails."
pub async fn stage3_road_route_ranking(
    candidates: Vec<Driver>,
    pickup: Coordinate,
    order_fleet: FleetTag,
    route_client: &dyn RouteMatrixClient,
    settings: &Settings,
) -> anyhow::Result<Vec<RankedCandidate>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let origins: Vec<Coordinate> = candidates.iter().filter_map(|d| d.location).collect();
    let legs: Vec<RouteLeg> = route_client.directions_matrix_inverse(&origins, pickup).await?;

    let bypass_caps = order_fleet.bypasses_distance_caps();

    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .zip(legs)
        .filter(|(_, leg)| bypass_caps || leg.time_minutes <= settings.t_max_min)
        .map(|(driver, leg)| RankedCandidate {
            driver,
            distance_km: leg.distance_km,
            time_minutes: leg.time_minutes,
        })
        .collect();

    // Stable sort: ties in time_minutes keep input order (spec §4.2).
    ranked.sort_by(|a, b| a.time_minutes.total_cmp(&b.time_minutes));
    ranked.truncate(settings.n_final);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use shared::domain::DriverState;
    use shared::ports::fake::FakeRouteMatrixClient;

    use super::*;

    fn driver_at(id: &str, lat: f64, lng: f64) -> Driver {
        Driver {
            id: id.to_string(),
            short_id: id.to_string(),
            plate: "ABC-1".into(),
            fleet: FleetTag::Rsk,
            approved: true,
            active: true,
            online: true,
            state: DriverState::Idle,
            location: Some(Coordinate::new(lat, lng)),
            push_token: Some("tok".into()),
            reject_list: HashSet::new(),
            scheduled_hold: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn drops_drivers_beyond_d_max_unless_wei() {
        let pickup = Coordinate::new(25.0, 121.5);
        let near = driver_at("D1", 25.01, 121.5);
        let far = driver_at("D2", 26.5, 121.5); // well beyond 15km
        let settings = Settings::default();

        let result = stage2_haversine_shortlist(vec![near.clone(), far.clone()], pickup, FleetTag::Rsk, &settings);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "D1");

        let result_wei = stage2_haversine_shortlist(vec![near, far], pickup, FleetTag::Wei, &settings);
        assert_eq!(result_wei.len(), 2);
    }

    #[test]
    fn sorts_ascending_by_distance() {
        let pickup = Coordinate::new(25.0, 121.5);
        let far = driver_at("D1", 25.1, 121.5);
        let near = driver_at("D2", 25.01, 121.5);
        let settings = Settings::default();

        let result = stage2_haversine_shortlist(vec![far, near], pickup, FleetTag::Rsk, &settings);
        assert_eq!(result[0].id, "D2");
        assert_eq!(result[1].id, "D1");
    }

    #[tokio::test]
    async fn candidates_beyond_returned_legs_are_dropped() {
        let settings = Settings::default();
        let candidates = vec![driver_at("D1", 25.0, 121.5), driver_at("D2", 25.01, 121.5)];
        let client = FakeRouteMatrixClient::returning(vec![RouteLeg { distance_km: 1.0, time_minutes: 5.0 }]);

        let ranked = stage3_road_route_ranking(
            candidates,
            Coordinate::new(25.0, 121.5),
            FleetTag::Rsk,
            &client,
            &settings,
        )
        .await
        .unwrap();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].driver.id, "D1");
    }

    #[tokio::test]
    async fn drops_candidates_exceeding_t_max_unless_wei() {
        let settings = Settings::default();
        let candidates = vec![driver_at("D1", 25.0, 121.5)];
        let client = FakeRouteMatrixClient::returning(vec![RouteLeg { distance_km: 1.0, time_minutes: 25.0 }]);

        let ranked = stage3_road_route_ranking(
            candidates.clone(),
            Coordinate::new(25.0, 121.5),
            FleetTag::Rsk,
            &client,
            &settings,
        )
        .await
        .unwrap();
        assert!(ranked.is_empty());

        let client_wei = FakeRouteMatrixClient::returning(vec![RouteLeg { distance_km: 1.0, time_minutes: 25.0 }]);
        let ranked_wei = stage3_road_route_ranking(
            candidates,
            Coordinate::new(25.0, 121.5),
            FleetTag::Wei,
            &client_wei,
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(ranked_wei.len(), 1);
    }

    #[tokio::test]
    async fn route_matrix_failure_propagates() {
        let settings = Settings::default();
        let candidates = vec![driver_at("D1", 25.0, 121.5)];
        let client = FakeRouteMatrixClient::failing();

        let result = stage3_road_route_ranking(
            candidates,
            Coordinate::new(25.0, 121.5),
            FleetTag::Rsk,
            &client,
            &settings,
        )
        .await;
        assert!(result.is_err());
    }
}
