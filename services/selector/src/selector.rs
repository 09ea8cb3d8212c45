//! Candidate selector (component B): the full three-stage pipeline from
//! spec §4.2, wired behind one entry point the dispatch orchestrator
//! calls per order.

use std::sync::Arc;

use chrono::Utc;
use shared::coordination::KvStore;
use shared::domain::Order;
use shared::ports::{DriverStore, RouteMatrixClient};
use shared::Settings;

use crate::eligibility::stage1_eligibility;
use crate::ranking::{stage2_haversine_shortlist, stage3_road_route_ranking, RankedCandidate};

pub struct CandidateSelector {
    driver_store: Arc<dyn DriverStore>,
    route_client: Arc<dyn RouteMatrixClient>,
    kv: Arc<dyn KvStore>,
    settings: Settings,
}

impl CandidateSelector {
    pub fn new(
        driver_store: Arc<dyn DriverStore>,
        route_client: Arc<dyn RouteMatrixClient>,
        kv: Arc<dyn KvStore>,
        settings: Settings,
    ) -> Self {
        Self { driver_store, route_client, kv, settings }
    }

    /// Returns up to `N_final` ranked candidates, or an error if the
    /// route-matrix call failed (spec §4.2: "the whole selection
    /// fails"). An order with an unresolved pickup coordinate yields an
    /// empty list rather than an error — there is nothing to rank from.
    pub async fn select(&self, order: &Order) -> anyhow::Result<Vec<RankedCandidate>> {
        let pickup = match order.pickup.coord {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let base_pool = self.driver_store.find_eligible(order.fleet).await?;
        tracing::debug!(order_id = %order.id, base_pool = base_pool.len(), "candidate selection stage 1 input");

        let eligible = stage1_eligibility(
            base_pool,
            order,
            self.kv.clone(),
            Utc::now(),
            self.settings.blacklist_enabled,
        )
        .await?;
        let shortlisted = stage2_haversine_shortlist(eligible, pickup, order.fleet, &self.settings);

        if shortlisted.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = stage3_road_route_ranking(
            shortlisted,
            pickup,
            order.fleet,
            self.route_client.as_ref(),
            &self.settings,
        )
        .await?;

        tracing::debug!(order_id = %order.id, ranked = ranked.len(), "candidate selection complete");
        Ok(ranked)
    }
}
