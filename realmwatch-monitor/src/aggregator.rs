//! One status cycle: probe both gateways, then count players.
//!
//! # Data Flow
//! ```text
//! compute()
//!     → auth probe ┐ concurrently
//!     → world probe┘
//!     → population query (only if the world gateway answered)
//!     → CompositeStatus
//! ```
//!
//! # Design Decisions
//! - The cycle runs under an overall deadline on top of the probe and query
//!   timeouts
//! - A cycle that panics or misses its deadline reports the realm fully
//!   offline; `compute` never fails

use crate::config::Config;
use crate::population::{PopulationGateway, PopulationStore};
use crate::probe::{Probe, TcpProbe};
use crate::status::{CompositeStatus, RealmInfo};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{error, info};

/// Why a cycle was replaced by the offline snapshot.
#[derive(Debug, Error)]
pub enum AggregationFault {
    #[error("status cycle exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error("status cycle panicked: {0}")]
    Panicked(String),
}

/// Addresses of the two gateways being watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: String,
    pub world: String,
}

pub struct StatusAggregator<P, S> {
    prober: P,
    gateway: PopulationGateway<S>,
    endpoints: Endpoints,
    realm: RealmInfo,
    cycle_deadline: Duration,
}

impl<S: PopulationStore> StatusAggregator<TcpProbe, S> {
    /// Production wiring: TCP probes and a fallback-caching gateway over `store`.
    pub fn from_config(config: &Config, store: S) -> Self {
        Self::new(
            TcpProbe::new(config.probe_timeout),
            PopulationGateway::new(store, config.population_ttl),
            Endpoints {
                auth: config.auth_address.clone(),
                world: config.world_address.clone(),
            },
            config.realm(),
            config.cycle_deadline,
        )
    }
}

impl<P: Probe, S: PopulationStore> StatusAggregator<P, S> {
    pub fn new(
        prober: P,
        gateway: PopulationGateway<S>,
        endpoints: Endpoints,
        realm: RealmInfo,
        cycle_deadline: Duration,
    ) -> Self {
        Self {
            prober,
            gateway,
            endpoints,
            realm,
            cycle_deadline,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn gateway(&self) -> &PopulationGateway<S> {
        &self.gateway
    }

    /// Run a full cycle. Faults degrade to the offline snapshot.
    pub async fn compute(&self) -> CompositeStatus {
        match self.try_compute().await {
            Ok(status) => status,
            Err(fault) => {
                error!(error = %fault, "status cycle failed, reporting realm offline");
                CompositeStatus::offline(&self.realm)
            }
        }
    }

    /// Run a full cycle, reporting faults instead of masking them.
    pub async fn try_compute(&self) -> Result<CompositeStatus, AggregationFault> {
        let cycle = AssertUnwindSafe(self.run_cycle()).catch_unwind();
        match time::timeout(self.cycle_deadline, cycle).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(panic)) => Err(AggregationFault::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(AggregationFault::DeadlineExceeded(self.cycle_deadline)),
        }
    }

    async fn run_cycle(&self) -> CompositeStatus {
        let (auth, world) = tokio::join!(
            self.prober.probe(&self.endpoints.auth),
            self.prober.probe(&self.endpoints.world),
        );

        let players = if world.is_reachable() {
            self.gateway.get_population().await.count()
        } else {
            0
        };

        let status = CompositeStatus::new(auth.is_reachable(), world.is_reachable(), players, &self.realm);
        info!(
            auth = status.auth_online(),
            world = status.world_online(),
            players = status.players_online(),
            "status cycle complete"
        );
        status
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::DEFAULT_POPULATION_TTL;
    use realmwatch_db::DbError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const AUTH: &str = "auth:3724";
    const WORLD: &str = "world:8085";

    /// Answers per address after a fixed delay.
    struct DelayProbe {
        answers: HashMap<&'static str, (Duration, bool)>,
    }

    impl DelayProbe {
        fn new(auth: (u64, bool), world: (u64, bool)) -> Self {
            let mut answers = HashMap::new();
            answers.insert(AUTH, (Duration::from_millis(auth.0), auth.1));
            answers.insert(WORLD, (Duration::from_millis(world.0), world.1));
            Self { answers }
        }
    }

    impl Probe for DelayProbe {
        async fn probe(&self, addr: &str) -> crate::probe::Reachability {
            let (delay, up) = self.answers.get(addr).copied().unwrap_or((Duration::ZERO, false));
            time::sleep(delay).await;
            up.into()
        }
    }

    struct PanickingProbe;

    impl Probe for PanickingProbe {
        async fn probe(&self, _addr: &str) -> crate::probe::Reachability {
            panic!("probe exploded");
        }
    }

    /// `None` answers fail; counts calls.
    struct FakeStore {
        answers: Mutex<Vec<Option<u32>>>,
        calls: AtomicUsize,
    }

    impl FakeStore {
        fn new(answers: Vec<Option<u32>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PopulationStore for FakeStore {
        async fn online_players(&self) -> realmwatch_db::Result<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            let next = if answers.is_empty() { None } else { answers.remove(0) };
            next.ok_or(DbError::Timeout(Duration::from_secs(3)))
        }
    }

    fn aggregator<P: Probe>(prober: P, store: FakeStore) -> StatusAggregator<P, FakeStore> {
        StatusAggregator::new(
            prober,
            PopulationGateway::new(store, DEFAULT_POPULATION_TTL),
            Endpoints {
                auth: AUTH.to_string(),
                world: WORLD.to_string(),
            },
            RealmInfo::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let agg = aggregator(DelayProbe::new((50, true), (200, true)), FakeStore::new(vec![Some(1)]));

        let started = Instant::now();
        let status = agg.compute().await;
        let elapsed = started.elapsed();

        assert!(status.is_online());
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(250), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_all_up() {
        let agg = aggregator(DelayProbe::new((0, true), (0, true)), FakeStore::new(vec![Some(42)]));

        let status = agg.compute().await;
        assert!(status.auth_online());
        assert!(status.world_online());
        assert_eq!(status.players_online(), 42);
    }

    #[tokio::test]
    async fn test_auth_down_world_up() {
        let agg = aggregator(DelayProbe::new((0, false), (0, true)), FakeStore::new(vec![Some(10)]));

        let status = agg.compute().await;
        assert!(!status.auth_online());
        assert!(status.world_online());
        assert_eq!(status.players_online(), 10);
    }

    #[tokio::test]
    async fn test_world_down_skips_population_and_reports_zero() {
        let agg = aggregator(DelayProbe::new((0, true), (0, false)), FakeStore::new(vec![Some(99)]));

        let status = agg.compute().await;
        assert!(!status.world_online());
        assert_eq!(status.players_online(), 0);
        assert_eq!(agg.gateway().store().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_world_down_ignores_cached_population() {
        let agg = aggregator(DelayProbe::new((0, true), (0, true)), FakeStore::new(vec![Some(30)]));
        assert_eq!(agg.compute().await.players_online(), 30);

        let agg = StatusAggregator {
            prober: DelayProbe::new((0, true), (0, false)),
            ..agg
        };
        assert_eq!(agg.gateway().fallback().map(|e| *e.value()), Some(30));
        assert_eq!(agg.compute().await.players_online(), 0);
    }

    #[tokio::test]
    async fn test_population_failure_uses_fallback() {
        let agg = aggregator(DelayProbe::new((0, true), (0, true)), FakeStore::new(vec![Some(7), None]));

        assert_eq!(agg.compute().await.players_online(), 7);
        assert_eq!(agg.compute().await.players_online(), 7);
    }

    #[tokio::test]
    async fn test_panic_degrades_to_offline() {
        let agg = aggregator(PanickingProbe, FakeStore::new(vec![Some(5)]));

        assert!(matches!(agg.try_compute().await, Err(AggregationFault::Panicked(msg)) if msg == "probe exploded"));
        let status = agg.compute().await;
        assert_eq!(status, CompositeStatus::offline(&RealmInfo::default()));
    }

    #[tokio::test]
    async fn test_deadline_degrades_to_offline() {
        let mut agg = aggregator(DelayProbe::new((500, true), (500, true)), FakeStore::new(vec![Some(5)]));
        agg.cycle_deadline = Duration::from_millis(50);

        let started = Instant::now();
        let status = agg.compute().await;
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(!status.auth_online());
        assert!(!status.world_online());
        assert_eq!(status.players_online(), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(17u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
