//! Order service runtime.
//!
//! Wires the order aggregate, the order sagas and the saga engine to a
//! record store and a message transport, runs the participant and reply
//! loops, and serves operator endpoints with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use domain::{InMemoryRestaurantRepository, OrderObserver, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use ordering::{OrderCommandHandler, OrderSagaService, OrderSagas, channels};
use saga::{InMemoryTransport, RecordSagaInstanceStore, SagaObserver, SagaOrchestrator};
use store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;

pub type Store = Arc<dyn RecordStore>;
pub type Restaurants = InMemoryRestaurantRepository;
pub type Orders = OrderService<Store, Restaurants>;
pub type Instances = RecordSagaInstanceStore<Store>;
pub type Orchestrator = SagaOrchestrator<Instances, InMemoryTransport>;
pub type Sagas = OrderSagaService<Store, Restaurants, Instances, InMemoryTransport>;
pub type Participant = OrderCommandHandler<Store, Restaurants, InMemoryTransport>;

/// Shared runtime state.
pub struct AppState {
    pub orders: Arc<Orders>,
    pub orchestrator: Arc<Orchestrator>,
    pub sagas: Arc<Sagas>,
    pub transport: InMemoryTransport,

    /// `"postgres"` or `"memory"`, reported by `/health`.
    pub storage: &'static str,
}

/// Observers injected into the order service and the saga engine.
pub struct Observers {
    pub orders: Arc<dyn OrderObserver>,
    pub sagas: Arc<dyn SagaObserver>,
}

impl Default for Observers {
    fn default() -> Self {
        Self {
            orders: Arc::new(domain::NoopOrderObserver),
            sagas: Arc::new(saga::NoopObserver),
        }
    }
}

impl Observers {
    /// Observers that record Prometheus counters and histograms.
    pub fn metrics() -> Self {
        Self {
            orders: Arc::new(domain::MetricsOrderObserver),
            sagas: Arc::new(saga::MetricsObserver),
        }
    }
}

/// Builds the order service and the saga orchestrator over one store.
///
/// Orders and saga instances share the store so an order and the saga
/// driving it are persisted the same way.
pub fn build_state(
    store: Store,
    storage: &'static str,
    config: &Config,
    observers: Observers,
) -> Result<Arc<AppState>, StartupError> {
    build_state_with_transport(store, storage, config, observers, InMemoryTransport::new())
}

/// Same as `build_state` over a given transport, e.g. a recording one.
pub fn build_state_with_transport(
    store: Store,
    storage: &'static str,
    config: &Config,
    observers: Observers,
    transport: InMemoryTransport,
) -> Result<Arc<AppState>, StartupError> {
    let orders = Arc::new(
        OrderService::new(store.clone(), InMemoryRestaurantRepository::new())
            .with_limits(config.order_limits)
            .with_observer(observers.orders),
    );

    let definitions = OrderSagas::new()?;
    let mut orchestrator = SagaOrchestrator::new(
        RecordSagaInstanceStore::new(store),
        transport.clone(),
        channels::ORDER_SAGA_REPLIES,
        config.saga,
    )
    .with_observer(observers.sagas);
    definitions.register(&mut orchestrator);
    let orchestrator = Arc::new(orchestrator);

    let sagas = Arc::new(OrderSagaService::new(
        orders.clone(),
        orchestrator.clone(),
        definitions,
    ));

    Ok(Arc::new(AppState {
        orders,
        orchestrator,
        sagas,
        transport,
        storage,
    }))
}

/// Creates the Axum router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/sagas", get(routes::sagas::list))
        .route("/sagas/{id}", get(routes::sagas::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
