mod cli;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use config::load_config;
use cortex_common::Operator;
use cortex_controllers::{
    DatasourceController, DecisionCleanup, DecisionController, DeschedulingExecutor, DeschedulingRunner, DeschedulingTtlCleanup,
    InProcessReservationScheduler, KpiWatcher, PendingRequests, PipelineManager, PipelineWatcher, ReservationController, StoreDependencySource,
    StoreMigrationHistory, StoreReservationLookup, StoreSecretResolver, UnconfiguredOpenStack,
};
use cortex_knowledge::kpi::KpiPluginRegistry;
use cortex_knowledge::syncer::NovaHypervisorSyncer;
use cortex_knowledge::{KpiOrchestrator, PgDbResolver};
use cortex_server::{AppState, MqttPublisher};
use cortex_steps::registry::{register_builtin_descheduling_steps, register_builtin_steps, DeschedulingStepRegistry, Registry as StepRegistry};
use cortex_store::StoreClient;
use log::{error, info, warn};

const DECISION_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DESCHEDULING_TTL_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Start { config } => run(config.to_str().unwrap()).await,
    }
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;
    let operator = Operator(cfg.operator.clone());

    info!("cortex starting, operator={}", cfg.operator);

    let store = Arc::new(StoreClient::connect(&cfg.store.endpoints).await.context("connecting to record store")?);
    let secrets = Arc::new(StoreSecretResolver::new(store.clone()));

    let step_registry = Arc::new(StepRegistry::new());
    register_builtin_steps(&step_registry).await;

    let descheduling_step_registry = Arc::new(DeschedulingStepRegistry::new());
    register_builtin_descheduling_steps(&descheduling_step_registry).await;

    // Overrides the builtin `filter_has_enough_capacity` constructor
    // (which defaults to `NoReservationLookup`) with one backed by the
    // live Reservation records, so Active reservations are actually
    // subtracted from available capacity (spec §3 "Reservation").
    let reservation_lookup = Arc::new(StoreReservationLookup::new(store.clone()));
    step_registry
        .register(
            "filter_has_enough_capacity",
            Arc::new({
                let reservation_lookup = reservation_lookup.clone();
                move || Arc::new(cortex_steps::capacity::FilterHasEnoughCapacity::new().with_reservations(reservation_lookup.clone())) as Arc<dyn cortex_pipeline::Step>
            }),
        )
        .await;

    let db_resolver = Arc::new(PgDbResolver::new(secrets.clone()));
    let manager = Arc::new(PipelineManager::new(step_registry, descheduling_step_registry, db_resolver.clone()));
    let pipeline_watcher = PipelineWatcher::new(store.clone(), manager.clone(), operator.clone());
    tokio::spawn(async move {
        if let Err(e) = pipeline_watcher.run().await {
            error!("pipeline watcher exited: {e}");
        }
    });

    let openstack = Arc::new(UnconfiguredOpenStack);

    // Decision controller + HTTP surface.
    let pending = Arc::new(PendingRequests::new());
    let decisions = Arc::new(DecisionController::new(store.clone(), manager.clone(), pending, operator.clone()));
    {
        let decisions = decisions.clone();
        tokio::spawn(async move {
            if let Err(e) = decisions.run().await {
                error!("decision controller exited: {e}");
            }
        });
    }

    let decision_cleanup = DecisionCleanup::new(store.clone(), operator.clone(), openstack.clone());
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(DECISION_CLEANUP_INTERVAL).await;
            match decision_cleanup.sweep().await {
                Ok(n) if n > 0 => info!("decision cleanup: deleted {n} stale decisions"),
                Ok(_) => {}
                Err(e) => warn!("decision cleanup sweep failed: {e}"),
            }
        }
    });

    // Reservation controller.
    let scheduler = Arc::new(InProcessReservationScheduler::new(manager.clone()));
    let reservations = ReservationController::new(store.clone(), openstack.clone(), scheduler, operator.clone());
    tokio::spawn(async move {
        if let Err(e) = reservations.run().await {
            error!("reservation controller exited: {e}");
        }
    });

    // Descheduling.
    let history = Arc::new(StoreMigrationHistory::new(store.clone()));
    let descheduling_runner = DeschedulingRunner::new(store.clone(), manager.clone(), history, operator.clone(), cfg.descheduling.pipeline.clone());
    tokio::spawn(async move {
        descheduling_runner.run_forever().await;
    });

    let descheduling_executor = DeschedulingExecutor::new(store.clone(), openstack.clone(), openstack.clone(), operator.clone(), cfg.descheduling.dry_run);
    tokio::spawn(async move {
        if let Err(e) = descheduling_executor.run().await {
            error!("descheduling executor exited: {e}");
        }
    });

    let descheduling_ttl = DeschedulingTtlCleanup::new(store.clone(), operator.clone());
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(DESCHEDULING_TTL_SWEEP_INTERVAL).await;
            match descheduling_ttl.sweep().await {
                Ok(n) if n > 0 => info!("descheduling TTL cleanup: deleted {n} expired records"),
                Ok(_) => {}
                Err(e) => warn!("descheduling TTL sweep failed: {e}"),
            }
        }
    });

    // Knowledge plane: Datasource sync + KPI orchestration.
    let knowledge_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&cfg.knowledge_db_dsn)
        .await
        .context("connecting to knowledge database")?;

    let mut syncer_registry = cortex_knowledge::datasource::SyncerRegistry::new();
    syncer_registry.register(
        "nova_hypervisors",
        Arc::new({
            let openstack = openstack.clone();
            move |_auth: String, _options: serde_json::Value| -> Result<Arc<dyn cortex_knowledge::syncer::Syncer>, cortex_common::CortexError> {
                Ok(Arc::new(NovaHypervisorSyncer::new(openstack.clone())))
            }
        }),
    );
    let syncer_registry = Arc::new(syncer_registry);

    let datasource_controller = DatasourceController::new(store.clone(), knowledge_pool, secrets, syncer_registry, operator.clone());
    tokio::spawn(async move {
        if let Err(e) = datasource_controller.run().await {
            error!("datasource controller exited: {e}");
        }
    });

    let kpi_plugins = Arc::new(KpiPluginRegistry::new());
    let kpi_orchestrator = Arc::new(KpiOrchestrator::new(kpi_plugins, db_resolver.clone()));
    let kpi_source = Arc::new(StoreDependencySource::new(store.clone()));
    let kpi_watcher = KpiWatcher::new(store.clone(), kpi_orchestrator, kpi_source, operator.clone());
    tokio::spawn(async move {
        if let Err(e) = kpi_watcher.run().await {
            error!("kpi watcher exited: {e}");
        }
    });

    // External HTTP surface + best-effort MQTT fan-out.
    let mqtt = match &cfg.mqtt_broker {
        Some(broker) => match MqttPublisher::connect(broker, "cortex") {
            Ok(publisher) => Some(Arc::new(publisher)),
            Err(e) => {
                warn!("mqtt broker configured but connect failed, disabling fan-out: {e}");
                None
            }
        },
        None => None,
    };
    let state = AppState::new(decisions, mqtt);
    let addr: SocketAddr = cfg.addr.parse().context("parsing listen address")?;
    cortex_server::serve(addr, state).await
}
