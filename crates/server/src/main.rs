//! ConvergeAI server entry point

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use converge_agent::{
    BookingAgent, CancellationAgent, ComplaintAgent, Coordinator, CoordinatorConfig,
    DialogStateManager, EntityExtractor, EntityValidator, IntentClassifier, QuestionGenerator,
    ReviewService, SlotFillingGraph, TaskAgent,
};
use converge_config::{
    load_settings, CachedOpsConfig, CatalogConfig, EntityRulesConfig, Settings, StaticOpsConfig,
};
use converge_llm::{GeminiBackend, GeminiConfig, LlmBackend};
use converge_nlu::{EntityPatternExtractor, PatternIntentMatcher};
use converge_persistence::PersistenceLayer;
use converge_rag::{InMemoryIndex, QdrantIndex, QdrantIndexConfig, PolicyAgent, PolicyAgentConfig, VectorIndex};
use converge_server::{create_router, init_metrics, AppState, UnconfiguredLlm};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml
    let env = std::env::var("CONVERGE_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!("Starting ConvergeAI core v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?settings.environment,
        config = env.as_deref().unwrap_or("default"),
        "configuration loaded"
    );

    let _metrics_handle = init_metrics();
    tracing::info!("Prometheus metrics at /metrics");

    // Domain configuration: catalog and entity rules with built-in
    // defaults when the files are absent
    let catalog = Arc::new(load_catalog(&settings.catalog_path));
    let rules = Arc::new(load_entity_rules(&settings.entities_path));
    tracing::info!(
        intents = catalog.intents.len(),
        service_types = rules.service_types.len(),
        "domain configuration loaded"
    );

    // Persistence: ScyllaDB when enabled, in-memory otherwise
    let persistence = if settings.persistence.enabled {
        let config = converge_persistence::ScyllaConfig {
            hosts: settings.persistence.scylla_hosts.clone(),
            keyspace: settings.persistence.keyspace.clone(),
            replication_factor: settings.persistence.replication_factor,
        };
        match converge_persistence::init(config).await {
            Ok(layer) => {
                tracing::info!(
                    hosts = ?settings.persistence.scylla_hosts,
                    keyspace = %settings.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                layer
            }
            Err(e) => {
                tracing::error!(error = %e, "ScyllaDB unavailable, falling back to in-memory");
                converge_persistence::in_memory()
            }
        }
    } else {
        tracing::info!("persistence disabled, using in-memory stores");
        converge_persistence::in_memory()
    };

    // LLM backend
    let llm: Arc<dyn LlmBackend> = match settings.llm.api_key.clone() {
        Some(api_key) => {
            let config = GeminiConfig::new(api_key)
                .with_model(settings.llm.model.clone())
                .with_endpoint(settings.llm.endpoint.clone());
            match GeminiBackend::new(config) {
                Ok(backend) => {
                    tracing::info!(model = %settings.llm.model, "Gemini backend ready");
                    Arc::new(backend)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Gemini init failed, running on fallbacks only");
                    Arc::new(UnconfiguredLlm)
                }
            }
        }
        None => {
            tracing::warn!("no LLM api key configured, running on deterministic fallbacks");
            Arc::new(UnconfiguredLlm)
        }
    };

    // Vector index for the policy agent
    let index: Arc<dyn VectorIndex> = if settings.rag.enabled {
        let config = QdrantIndexConfig {
            endpoint: settings.rag.qdrant_endpoint.clone(),
            collection: settings.rag.qdrant_collection.clone(),
            vector_dim: settings.rag.vector_dim,
            api_key: settings.rag.qdrant_api_key.clone(),
        };
        match init_vector_index(config).await {
            Ok(index) => {
                tracing::info!(
                    endpoint = %settings.rag.qdrant_endpoint,
                    collection = %settings.rag.qdrant_collection,
                    "vector index ready"
                );
                index
            }
            Err(e) => {
                tracing::warn!(error = %e, "vector index unavailable, policy answers will refuse");
                Arc::new(InMemoryIndex::new())
            }
        }
    } else {
        tracing::info!("RAG disabled, using empty in-memory index");
        Arc::new(InMemoryIndex::new())
    };

    let state = build_state(&settings, catalog, rules, persistence, llm, index);

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wire the coordinator and its collaborators.
fn build_state(
    settings: &Settings,
    catalog: Arc<CatalogConfig>,
    rules: Arc<EntityRulesConfig>,
    persistence: PersistenceLayer,
    llm: Arc<dyn LlmBackend>,
    index: Arc<dyn VectorIndex>,
) -> AppState {
    let matcher = Arc::new(PatternIntentMatcher::from_catalog(&catalog));
    let entity_patterns = Arc::new(EntityPatternExtractor::new((*rules).clone()));

    let dialog = Arc::new(DialogStateManager::new(
        persistence.dialog_states.clone(),
        catalog.clone(),
        settings.dialog.clone(),
    ));
    let classifier = Arc::new(IntentClassifier::new(
        matcher.clone(),
        entity_patterns.clone(),
        llm.clone(),
        catalog.clone(),
        settings.llm.clone(),
        settings.dialog.clone(),
    ));
    let extractor = Arc::new(EntityExtractor::new(
        entity_patterns.clone(),
        llm.clone(),
        settings.llm.clone(),
    ));
    let validator = Arc::new(
        EntityValidator::new(rules.clone()).with_booking_store(persistence.bookings.clone()),
    );
    let questions = Arc::new(QuestionGenerator::new(
        llm.clone(),
        rules.clone(),
        settings.llm.clone(),
    ));

    let graph = SlotFillingGraph::new(
        classifier,
        extractor,
        validator,
        questions,
        dialog,
        matcher,
        entity_patterns,
        catalog.clone(),
        settings.dialog.clone(),
    );

    let policy = Arc::new(PolicyAgent::new(
        index,
        llm.clone(),
        PolicyAgentConfig {
            top_k: settings.rag.top_k,
            score_floor: settings.rag.score_floor,
            publish_threshold: settings.rag.grounding_publish_threshold,
            hedge_threshold: settings.rag.grounding_hedge_threshold,
            temperature: settings.llm.classification_temperature,
            max_tokens: 1024,
            search_timeout: std::time::Duration::from_millis(settings.rag.search_timeout_ms),
            generation_timeout: std::time::Duration::from_millis(
                settings.llm.generation_timeout_ms,
            ),
        },
    ));

    let review = Arc::new(ReviewService::new(
        persistence.review_queue.clone(),
        persistence.complaints.clone(),
        persistence.audit.clone(),
        settings.review.clone(),
    ));

    let ops = Arc::new(CachedOpsConfig::new(Arc::new(StaticOpsConfig::new())));
    let task_agents: Vec<Arc<dyn TaskAgent>> = vec![
        Arc::new(BookingAgent::new(persistence.bookings.clone(), rules.clone())),
        Arc::new(ComplaintAgent::new(
            persistence.complaints.clone(),
            rules.clone(),
            settings.sla.clone(),
            ops,
        )),
        Arc::new(CancellationAgent::new(
            persistence.bookings.clone(),
            settings.sla.clone(),
        )),
    ];

    let coordinator = Arc::new(Coordinator::new(
        graph,
        persistence.turns.clone(),
        review.clone(),
        task_agents,
        policy,
        llm,
        catalog,
        CoordinatorConfig {
            dialog: settings.dialog.clone(),
            llm: settings.llm.clone(),
            ..CoordinatorConfig::default()
        },
    ));

    AppState::new(
        coordinator,
        review,
        persistence.turns,
        Arc::new(settings.clone()),
    )
}

async fn init_vector_index(
    config: QdrantIndexConfig,
) -> Result<Arc<dyn VectorIndex>, converge_rag::RagError> {
    let index = QdrantIndex::new(config).await?;
    index.ensure_collection().await?;
    Ok(Arc::new(index))
}

fn load_catalog(path: &str) -> CatalogConfig {
    if Path::new(path).exists() {
        match CatalogConfig::load(path) {
            Ok(catalog) => {
                tracing::info!(path, "intent catalog loaded");
                return catalog;
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to load catalog, using defaults");
            }
        }
    }
    CatalogConfig::default()
}

fn load_entity_rules(path: &str) -> EntityRulesConfig {
    if Path::new(path).exists() {
        match EntityRulesConfig::load(path) {
            Ok(rules) => {
                tracing::info!(path, "entity rules loaded");
                return rules;
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to load entity rules, using defaults");
            }
        }
    }
    EntityRulesConfig::default()
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("converge={},tower_http=info", settings.observability.log_level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
