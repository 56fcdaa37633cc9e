use anyhow::Context;
use clap::Parser;
use roi_planner::adapters::cache::InMemoryCache;
use roi_planner::adapters::metrics::TracingMetricsSink;
use roi_planner::adapters::store::{load_projects_csv, InMemoryCatalogStore};
use roi_planner::config::CliArgs;
use roi_planner::utils::error::ErrorSeverity;
use roi_planner::utils::{logger, validation::Validate};
use roi_planner::{
    EventConsumer, OptimizationRequestEvent, PlannerConfig, ResilientCatalogReader,
    SelectionEngine,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => PlannerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PlannerConfig::default(),
    };

    logger::init_logger(args.json_logs || config.json_logs(), args.verbose);

    tracing::info!("Starting roi-planner");
    if args.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let reader = Arc::new(ResilientCatalogReader::new(
        Arc::new(InMemoryCatalogStore::new()),
        Arc::new(InMemoryCache::new()),
        config.catalog_reader_config(),
        config.circuit_breaker_config(),
    ));

    let projects = load_projects_csv(&args.projects)
        .with_context(|| format!("reading projects from {}", args.projects.display()))?;
    tracing::info!("📥 Loaded {} projects from {}", projects.len(), args.projects.display());
    for batch in projects.chunks(config.catalog.max_batch_size) {
        reader.save_all(batch.to_vec()).await?;
    }

    let consumer = EventConsumer::new(
        reader,
        SelectionEngine::new(),
        Arc::new(TracingMetricsSink),
        config.retry_policy(),
    );

    let outcome = match OptimizationRequestEvent::new(args.max_selections, args.initial_capital) {
        Ok(event) => consumer.execute(&event, 0).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            println!("✅ Final capital: {}", result.final_capital);
            for project in &result.selected_projects {
                println!(
                    "   {} (requires {}, profit {})",
                    project.name, project.required_capital, project.profit
                );
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Optimization failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
