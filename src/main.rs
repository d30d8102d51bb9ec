use std::{process, sync::Arc};

use productguard::{
    application::error::AppError,
    cache::{CacheGuard, ChangeEvent, apply_change, apply_deletion, evict},
    config,
    domain::Product,
    infra::{db::PostgresRepositories, error::InfraError, redis::RedisKeyValueStore, telemetry},
};
use tokio::task::JoinSet;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) =
        config::load_with_cli().map_err(|err| InfraError::configuration(err.to_string()))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Get(args) => run_get(&settings, args).await,
        config::Command::Refresh(args) => run_refresh(&settings, args.id).await,
        config::Command::Delete(args) => run_delete(&settings, args.id).await,
        config::Command::Apply(args) => run_apply(&settings, &args.event).await,
        config::Command::Migrate => run_migrate(&settings).await,
    }
}

async fn run_get(settings: &config::Settings, args: config::GetArgs) -> Result<(), AppError> {
    let cache = Arc::new(init_cache(settings)?);
    let records = Arc::new(init_records(settings)?);
    let guard_config = Arc::new(settings.guard_config());

    if args.concurrency == 1 {
        let guard = CacheGuard::new(args.id, cache.as_ref(), records.as_ref(), &guard_config);
        let blob = guard.get().await?;
        println!("{blob}");
        return Ok(());
    }

    let mut lookups = JoinSet::new();
    for _ in 0..args.concurrency {
        let cache = Arc::clone(&cache);
        let records = Arc::clone(&records);
        let guard_config = Arc::clone(&guard_config);
        let id = args.id;
        lookups.spawn(async move {
            CacheGuard::new(id, cache.as_ref(), records.as_ref(), &guard_config)
                .get()
                .await
        });
    }

    let mut blob = None;
    let mut first_error = None;
    let mut succeeded = 0_u32;
    while let Some(joined) = lookups.join_next().await {
        let outcome = joined
            .map_err(|err| AppError::unexpected(format!("lookup task failed: {err}")))?;
        match outcome {
            Ok(value) => {
                succeeded += 1;
                blob.get_or_insert(value);
            }
            Err(err) => {
                warn!(error = %err, "Concurrent lookup failed");
                first_error.get_or_insert(err);
            }
        }
    }

    info!(
        id = args.id,
        concurrency = args.concurrency,
        succeeded,
        "Concurrent lookups complete"
    );
    match (blob, first_error) {
        (Some(blob), _) => {
            println!("{blob}");
            Ok(())
        }
        (None, Some(err)) => Err(err.into()),
        (None, None) => Ok(()),
    }
}

async fn run_refresh(settings: &config::Settings, id: i64) -> Result<(), AppError> {
    let cache = init_cache(settings)?;
    let records = init_records(settings)?;
    let guard_config = settings.guard_config();

    CacheGuard::new(id, &cache, &records, &guard_config)
        .refresh()
        .await?;
    info!(id, "Cache entry refreshed");
    Ok(())
}

async fn run_delete(settings: &config::Settings, id: i64) -> Result<(), AppError> {
    let cache = init_cache(settings)?;
    let guard_config = settings.guard_config();

    let removed = evict::<Product, _>(id, &cache, &guard_config).await?;
    info!(id, removed, "Cache entry deleted");
    Ok(())
}

async fn run_apply(settings: &config::Settings, raw_event: &str) -> Result<(), AppError> {
    let event: ChangeEvent = serde_json::from_str(raw_event)
        .map_err(|err| AppError::validation(format!("invalid change event: {err}")))?;

    let cache = init_cache(settings)?;
    let guard_config = settings.guard_config();

    match &event {
        ChangeEvent::Deleted { id } => {
            apply_deletion::<Product, _>(*id, &cache, &guard_config).await;
        }
        ChangeEvent::Upserted { .. } => {
            let records = init_records(settings)?;
            apply_change(&event, &cache, &records, &guard_config).await?;
        }
    }
    Ok(())
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let url = database_url(settings)?;
    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    info!("Database migrations applied");
    Ok(())
}

fn init_cache(settings: &config::Settings) -> Result<RedisKeyValueStore, AppError> {
    RedisKeyValueStore::connect(&settings.redis.url, settings.redis.max_connections.get())
        .map_err(AppError::from)
}

/// Lazy pool: commands answered from the cache never dial the database, and
/// an outage surfaces as `StoreUnavailable` from the lookup that needed it.
fn init_records(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let url = database_url(settings)?;
    let pool = PostgresRepositories::connect_lazy(
        url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .map_err(|err| InfraError::database(err.to_string()))?;
    Ok(PostgresRepositories::new(pool))
}

fn database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings.database.url.as_deref().ok_or_else(|| {
        AppError::validation(
            "database.url is required (set PRODUCTGUARD__DATABASE__URL or pass --database-url)",
        )
    })
}
