use crate::{
    commands::{CallerArgs, Commands},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use connectors::store::StoreRegistry;
use engine_config::settings::EngineSettings;
use engine_core::{
    engine::{self, Engine},
    permissions::{
        Accountability, AllowAll, Authorizer, PermissionContext, PolicyAuthorizer,
        level_collections, resolve_access,
    },
};
use model::query::request::QueryRequest;
use planner::{compile::fields::ObjectMapping, query::dialect::DialectKind};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "nestql", version = "0.1.0", about = "Nested relational query engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Serialize)]
struct PlanOutput {
    sql: String,
    parameters: Vec<JsonValue>,
    fingerprint: String,
    mapping: ObjectMapping,
    /// Keys of the fields fetched by separate batched queries.
    deferred: Vec<String>,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout carries only JSON
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => ExitCode::ShutdownRequested,
        Err(err) => {
            error!("{err}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Plan {
            request,
            dialect,
            caller,
        } => {
            let request = load_request(&request).await?;
            let kind: DialectKind = dialect
                .parse()
                .map_err(|_| CliError::UnknownDialect(dialect.clone()))?;
            let settings = EngineSettings::load(None)?;

            let (authorizer, permissions) = authorization(&caller)?;
            let target = request.target();
            let access = resolve_access(
                authorizer.as_ref(),
                &permissions,
                &level_collections(&target, &request.fields, request.query.filter.as_ref()),
            )
            .await?;

            let query = engine::plan(&request, &access, &settings)?;
            let (sql, parameters) = query.render(kind.dialect());
            let plan = PlanOutput {
                sql,
                parameters: parameters.iter().map(|p| p.to_json()).collect(),
                fingerprint: query.fingerprint(),
                mapping: query.mapping.clone(),
                deferred: query.sub_queries.iter().map(|s| s.key.clone()).collect(),
            };
            output::write_json(&plan, None).await
        }
        Commands::Query {
            request,
            url,
            fixture,
            store,
            config,
            mapping,
            output,
            caller,
        } => {
            let request = load_request(&request).await?;
            let settings = EngineSettings::load(config.as_deref().map(Path::new))?;
            let source = match (url, fixture) {
                (Some(url), _) => conn::open_url(&url).await?,
                (None, Some(fixture)) => conn::open_fixture(&fixture)?,
                (None, None) => return Err(CliError::MissingSource),
            };
            let (authorizer, permissions) = authorization(&caller)?;
            let engine = Engine::new(StoreRegistry::new().with(store, source), authorizer, settings);

            let shutdown = ShutdownCoordinator::new(CancellationToken::new());
            shutdown.register_handlers();
            let cancel = shutdown.cancel_token();

            let result = engine.execute(&request, &permissions, &cancel).await;
            if shutdown.is_shutdown_requested() {
                info!("Query cancelled by signal");
                return Err(CliError::ShutdownRequested);
            }
            cancel.cancel();
            let result = result?;

            if mapping {
                output::write_json(&result, output.as_deref()).await
            } else {
                output::write_json(&result.data, output.as_deref()).await
            }
        }
    }
}

async fn load_request(path: &str) -> Result<QueryRequest, CliError> {
    let source = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&source)?)
}

fn authorization(caller: &CallerArgs) -> Result<(Arc<dyn Authorizer>, PermissionContext), CliError> {
    let Some(policy) = &caller.policy else {
        return Ok((Arc::new(AllowAll), PermissionContext::new(Accountability::admin())));
    };
    let authorizer = PolicyAuthorizer::from_path(Path::new(policy))?;
    let accountability = Accountability {
        user: caller.user.clone(),
        role: caller.role.clone(),
        admin: false,
    };
    Ok((Arc::new(authorizer), PermissionContext::new(accountability)))
}
