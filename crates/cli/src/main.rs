use anyhow::{bail, Context, Result};
use blueprint_core::{TriggerStatus, WorkspaceTemplate};
use clap::{Parser, Subcommand};
use orchestrator::{ApplyOptions, CycleOutcome};
use serde_json::{json, Value};
use server::config::{BlueprintConfig, CONFIG_DIR, CONFIG_FILE};
use server::{create_router, state::AppState};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "blueprint")]
#[command(about = "Workspace templates, context resolution and triggers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .blueprint/ with a config file and a sample catalog
    Init,
    /// Run the HTTP API and the trigger scheduler
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Store a template definition from a JSON file
    Import { path: PathBuf },
    /// Apply a template once and print the result
    Apply {
        template_id: String,

        /// Variable value, `name=value`. Values that parse as JSON are used as JSON.
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Context override, `requirement_or_wildcard_type=item_id`
        #[arg(long = "override", value_parser = parse_key_value)]
        overrides: Vec<(String, String)>,

        #[arg(long)]
        name_pattern: Option<String>,
    },
    Status,
    #[command(subcommand)]
    Triggers(TriggerCommands),
}

#[derive(Subcommand)]
enum TriggerCommands {
    List,
    Pause { id: String },
    Resume { id: String },
    Disable { id: String },
    /// Run a single poll cycle and wait for any execution it starts
    Poll { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Some(Commands::Init) => init_project(&cwd).await,
        Some(Commands::Serve { port }) => serve(&cwd, port).await,
        Some(Commands::Import { path }) => import_template(&cwd, &path).await,
        Some(Commands::Apply {
            template_id,
            vars,
            overrides,
            name_pattern,
        }) => apply(&cwd, &template_id, vars, overrides, name_pattern).await,
        Some(Commands::Status) => status(&cwd).await,
        Some(Commands::Triggers(command)) => triggers(&cwd, command).await,
        None => serve(&cwd, None).await,
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn parse_var_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn sample_catalog() -> Value {
    json!([
        {
            "id": "repo_backend",
            "name": "Backend service",
            "item_type": "repository",
            "source": "github",
            "tags": ["backend"]
        },
        {
            "id": "doc_onboarding",
            "name": "Onboarding guide",
            "item_type": "document",
            "source": "confluence",
            "tags": ["docs"]
        }
    ])
}

async fn init_project(cwd: &Path) -> Result<()> {
    let config_path = BlueprintConfig::config_path(cwd);
    if config_path.exists() {
        println!("Project already initialized at {}", config_path.display());
        return Ok(());
    }

    println!("Initializing Blueprint in {}", cwd.display());

    let config = BlueprintConfig::default();
    config
        .write(cwd)
        .await
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let catalog_path = config.catalog_path(cwd);
    if !catalog_path.exists() {
        if let Some(parent) = catalog_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&catalog_path, serde_json::to_string_pretty(&sample_catalog())?).await?;
    }

    db::connect(&config.database_url(cwd))
        .await
        .context("Failed to initialize database")?;

    println!();
    println!("Created:");
    println!("  {}/", CONFIG_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  ├── catalog.json");
    println!("  └── blueprint.db");
    println!();
    println!("Next steps:");
    println!("  1. Import a template with 'blueprint import template.json'");
    println!("  2. Run 'blueprint serve' to start the API");

    Ok(())
}

async fn serve(cwd: &Path, port: Option<u16>) -> Result<()> {
    init_tracing();

    let config = BlueprintConfig::read(cwd).await;
    let port = port.unwrap_or(config.server.port);
    let state = AppState::from_config(&config, cwd).await?;
    let watched = state.start_scheduler().await?;
    let scheduler = state.scheduler.clone();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!();
    println!("Blueprint - {}", cwd.display());
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!("  Triggers:    {} watched", watched);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    Ok(())
}

async fn open_state(cwd: &Path) -> Result<AppState> {
    let config = BlueprintConfig::read(cwd).await;
    AppState::from_config(&config, cwd).await
}

async fn import_template(cwd: &Path, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let template: WorkspaceTemplate = serde_json::from_str(&content)
        .with_context(|| format!("Invalid template in {}", path.display()))?;

    let state = open_state(cwd).await?;
    let templates = state.engine.templates();
    let stored = templates.get(&template.id).await?;
    let replaced = stored.is_some();
    let template = match &stored {
        Some(stored) => template.replacing(stored),
        None => template,
    };
    templates.put(&template).await?;

    if replaced {
        println!("Updated template {} ({})", template.id, template.name);
    } else {
        println!("Imported template {} ({})", template.id, template.name);
    }
    Ok(())
}

async fn apply(
    cwd: &Path,
    template_id: &str,
    vars: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
    name_pattern: Option<String>,
) -> Result<()> {
    let state = open_state(cwd).await?;

    let mut options = ApplyOptions::manual();
    for (name, raw) in vars {
        options = options.with_variable(name, parse_var_value(&raw));
    }
    for (key, item_id) in overrides {
        options = options.with_override(key, item_id);
    }
    options.workspace_name_pattern = name_pattern;

    let result = state.engine.apply(template_id, options).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "Template {} was not applied: {}",
            template_id,
            result.first_error().unwrap_or_default()
        );
    }
    Ok(())
}

async fn status(cwd: &Path) -> Result<()> {
    if !BlueprintConfig::config_path(cwd).exists() {
        println!("Not a Blueprint project.");
        println!("Run 'blueprint init' to initialize.");
        return Ok(());
    }

    let state = open_state(cwd).await?;
    let templates = state.engine.templates().list().await?;
    let triggers = state.engine.triggers().list().await?;

    println!();
    println!("Project: {}", cwd.display());
    println!("Catalog: {} items", state.catalog.len().await);
    println!();

    if templates.is_empty() {
        println!("No templates yet.");
    } else {
        println!("Templates ({}):", templates.len());
        for template in &templates {
            let stats = &template.usage_stats;
            println!(
                "  {} {} - {} uses, {:.0}% success",
                template.id,
                template.name,
                stats.total_uses,
                stats.success_rate() * 100.0
            );
        }
    }

    println!();
    print_triggers(&triggers);
    println!();

    Ok(())
}

fn print_triggers(triggers: &[blueprint_core::WorkspaceTrigger]) {
    if triggers.is_empty() {
        println!("No triggers yet.");
        return;
    }

    println!("Triggers ({}):", triggers.len());
    for trigger in triggers {
        let status_icon = match trigger.status {
            TriggerStatus::Active => "●",
            TriggerStatus::Paused => "◐",
            TriggerStatus::Disabled => "○",
        };
        println!(
            "  {} [{}] {} -> {} ({} runs, {} failed)",
            status_icon,
            trigger.status.as_str(),
            trigger.id,
            trigger.template_id,
            trigger.execution_count,
            trigger.failure_count
        );
    }
}

async fn triggers(cwd: &Path, command: TriggerCommands) -> Result<()> {
    let state = open_state(cwd).await?;

    let (id, status) = match command {
        TriggerCommands::List => {
            let triggers = state.engine.triggers().list().await?;
            print_triggers(&triggers);
            return Ok(());
        }
        TriggerCommands::Poll { id } => return poll_trigger(&state, &id).await,
        TriggerCommands::Pause { id } => (id, TriggerStatus::Paused),
        TriggerCommands::Resume { id } => (id, TriggerStatus::Active),
        TriggerCommands::Disable { id } => (id, TriggerStatus::Disabled),
    };

    let trigger = state.engine.set_trigger_status(&id, status).await?;
    println!("Trigger {} is now {}", trigger.id, trigger.status.as_str());
    Ok(())
}

async fn poll_trigger(state: &AppState, id: &str) -> Result<()> {
    init_tracing();

    let Some(scheduler) = &state.scheduler else {
        bail!("No snapshot source configured; set scheduler.snapshot_base_url in {}", CONFIG_FILE);
    };

    match scheduler.poll_once(id).await? {
        CycleOutcome::Fired(handle) => {
            let result = handle.await.context("Trigger execution panicked")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        CycleOutcome::RateLimited { retry_in } => {
            println!("rate_limited (retry in {}s)", retry_in.as_secs());
        }
        other => println!("{}", other.as_str()),
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "blueprint=info,server=info,orchestrator=info,tower_http=info".into()
            }),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("env=staging").unwrap(),
            ("env".to_string(), "staging".to_string())
        );
        assert_eq!(
            parse_key_value("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_var_values_prefer_json() {
        assert_eq!(parse_var_value("3"), json!(3));
        assert_eq!(parse_var_value("true"), json!(true));
        assert_eq!(parse_var_value("staging"), json!("staging"));
    }

    #[test]
    fn test_cli_parses_apply_arguments() {
        let cli = Cli::try_parse_from([
            "blueprint",
            "apply",
            "tpl_1",
            "--var",
            "env=dev",
            "--override",
            "generic_ticket=PROJ-1",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Apply {
                template_id,
                vars,
                overrides,
                name_pattern,
            }) => {
                assert_eq!(template_id, "tpl_1");
                assert_eq!(vars, vec![("env".to_string(), "dev".to_string())]);
                assert_eq!(overrides[0].1, "PROJ-1");
                assert!(name_pattern.is_none());
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_sample_catalog_is_loadable() {
        let items: Vec<blueprint_core::ContextItem> =
            serde_json::from_value(sample_catalog()).unwrap();
        assert_eq!(items.len(), 2);
        assert!(blueprint_core::WildcardType::GenericRepository.matches(&items[0]));
    }

    #[tokio::test]
    async fn test_reimport_keeps_usage_history() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("template.json");
        let definition = json!({ "id": "tpl_1", "name": "Bugfix", "category": "development" });
        tokio::fs::write(&file, definition.to_string()).await.unwrap();
        import_template(dir.path(), &file).await.unwrap();

        let state = open_state(dir.path()).await.unwrap();
        let templates = state.engine.templates();
        let mut stored = templates.get("tpl_1").await.unwrap().unwrap();
        let at = stored.created_at;
        stored
            .usage_stats
            .record_attempt(blueprint_core::UsageMode::Manual, true, 25, at);
        templates.put(&stored).await.unwrap();

        let definition = json!({ "id": "tpl_1", "name": "Bugfix v2", "category": "development" });
        tokio::fs::write(&file, definition.to_string()).await.unwrap();
        import_template(dir.path(), &file).await.unwrap();

        let reimported = templates.get("tpl_1").await.unwrap().unwrap();
        assert_eq!(reimported.name, "Bugfix v2");
        assert_eq!(reimported.usage_stats.total_uses, 1);
        assert_eq!(reimported.created_at, stored.created_at);
        assert!(reimported.updated_at >= stored.updated_at);
    }
}
