use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use playframe_config::{ConfigLoader, PlayConfig, WarningSeverity};
use playframe_core::PlayError;
use playframe_runtime::{RegistryBuilder, RequestSettings, SceneManager, build_clients, build_registry};

mod chat;
mod run;

/// PlayFrame: scene orchestration for LLM tool calling
#[derive(Parser)]
#[command(name = "playframe", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to playframe.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one request and stream its events
    Run {
        /// The user message
        message: String,

        #[command(flatten)]
        request: RequestArgs,

        /// Print every event as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Interactive chat; every turn resumes the same conversation
    Chat {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// List registered scenes and their functions
    Scenes,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and check model clients
    Doctor,
}

/// Per-request options shared by `run` and `chat`.
#[derive(Args, Clone, Default)]
struct RequestArgs {
    /// Conversation key to resume
    #[arg(short, long)]
    key: Option<String>,

    /// Neither read nor write the conversation store
    #[arg(long)]
    no_cache: bool,

    /// Scene the model may not enter (repeatable)
    #[arg(long = "avoid", value_name = "SCENE")]
    avoid: Vec<String>,

    /// Context property handed to actors, as KEY=VALUE (repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    context: Vec<(String, String)>,

    /// Bearer token forwarded to HTTP functions
    #[arg(long, env = "PLAYFRAME_BEARER_TOKEN", hide_env_values = true)]
    bearer: Option<String>,
}

impl RequestArgs {
    fn settings(&self) -> RequestSettings {
        let mut settings = RequestSettings {
            key: self.key.clone(),
            bypass_cache: self.no_cache,
            avoid_scenes: self.avoid.iter().cloned().collect(),
            bearer_token: self.bearer.clone(),
            ..Default::default()
        };
        for (name, value) in &self.context {
            // JSON when it parses, plain text otherwise.
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            settings.properties.insert(name.clone(), value);
        }
        settings
    }
}

/// Parse "key=value" CLI arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Build the manager described by `config`.
fn manager(config: &PlayConfig) -> playframe_core::Result<SceneManager> {
    let clients = Arc::new(build_clients(config)?);
    let registry = Arc::new(build_registry(config, RegistryBuilder::new())?);
    Ok(SceneManager::from_config(config, registry, clients))
}

impl Cli {
    pub async fn run(self) -> playframe_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(config.logging.level.as_str())
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }

        match self.command {
            Commands::Run {
                message,
                request,
                json,
            } => run::cmd_run(&config, message, request.settings(), json).await,
            Commands::Chat { request } => chat::cmd_chat(&config, request.settings()).await,
            Commands::Scenes => Self::cmd_scenes(&config),
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Doctor => Self::cmd_doctor(&config).await,
        }
    }

    fn cmd_scenes(config: &PlayConfig) -> playframe_core::Result<()> {
        let registry = build_registry(config, RegistryBuilder::new())?;
        if registry.is_empty() {
            println!("No scenes configured. Add [[scenes]] to playframe.toml.");
            return Ok(());
        }
        for scene in registry.scenes() {
            println!("🎬 {} ({})", scene.name(), scene.trigger_name());
            if !scene.description().is_empty() {
                println!("   {}", scene.description());
            }
            if let Some(client) = scene.client() {
                println!("   model client: {client}");
            }
            for function in registry.functions_of(scene.name()) {
                let kind = if function.is_http() { "http" } else { "service" };
                println!("   • {} [{kind}] {}", function.name(), function.description());
            }
        }
        Ok(())
    }

    fn cmd_config(config: &PlayConfig, json: bool) -> playframe_core::Result<()> {
        let rendered = if json {
            serde_json::to_string_pretty(config)?
        } else {
            toml::to_string_pretty(config).map_err(|e| PlayError::Config(e.to_string()))?
        };
        println!("{rendered}");
        Ok(())
    }

    async fn cmd_doctor(config: &PlayConfig) -> playframe_core::Result<()> {
        println!("🩺 PlayFrame Doctor: configuration audit");
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        match build_registry(config, RegistryBuilder::new()) {
            Ok(registry) => println!(
                "  ✅ {} scenes, {} functions registered",
                registry.len(),
                registry.function_count()
            ),
            Err(e) => {
                println!("  ❌ scene registry: {e}");
                warn_count += 1;
            }
        }

        match build_clients(config) {
            Ok(clients) => {
                for (alias, result) in clients.health_check().await {
                    match result {
                        Ok(()) => println!("  ✅ model client '{alias}' reachable"),
                        Err(e) => {
                            println!("  ❌ model client '{alias}': {e}");
                            warn_count += 1;
                        }
                    }
                }
            }
            Err(e) => {
                println!("  ❌ model clients: {e}");
                warn_count += 1;
            }
        }

        println!();
        println!("  ⚠️  {warn_count} problems, 💡 {info_count} suggestions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("tenant=acme").unwrap(),
            ("tenant".to_string(), "acme".to_string())
        );
        assert_eq!(
            parse_key_val("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "playframe",
            "run",
            "weather in Rome?",
            "--key",
            "conv-1",
            "--avoid",
            "Travel",
            "--context",
            "tenant=acme",
            "--context",
            "limit=3",
            "--no-cache",
        ])
        .unwrap();

        let Commands::Run { message, request, json } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(message, "weather in Rome?");
        assert!(!json);

        let settings = request.settings();
        assert_eq!(settings.key.as_deref(), Some("conv-1"));
        assert!(settings.bypass_cache);
        assert!(settings.is_avoided("Travel"));
        assert_eq!(settings.properties["tenant"], serde_json::json!("acme"));
        assert_eq!(settings.properties["limit"], serde_json::json!(3));
    }
}
