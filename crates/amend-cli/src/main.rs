//! `amend` operator binary.
//!
//! Reads `amend.toml` (or the path given with `--config`) plus `AMEND_*`
//! environment overrides, opens the SQLite store and runs one engine
//! operation. Results are printed to stdout as JSON.
//!
//! ```text
//! amend record --tenant <uuid> --entity-type expense --entity-id e-1 \
//!   --field category --value "Meals" --context '{"merchant":"Starbucks"}'
//! amend suggest --tenant <uuid> --entity-type expense --data '{"merchant":"Starbucks"}'
//! amend prune --tenant <uuid> --min-accuracy 0.6 --every 3600
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use amend_core::{
  Learner, LearningConfig,
  correction::{CorrectionRequest, EntityData, EntityType},
  pattern::PatternType,
  store::PatternQuery,
};
use amend_store_sqlite::SqliteStore;
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `amend.toml` and the environment.
#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  #[serde(default)]
  learning:   LearningConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("amend.db") }

// ─── Arguments ───────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Amend correction-learning engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "amend.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Record one correction and mine it into patterns.
  Record {
    #[arg(long, env = "AMEND_TENANT")]
    tenant:      Uuid,
    #[arg(long)]
    entity_type: String,
    #[arg(long)]
    entity_id:   String,
    /// category, subcategory, tax_deductible or merchant.
    #[arg(long)]
    field:       String,
    #[arg(long)]
    original:    Option<String>,
    #[arg(long)]
    value:       String,
    #[arg(long, default_value = "cli")]
    actor:       String,
    /// Entity attributes as a JSON object.
    #[arg(long, default_value = "{}")]
    context:     String,
  },

  /// Count initial classifications toward the correction rate.
  Classify {
    #[arg(long, env = "AMEND_TENANT")]
    tenant:      Uuid,
    #[arg(long)]
    entity_type: String,
    #[arg(long, default_value_t = 1)]
    count:       u32,
  },

  /// Suggest adjustments for an entity.
  Suggest {
    #[arg(long, env = "AMEND_TENANT")]
    tenant:      Uuid,
    #[arg(long)]
    entity_type: String,
    /// Entity attributes as a JSON object.
    #[arg(long)]
    data:        String,
  },

  /// Print the accuracy report for a tenant.
  Stats {
    #[arg(long, env = "AMEND_TENANT")]
    tenant: Uuid,
  },

  /// Deactivate patterns whose accuracy fell below a floor.
  Prune {
    #[arg(long, env = "AMEND_TENANT")]
    tenant:       Uuid,
    /// Defaults to `learning.prune_min_accuracy`.
    #[arg(long)]
    min_accuracy: Option<f64>,
    /// Repeat the sweep every N seconds until interrupted.
    #[arg(long)]
    every:        Option<u64>,
  },

  /// Bring a pruned pattern back.
  Reactivate {
    #[arg(long, env = "AMEND_TENANT")]
    tenant:  Uuid,
    #[arg(long)]
    pattern: Uuid,
  },

  /// List stored patterns.
  Patterns {
    #[arg(long, env = "AMEND_TENANT")]
    tenant:       Uuid,
    #[arg(long)]
    entity_type:  Option<String>,
    #[arg(long)]
    pattern_type: Option<String>,
    #[arg(long)]
    active:       Option<bool>,
    #[arg(long)]
    deactivated:  Option<bool>,
    #[arg(long)]
    limit:        Option<usize>,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing. Logs go to stderr so stdout stays machine-readable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.as_path()).required(false))
    .add_source(
      config::Environment::with_prefix("AMEND")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let cli_cfg: CliConfig = settings
    .try_deserialize()
    .context("failed to deserialise CliConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&cli_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let learner = Learner::new(Arc::new(store), cli_cfg.learning)
    .context("invalid learning configuration")?;

  run(&learner, cli.command).await
}

async fn run(learner: &Learner<SqliteStore>, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Record {
      tenant,
      entity_type,
      entity_id,
      field,
      original,
      value,
      actor,
      context,
    } => {
      let request = CorrectionRequest {
        tenant_id: tenant,
        entity_type,
        entity_id,
        field,
        original_value: original,
        corrected_value: value,
        actor_id: actor,
        context: parse_entity(&context)?,
      };
      let (event, mining) = learner
        .record_correction_with_report(request)
        .await
        .context("failed to record correction")?;
      print_json(&serde_json::json!({
        "event_id": event.event_id,
        "recorded_at": event.recorded_at,
        "mining": mining,
      }))
    }

    Command::Classify { tenant, entity_type, count } => {
      let entity_type = EntityType::parse(&entity_type)?;
      learner
        .record_classification(tenant, entity_type, count)
        .await
        .context("failed to record classifications")?;
      print_json(&serde_json::json!({ "recorded": count }))
    }

    Command::Suggest { tenant, entity_type, data } => {
      let entity_type = EntityType::parse(&entity_type)?;
      let data = parse_entity(&data)?;
      let threshold = learner.config().auto_apply_threshold;
      let suggestions: Vec<_> = learner
        .apply_learning(tenant, entity_type, &data)
        .await
        .context("failed to compute suggestions")?
        .into_iter()
        .map(|s| SuggestionOutput { auto_apply: s.is_auto_applicable(threshold), suggestion: s })
        .collect();
      print_json(&suggestions)
    }

    Command::Stats { tenant } => {
      let report = learner
        .get_accuracy_stats(tenant)
        .await
        .context("failed to build accuracy report")?;
      print_json(&report)
    }

    Command::Prune { tenant, min_accuracy, every } => {
      let min_accuracy = min_accuracy.unwrap_or(learner.config().prune_min_accuracy);
      match every {
        None => {
          let report = learner
            .prune_inaccurate_patterns(tenant, min_accuracy)
            .await
            .context("prune failed")?;
          print_json(&report)
        }
        Some(secs) => prune_on_schedule(learner, tenant, min_accuracy, secs).await,
      }
    }

    Command::Reactivate { tenant, pattern } => {
      let pattern = learner
        .reactivate_pattern(tenant, pattern)
        .await
        .with_context(|| format!("failed to reactivate pattern {pattern}"))?;
      print_json(&pattern)
    }

    Command::Patterns {
      tenant,
      entity_type,
      pattern_type,
      active,
      deactivated,
      limit,
    } => {
      let query = PatternQuery {
        entity_type: entity_type.as_deref().map(EntityType::parse).transpose()?,
        pattern_type: pattern_type.as_deref().map(PatternType::parse).transpose()?,
        active,
        deactivated,
        limit,
        ..PatternQuery::for_tenant(tenant)
      };
      let patterns = learner.list_patterns(&query).await.context("failed to list patterns")?;
      print_json(&patterns)
    }
  }
}

/// Run the prune sweep every `secs` seconds until Ctrl-C.
async fn prune_on_schedule(
  learner: &Learner<SqliteStore>,
  tenant: Uuid,
  min_accuracy: f64,
  secs: u64,
) -> anyhow::Result<()> {
  anyhow::ensure!(secs > 0, "--every must be at least one second");

  let mut ticker = tokio::time::interval(Duration::from_secs(secs));
  let shutdown = tokio::signal::ctrl_c();
  tokio::pin!(shutdown);

  tracing::info!(%tenant, min_accuracy, every = secs, "scheduled prune started");
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        match learner.prune_inaccurate_patterns(tenant, min_accuracy).await {
          Ok(report) => print_json(&report)?,
          Err(e) => tracing::error!(%tenant, error = %e, "scheduled prune failed"),
        }
      }
      result = &mut shutdown => {
        result.context("failed to listen for Ctrl-C")?;
        tracing::info!("scheduled prune stopped");
        return Ok(());
      }
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SuggestionOutput {
  #[serde(flatten)]
  suggestion: amend_core::suggest::Suggestion,
  auto_apply: bool,
}

fn parse_entity(raw: &str) -> anyhow::Result<EntityData> {
  serde_json::from_str(raw).context("entity data must be a JSON object")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
