//! Binary entrypoint for the landclaim CLI.
//!
//! Commands:
//! - `init` - write a starter `landclaim.toml` and create the claim database
//! - `status` - print claimant and cell totals
//! - `claim` / `unclaim` - run an ownership batch for a player or town
//! - `check` - resolve a permission for an actor in one cell
//! - `setting` - show or override a player's claim setting
//! - `found-town` - create a town owned by a player
//! - `audit [--repair]` - compare stored chunk counts with the cells
//!
//! See the library crate docs for module-level details: `landclaim::`.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use uuid::Uuid;

use landclaim::claims::{
    audit_counts, can_perform, can_perform_at, is_setting_enabled, player_setting, repair_counts,
    Actor, CellCoord, CellOwnershipSource, ChunkOwnerUpdate, ClaimCache, ClaimPermission,
    ClaimSetting, ClaimStore, ClaimTarget, Claimant, ClaimantKind, Feedback, MemoryWorld, Mode,
    TickDriver, TickScheduler,
};
use landclaim::config::Config;
use landclaim::metrics;

#[derive(Parser)]
#[command(name = "landclaim")]
#[command(about = "Land claims and permission resolution for a persistent world")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "landclaim.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the database
    Init,
    /// Show claimant and cell totals
    Status,
    /// Claim cells for a player, or for the player's town with --town
    Claim(BatchArgs),
    /// Release cells held by a player, or a town attribution with --town
    Unclaim(BatchArgs),
    /// Resolve whether an actor may perform an action in a cell
    Check {
        /// Cell as `x,z`
        #[arg(value_parser = parse_cell)]
        cell: CellCoord,
        /// Permission name (e.g. blocks, doors, containers)
        #[arg(short, long, value_parser = parse_permission)]
        permission: ClaimPermission,
        /// Acting player
        #[arg(short, long, conflicts_with = "environment")]
        actor: Option<Uuid>,
        /// Environmental cause, named by its setting (e.g. fire_spread)
        #[arg(short, long, value_parser = parse_setting)]
        environment: Option<ClaimSetting>,
        /// Block height, to honour slice owners
        #[arg(short = 'y', long)]
        y: Option<i32>,
    },
    /// Show, set or clear a player's setting override
    Setting {
        player: Uuid,
        #[arg(value_parser = parse_setting)]
        setting: ClaimSetting,
        /// `on`, `off` or `clear`; omitted prints the current value
        value: Option<String>,
        /// Also resolve the setting in this cell (`x,z`) with town priority
        #[arg(long, value_parser = parse_cell)]
        at: Option<CellCoord>,
    },
    /// Found a town owned by a player
    FoundTown {
        founder: Uuid,
        name: String,
    },
    /// Compare stored chunk counts with the cells
    Audit {
        /// Rewrite mismatched counts from the cells
        #[arg(long)]
        repair: bool,
    },
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Acting player
    #[arg(short, long)]
    player: Uuid,
    /// Act for this town instead of the player
    #[arg(short, long)]
    town: Option<Uuid>,
    /// Skip ownership, protection and limit checks (administrative)
    #[arg(long)]
    force: bool,
    /// Suppress feedback output
    #[arg(short, long)]
    silent: bool,
    /// Cells as `x,z`
    #[arg(required = true, value_parser = parse_cell)]
    cells: Vec<CellCoord>,
}

fn parse_cell(s: &str) -> Result<CellCoord, String> {
    CellCoord::parse(s).ok_or_else(|| format!("expected `x,z`, got '{}'", s))
}

fn parse_permission(s: &str) -> Result<ClaimPermission, String> {
    ClaimPermission::parse(s).ok_or_else(|| format!("unknown permission '{}'", s))
}

fn parse_setting(s: &str) -> Result<ClaimSetting, String> {
    ClaimSetting::parse(s).ok_or_else(|| format!("unknown setting '{}'", s))
}

/// Store, cache and world wired from one config.
struct Engine {
    store: Arc<ClaimStore>,
    claims: ClaimCache,
    world: MemoryWorld,
}

impl Engine {
    fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let path = config.claims_db_path();
        let store = Arc::new(
            ClaimStore::open(&path)
                .map_err(|e| anyhow!("Failed to open claim database {}: {}", path.display(), e))?,
        );
        let claims = ClaimCache::new(store.clone(), config.cache_settings());
        config.features.apply(claims.features());
        let world = config.build_world().load_from(&store)?;
        Ok(Self {
            store,
            claims,
            world,
        })
    }

    fn persist(&mut self) -> Result<usize> {
        let written = self.world.flush_dirty(&self.store)?;
        self.claims.save_all();
        self.store.flush()?;
        Ok(written)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        info!("Initializing new landclaim configuration");
        Config::create_default(&cli.config).await?;
        let config = Config::load(&cli.config).await?;
        tokio::fs::create_dir_all(&config.storage.data_dir).await?;
        let engine = Engine::open(&config)?;
        engine.store.flush()?;
        info!("Configuration file created at {}", cli.config);
        println!("Initialized {} and {}", cli.config, config.claims_db_path().display());
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(&Some(config.clone()), cli.verbose);
    let mut engine = Engine::open(&config)?;

    match cli.command {
        Commands::Init => {}
        Commands::Status => {
            let players = engine.store.list_ids(ClaimantKind::Player)?;
            let towns = engine.store.list_ids(ClaimantKind::Town)?;
            let cells = engine
                .world
                .iter_cells()
                .filter(|(_, cell)| !cell.is_wilderness())
                .count();
            let payload = serde_json::json!({
                "claims_enabled": config.claims.enabled,
                "players": players.len(),
                "towns": towns.len(),
                "owned_cells": cells,
                "metrics": metrics::snapshot(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Claim(args) => run_batch(&mut engine, Mode::Claim, args)?,
        Commands::Unclaim(args) => run_batch(&mut engine, Mode::Unclaim, args)?,
        Commands::Check {
            cell,
            permission,
            actor,
            environment,
            y,
        } => {
            let actor = match (actor, environment) {
                (Some(id), _) => Actor::Player(id),
                (None, Some(setting)) => Actor::Environment(setting),
                (None, None) => return Err(anyhow!("either --actor or --environment is required")),
            };
            let record = engine.world.cell(cell);
            let allowed = match y {
                Some(y) => can_perform_at(
                    &engine.claims,
                    record,
                    y,
                    engine.world.min_y(),
                    actor,
                    permission,
                ),
                None => can_perform(&engine.claims, record, actor, permission),
            };
            let payload = serde_json::json!({
                "cell": cell,
                "owner": record.and_then(|c| c.owner_id()),
                "town": record.and_then(|c| c.town_id()),
                "permission": permission.as_str(),
                "allowed": allowed,
            });
            println!("{}", payload);
        }
        Commands::Setting {
            player,
            setting,
            value,
            at,
        } => {
            if let Some(value) = value {
                let handle = engine.claims.get_player_claim(player);
                {
                    let mut guard = handle
                        .write()
                        .map_err(|_| anyhow!("player {} lock poisoned", player))?;
                    apply_setting(&mut *guard, setting, &value)?;
                }
                engine.claims.save_player(&handle);
                engine.persist()?;
            }
            let mut payload = serde_json::json!({
                "player": player,
                "setting": setting.as_str(),
                "value": player_setting(&engine.claims, player, setting),
            });
            if let Some(coord) = at {
                payload["at"] = serde_json::json!({
                    "cell": coord,
                    "value": is_setting_enabled(&engine.claims, engine.world.cell(coord), setting, true),
                });
            }
            println!("{}", payload);
        }
        Commands::FoundTown { founder, name } => {
            let town = engine.claims.make_town_claim(founder, &name)?;
            let id = ClaimTarget::Town(town).id();
            engine.persist()?;
            println!("{}", serde_json::json!({ "town": id, "name": name, "owner": founder }));
        }
        Commands::Audit { repair } => {
            let players = engine.store.list_ids(ClaimantKind::Player)?;
            let towns = engine.store.list_ids(ClaimantKind::Town)?;
            let mismatches = audit_counts(
                &engine.claims,
                engine.world.iter_cells().map(|(_, cell)| cell),
                &players,
                &towns,
            );
            for m in &mismatches {
                println!("{}", serde_json::to_string(m)?);
            }
            if mismatches.is_empty() {
                println!("All chunk counts match");
            } else if repair {
                let fixed = repair_counts(&engine.claims, &mismatches);
                engine.persist()?;
                println!("Repaired {} chunk count(s)", fixed);
            } else {
                warn!("{} chunk count mismatch(es); rerun with --repair", mismatches.len());
            }
        }
    }

    Ok(())
}

/// Apply an `on`, `off` or `clear` override to a claimant setting.
fn apply_setting(claimant: &mut impl Claimant, setting: ClaimSetting, value: &str) -> Result<()> {
    match value {
        "on" => claimant.set_setting(setting, true),
        "off" => claimant.set_setting(setting, false),
        "clear" => {
            claimant.clear_setting(setting);
        }
        other => return Err(anyhow!("expected on, off or clear, got '{}'", other)),
    }
    Ok(())
}

fn run_batch(engine: &mut Engine, mode: Mode, args: BatchArgs) -> Result<()> {
    let target = match args.town {
        Some(id) => engine.claims.get_town_claim(id).map(ClaimTarget::Town),
        None => Some(ClaimTarget::Player(engine.claims.get_player_claim(args.player))),
    };
    if target.is_none() {
        warn!("no claimant found for {:?}; nothing to do", args.town);
    }
    let update = ChunkOwnerUpdate::new(Some(args.player), target, mode, args.cells)
        .verify(!args.force)
        .silent(args.silent);

    let mut driver = TickDriver::new();
    driver.register(Box::new(update));
    let mut feedback: Vec<Feedback> = Vec::new();
    let ticks = driver.run_until_idle(&mut engine.world, &mut feedback, &engine.claims, u64::MAX);
    let written = engine.persist()?;
    info!("{} batch finished after {} tick(s), {} cell(s) written", mode.verb(), ticks, written);

    for item in feedback {
        println!("{}", serde_json::to_string(&item)?);
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only in the foreground
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use landclaim::claims::ClaimantPlayer;

    #[test]
    fn setting_values_toggle_and_clear() {
        let mut player = ClaimantPlayer::new(Uuid::new_v4(), 64);
        let setting = ClaimSetting::FireSpread;

        apply_setting(&mut player, setting, "on").expect("on");
        assert_eq!(player.setting_override(setting), Some(true));
        apply_setting(&mut player, setting, "off").expect("off");
        assert_eq!(player.setting_override(setting), Some(false));
        apply_setting(&mut player, setting, "clear").expect("clear");
        assert_eq!(player.setting_override(setting), None);
        assert!(apply_setting(&mut player, setting, "maybe").is_err());
    }
}
