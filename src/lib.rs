pub mod config;
pub mod entities;
pub mod error;
pub mod persistence;
pub mod telemetry;

pub use entities::player::PlayerRecord;
pub use error::{LoadAnomaly, PfileError, PfileResult};
pub use persistence::index::{IndexEntry, IndexFlags, PlayerIndex};
pub use persistence::shard::{path_for, path_for_kind, FileKind};
pub use persistence::store::{DeleteReport, LoadedRecord, PfileStore, SaveOutcome, ValidationReport};
pub use persistence::writer::SaveMode;

use config::{AppConfig, Command};
use telemetry::logging::{format_date, log_error, log_game, unix_timestamp};

pub fn run(args: &[String]) -> PfileResult<()> {
    let config = AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root, &config.persistence.log_filter)?;
    let mut store = PfileStore::open(&config.root, config.persistence.clone())?;

    match &config.command {
        Command::List => list(&store),
        Command::Show(name) => show(&store, name)?,
        Command::Validate => validate(&store),
        Command::Delete(name) => {
            let report = store.delete(name)?;
            log_game(&format!("DELETE: {} ({} files)", report.name, report.removed.len()));
            println!("pfile: deleted {}", report.name);
            for path in &report.removed {
                println!("- removed {}", path.display());
            }
        }
        Command::Clean => {
            let reports = store.clean(unix_timestamp())?;
            println!("pfile: purged {} player(s)", reports.len());
            for report in &reports {
                println!("- {}", report.name);
            }
        }
    }
    store.flush_index(false)?;
    Ok(())
}

fn list(store: &PfileStore) {
    let index = store.index();
    println!(
        "pfile: {} player(s), top id {}",
        index.len(),
        index.top_id()
    );
    for entry in index.iter() {
        println!(
            "{:>6} {:<20} lev {:>3} last {}{}",
            entry.id,
            entry.name,
            entry.level,
            format_date(entry.last),
            if entry.flags.contains(IndexFlags::DELETED) {
                " [deleted]"
            } else {
                ""
            }
        );
    }
}

fn show(store: &PfileStore, name: &str) -> PfileResult<()> {
    let loaded = store.load(name)?;
    let record = &loaded.record;
    let derived = record.derived();
    println!("pfile: {} (id {})", record.name, record.id);
    println!("- level: {}", record.level);
    for (class, level) in record.class_levels.iter() {
        println!("- class {}: level {}", class, level);
    }
    println!(
        "- abilities: str {}/{} int {} wis {} dex {} con {} cha {}",
        derived.abilities.str,
        derived.abilities.str_add,
        derived.abilities.int,
        derived.abilities.wis,
        derived.abilities.dex,
        derived.abilities.con,
        derived.abilities.cha
    );
    println!(
        "- hit {}/{} psp {}/{} move {}/{}",
        record.pools.hit,
        derived.max_hit,
        record.pools.psp,
        derived.max_psp,
        record.pools.moves,
        derived.max_moves
    );
    println!("- equipped items: {}", record.equipment().occupied());
    println!("- active effects: {}", record.effects().len());
    println!("- last logon: {}", format_date(record.last_logon));
    if !loaded.report.is_clean() {
        println!("- load anomalies: {}", loaded.report.anomalies.len());
        for anomaly in &loaded.report.anomalies {
            eprintln!("pfile: {} {}", record.name, anomaly);
        }
    }
    Ok(())
}

fn validate(store: &PfileStore) {
    let report = store.validate();
    log_game(&format!(
        "validate: players={}, clean={}, anomalies={}, missing={}, errors={}",
        report.players,
        report.clean,
        report.anomalies,
        report.missing.len(),
        report.errors.len()
    ));
    println!("pfile: validate");
    println!("- players: {}", report.players);
    println!("- clean: {}", report.clean);
    println!(
        "- with anomalies: {} ({} total)",
        report.with_anomalies, report.anomalies
    );
    for name in &report.missing {
        log_error(&format!("validate: {} has no record file", name));
        eprintln!("pfile: missing record file for {}", name);
    }
    for err in &report.errors {
        log_error(&format!("validate: {}", err));
        eprintln!("pfile: validate {}", err);
    }
}
