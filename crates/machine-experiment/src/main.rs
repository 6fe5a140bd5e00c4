//! Machine Experiment CLI.
//!
//! Commands:
//! - run: Simulate a full session with a scripted participant and export it
//! - layout: Generate and display a randomized session layout
//! - validate: Check an exported session file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use machine_experiment::config::{SessionConfig, SlotOrderPolicy};
use machine_experiment::export::{ExportPayload, EXPORT_HEADER};
use machine_experiment::layout::{LayoutRandomizer, SlotSizeMap, DEFAULT_SLOT_ORDER};
use machine_experiment::participant::ParticipantProfile;
use machine_experiment::phase::Phase;
use machine_experiment::session::{ManualClock, Session};

/// Generate a timestamped output path from the given path.
/// e.g., "session.json" -> "session-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("session");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(std::path::Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "machine-experiment")]
#[command(version)]
#[command(about = "Three-machines behavioral experiment engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a full session with a scripted participant
    Run {
        /// Participant identifier
        #[arg(long, env = "PARTICIPANT_ID", default_value = "sim")]
        participant: String,

        /// Participant age in years
        #[arg(long, default_value = "8")]
        age: String,

        /// Participant sex (F or M)
        #[arg(long, default_value = "F")]
        sex: String,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Sample the slot ordering from the permitted pool instead of the
        /// pinned default
        #[arg(long)]
        sample_slots: bool,

        /// Simulated milliseconds between participant actions
        #[arg(long, default_value = "900")]
        pace_ms: u64,

        /// Output file for the exported session
        #[arg(long, default_value = "session.json")]
        output: PathBuf,
    },

    /// Generate and display a randomized session layout
    Layout {
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Sample the slot ordering from the permitted pool
        #[arg(long)]
        sample_slots: bool,
    },

    /// Check an exported session file
    Validate {
        /// Exported session JSON file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            participant,
            age,
            sex,
            seed,
            sample_slots,
            pace_ms,
            output,
        } => {
            let profile = match ParticipantProfile::from_intake(&participant, &age, &sex) {
                Ok(profile) => profile,
                Err(error) => bail!("intake rejected: {}", error),
            };
            let config = SessionConfig {
                slot_order_policy: slot_policy(sample_slots),
                seed,
                ..SessionConfig::default()
            };

            let clock = ManualClock::new(0);
            let mut session =
                Session::new(profile, config).with_clock(Box::new(clock.clone()));
            simulate(&mut session, &clock, pace_ms);

            let payload = session.export();
            let path = timestamped_path(&output);
            payload.save(&path)?;
            info!(path = %path.display(), "export written");

            println!("\n=== Session Result ===");
            println!("Session: {}", session.id());
            println!("Participant: {}", session.profile().id());
            println!("Machine order: {}", session.layout().machine_label());
            println!("Slot layout: {}", session.layout().slot_label());
            println!("Color order: {}", session.layout().color_label());
            println!("Final phase: {}", session.phase().label());
            println!("Records: {}", session.records().len());
            println!("Export rows: {}", payload.row_count());
        }

        Commands::Layout { seed, sample_slots } => {
            let mut rng: Box<dyn RngCore> = match seed {
                Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
                None => Box::new(StdRng::from_os_rng()),
            };
            let layout =
                LayoutRandomizer::new(slot_policy(sample_slots)).generate_layout(&mut rng);
            let slot_map = SlotSizeMap::from_layout(&layout);

            println!("Machine order (L->R): {}", layout.machine_label());
            println!("Color order (L->R):   {}", layout.color_label());
            println!("Slot layout (L->R):   {}", layout.slot_label());
            for position in 0..3 {
                let Some(machine) = layout.machine_at(position) else {
                    continue;
                };
                let sizes: Vec<&str> = (0..layout.slot_count())
                    .filter_map(|slot| slot_map.lookup(machine, slot))
                    .map(|size| size.name())
                    .collect();
                println!("  {} -> [{}]", machine.name(), sizes.join(", "));
            }
        }

        Commands::Validate { input } => {
            let payload = ExportPayload::load(&input)?;
            let Some(header) = payload.data.first() else {
                bail!("export has no header row");
            };
            if header.as_slice() != EXPORT_HEADER {
                bail!("header row does not match the fixed export layout");
            }
            for (index, row) in payload.data.iter().enumerate() {
                if row.len() != EXPORT_HEADER.len() {
                    bail!("row {} has {} columns, expected {}", index, row.len(), 14);
                }
            }

            let mut per_phase: BTreeMap<&str, usize> = BTreeMap::new();
            for row in &payload.data[1..] {
                *per_phase.entry(row[6].as_str()).or_default() += 1;
            }

            println!("Participant: {}", payload.participant_id);
            println!("Data rows: {}", payload.row_count());
            for (phase, count) in per_phase {
                let phase = if phase.is_empty() { "(identity)" } else { phase };
                println!("  {}: {}", phase, count);
            }
            println!("OK");
        }
    }

    Ok(())
}

fn slot_policy(sample_slots: bool) -> SlotOrderPolicy {
    if sample_slots {
        SlotOrderPolicy::Sampled
    } else {
        SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER)
    }
}

/// Drive the session with a scripted participant: cycle clicks and drops
/// across machines and slots, explain after every prompt, and let every
/// deferred reveal come due.
fn simulate(session: &mut Session, clock: &ManualClock, pace_ms: u64) {
    session.begin();
    let mut n: usize = 0;

    while !session.is_terminal() {
        n += 1;
        clock.advance(pace_ms);
        session.tick();
        match session.phase() {
            Phase::Demo => {
                session.run_demo();
                session.advance();
            }
            Phase::Comprehension => {
                session.click_machine(n % 3);
                session.advance();
            }
            Phase::VerbalQuestion => {
                session.click_machine(n % 3);
                session.submit_explanation("scripted answer");
                session.advance();
            }
            Phase::ExtraSmall => {
                if session.remaining_budget() > 0 {
                    // The fourth slot sits at index 3 on every machine.
                    session.drop_item(n % 3, 3);
                } else {
                    session.click_machine(n % 3);
                }
                if session.awaiting_explanation() {
                    session.submit_explanation("scripted answer");
                }
                session.advance();
            }
            Phase::Question | Phase::Lightness | Phase::Exploration => {
                while session.remaining_budget() > 0 {
                    n += 1;
                    clock.advance(pace_ms);
                    session.tick();
                    let slots = session.layout().slot_count();
                    session.drop_item(n % 3, n % slots);
                }
                session.submit_explanation("scripted answer");
                session.advance();
            }
            Phase::Terminal => break,
        }
    }

    // Flush any reveal still in flight.
    clock.advance(1_000);
    session.tick();
}
