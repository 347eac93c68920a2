//! Tombola demo runner
//!
//! Boots the engine over a handful of simulated rooms with a bot roster and
//! a trickle of scripted human players, then reports progress until the run
//! deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tombola::engine::bots::{BotProfile, SkillTier};
use tombola::engine::events::SessionEvent;
use tombola::engine::room::{CallSpeed, PatternSelection, RoomConfig};
use tombola::store::{InMemoryLedger, InMemoryStore, StaticCommission};
use tombola::{EngineConfig, EngineResult, GameScheduler};

#[derive(Parser)]
#[command(name = "tombola", about = "Number-bingo game engine demo runner")]
struct Cli {
    /// Engine configuration file (TOML); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to run before shutting down
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Number of demo rooms to open
    #[arg(long, default_value_t = 3)]
    rooms: usize,

    /// Use the compressed simulation timing profile
    #[arg(long)]
    fast: bool,
}

fn demo_rooms(count: usize) -> Vec<RoomConfig> {
    let tiers = [
        ("bronze", "Bronze Hall", 500u64, CallSpeed::Standard, PatternSelection::Standard),
        ("silver", "Silver Hall", 1_000, CallSpeed::Standard, PatternSelection::Standard),
        ("gold", "Gold Hall", 2_500, CallSpeed::Turbo, PatternSelection::Extended),
        ("platinum", "Platinum Hall", 5_000, CallSpeed::Relaxed, PatternSelection::Extended),
    ];
    (0..count)
        .map(|i| {
            let (id, name, stake, speed, patterns) = tiers[i % tiers.len()];
            let mut room = if i < tiers.len() {
                RoomConfig::new(id, name, stake)
            } else {
                RoomConfig::new(format!("{id}-{i}"), format!("{name} {i}"), stake)
            };
            room.speed = speed;
            room.patterns = patterns;
            room
        })
        .collect()
}

fn demo_bots() -> Vec<BotProfile> {
    let personalities = [
        ("bot-martha", 70u8, 60u8, 300u64, 1_200u64, SkillTier::Shark, true),
        ("bot-otto", 50, 35, 500, 2_000, SkillTier::Seasoned, true),
        ("bot-pearl", 45, 20, 800, 2_500, SkillTier::Seasoned, false),
        ("bot-gus", 30, 70, 400, 1_500, SkillTier::Novice, true),
        ("bot-ida", 25, 10, 1_000, 3_000, SkillTier::Novice, false),
        ("bot-remy", 60, 50, 250, 900, SkillTier::Shark, true),
    ];
    personalities
        .iter()
        .map(
            |&(id, win_rate, aggression, min_ms, max_ms, skill, chatty)| BotProfile {
                id: id.to_string(),
                name: id.trim_start_matches("bot-").to_string(),
                win_rate,
                aggression,
                min_response_ms: min_ms,
                max_response_ms: max_ms,
                skill,
                chat_enabled: chatty,
                chat_frequency: if chatty { 15 } else { 0 },
                auto_join: true,
                max_concurrent_games: 3,
                enabled: true,
            },
        )
        .collect()
}

#[tokio::main]
async fn main() -> EngineResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None if cli.fast => EngineConfig::fast_simulation(),
        None => EngineConfig::default(),
    };

    let rooms = demo_rooms(cli.rooms);
    let room_ids: Vec<String> = rooms.iter().map(|r| r.id.clone()).collect();
    let bots = demo_bots();

    let ledger = Arc::new(InMemoryLedger::new());
    for bot in &bots {
        ledger.fund(bot.id.as_str(), 10_000_000);
    }

    let scheduler = GameScheduler::new(
        config,
        rooms,
        bots,
        Arc::new(InMemoryStore::new()),
        ledger.clone(),
        Arc::new(StaticCommission::new(500)),
    )?;
    scheduler.start();

    // settlement ticker for the console
    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Ended(snapshot)) => {
                    if let Some(win) = &snapshot.winner {
                        println!(
                            "🏆 {} won {} in {} with {} ({} calls)",
                            win.winner, win.prize, snapshot.room_id, win.pattern, win.calls_at_win
                        );
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event observer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // a trickle of scripted human players
    {
        let scheduler = Arc::clone(&scheduler);
        let ledger = Arc::clone(&ledger);
        let room_ids = room_ids.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(2));
            let mut serial = 0u32;
            loop {
                ticker.tick().await;
                serial += 1;
                let player = format!("player-{serial}");
                let room = &room_ids[serial as usize % room_ids.len()];
                ledger.fund(player.as_str(), 100_000);
                if let Err(e) = scheduler.join(room, player.as_str()).await {
                    tracing::debug!(player, room = %room, error = %e, "join declined");
                }
            }
        });
    }

    println!(
        "🎱 tombola engine running: {} rooms, {}s",
        room_ids.len(),
        cli.duration_secs
    );

    let shutdown = tokio::time::sleep(Duration::from_secs(cli.duration_secs));
    tokio::pin!(shutdown);
    let mut report = tokio::time::interval(Duration::from_secs(5));
    let monitor = scheduler.monitor();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => {
                let snap = monitor.snapshot();
                println!(
                    "📊 up {}s | sessions {}/{}/{} started/finished/cancelled | calls {} | wins {} | staked {} | paid {}",
                    snap.uptime_secs,
                    snap.sessions_started,
                    snap.sessions_finished,
                    snap.sessions_cancelled,
                    snap.draws,
                    snap.wins,
                    snap.stakes_collected,
                    snap.prizes_paid,
                );
            }
        }
    }

    scheduler.shutdown().await;
    let snap = monitor.snapshot();
    println!(
        "✅ done: {} sessions, {} calls, {} wins, {} paid out",
        snap.sessions_started, snap.draws, snap.wins, snap.prizes_paid
    );
    Ok(())
}
