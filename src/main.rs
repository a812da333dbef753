use arena_ranking::{
    start_rollover_task, ArenaConfig, ArenaError, ArenaType, AvatarAddress, BattleOutcome,
    BlockRoundClock, InMemoryRosterRepository, InMemoryScoreStore, OpponentService,
    ParticipantRecord, RankingService, RankingStatus, RosterRepository, RoundClock,
    RoundRolloverCoordinator, ScoreStore, Season, SeasonTransitionCoordinator, ShutdownSignal,
    FIRST_ROUND,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PARTICIPANTS: u32 = 200;
const CLANS: i32 = 8;
const BATTLES: usize = 500;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ArenaError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_ranking=debug,arena_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting arena simulation");

    let config = Arc::new(ArenaConfig::from_env()?);
    let mut rng = StdRng::from_rng(&mut rand::rng());

    // In-memory collaborators; swap in PostgresRosterRepository for a real roster
    let store: Arc<dyn ScoreStore> = Arc::new(InMemoryScoreStore::new());
    let roster = Arc::new(InMemoryRosterRepository::new());
    roster.insert_season(1, ArenaType::Season)?;
    for _ in 0..PARTICIPANTS {
        let clan_id = rng.random_bool(0.7).then(|| rng.random_range(1..=CLANS));
        let score = rng.random_range(900..1600);
        roster.insert_participant(1, ParticipantRecord::new(AvatarAddress::random(), clan_id, score))?;
    }

    let ranking = Arc::new(RankingService::from_store(store, config.clone()));
    let season = Season {
        id: 2,
        arena_type: ArenaType::Season,
        round_interval: 10,
        required_medal_count: 0,
        start_block: 0,
    };

    let report = SeasonTransitionCoordinator::new(roster.clone(), ranking.clone(), config.clone())
        .prepare_season(&season, &ShutdownSignal::never())
        .await?;
    info!(?report, backend = %ranking.backend().kind(), "Season ready");

    let participants = roster
        .get_participants(season.id, 0, PARTICIPANTS as usize, None)
        .await?;
    if participants.is_empty() {
        warn!("No participants carried over, nothing to simulate");
        return Ok(());
    }

    // Battles fought during round 1 score into the round 2 ranking
    let battle_round = season.round_key(FIRST_ROUND + 1);
    let opponents = OpponentService::new(
        ranking.clone(),
        config.opponent_groups.clone(),
        config.selection_retry,
    );
    let mut recorded = 0;
    for _ in 0..BATTLES {
        let attacker = participants[rng.random_range(0..participants.len())];
        let selection = opponents
            .select_battle_opponents(&attacker.address, battle_round)
            .await?;
        let available: Vec<u8> = selection
            .iter()
            .filter(|(_, opponent)| opponent.is_some())
            .map(|(group_id, _)| *group_id)
            .collect();
        if available.is_empty() {
            continue;
        }

        let group_id = available[rng.random_range(0..available.len())];
        let outcome = if rng.random_bool(0.5) {
            BattleOutcome::Win
        } else {
            BattleOutcome::Lose
        };
        opponents
            .record_battle_result(&attacker.address, attacker.clan_id, battle_round, group_id, outcome)
            .await?;
        recorded += 1;
    }
    info!(recorded, "Battles played");

    // Clan aggregates are refreshed in bulk before the round closes
    ranking
        .update_all_clan_ranking(battle_round, season.round_interval)
        .await?;

    // Near the end of round 1 the ranking round 2's battles score into is prepared
    let clock = Arc::new(BlockRoundClock::new(
        vec![season.clone()],
        config.rollover_lead_blocks,
    ));
    let round_one_end = season.start_block + season.round_interval as i64 - 1;
    clock.set_tip(round_one_end - config.rollover_lead_blocks as i64)?;
    let coordinator = Arc::new(RoundRolloverCoordinator::new(
        roster.clone(),
        ranking.clone(),
        config.clone(),
    ));
    let (trigger, signal) = ShutdownSignal::channel();
    let clock_handle: Arc<dyn RoundClock> = clock.clone();
    let rollover = tokio::spawn(start_rollover_task(
        coordinator,
        clock_handle,
        config.rollover_poll_interval,
        signal,
    ));

    let next_round = battle_round.next_round();
    let rolled = tokio::time::timeout(Duration::from_secs(10), async {
        while ranking.backend().get_status(next_round).await? != Some(RankingStatus::Done) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok::<(), ArenaError>(())
    })
    .await;
    trigger.trigger();
    if rollover.await.is_err() {
        warn!("Rollover task ended abnormally");
    }
    match rolled {
        Ok(result) => result?,
        Err(_) => {
            warn!(target_round = next_round.round, "Rollover did not finish in time");
            return Ok(());
        }
    }

    for clan in ranking.global().get_top_clans(next_round, 5).await? {
        info!(rank = clan.rank, clan_id = clan.clan_id, score = clan.score, "Clan leaderboard");
    }
    for entry in ranking.backend().get_entries_page(next_round, 0, 5).await? {
        let rank = ranking.backend().get_rank(next_round, &entry.address).await?;
        info!(rank, address = %entry.address, score = entry.score, "Participant leaderboard");
    }

    Ok(())
}
