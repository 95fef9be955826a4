//! End-to-end simulation flows driven tick by tick through `Simulator::step`.

use ricochet_core::player::Side;
use ricochet_sim::config::SimConfig;
use ricochet_sim::effects::{EffectTable, ids};
use ricochet_sim::events::SimEvent;
use ricochet_sim::{GameState, PaddleInput, Phase, Simulator};

const TICK_MS: f64 = 50.0;
const DT: f32 = 0.05;

fn setup(seed: u64) -> (Simulator, GameState, SimConfig) {
    let config = SimConfig::default();
    let state = GameState::new(&config);
    let sim = Simulator::with_seed(config.clone(), EffectTable::builtin(), None, seed);
    (sim, state, config)
}

/// Run ticks until the first serve puts the match live.
fn run_until_live(sim: &mut Simulator, state: &mut GameState, now: &mut f64) {
    for _ in 0..100 {
        *now += TICK_MS;
        sim.step(state, DT, *now, &[]);
        if matches!(state.phase, Phase::Live) {
            return;
        }
    }
    panic!("match never went live");
}

#[test]
fn goal_commits_into_respawn_then_serves() {
    let (mut sim, mut state, config) = setup(1);
    state.points_needed = 10; // keep the selection screen out of this test
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);

    // Push the ball past the right goal line.
    state.ball.x = config.arena_width + state.ball.radius + 2.0;
    state.ball.y = config.arena_height / 2.0;
    state.ball.vx = 400.0;
    state.ball.vy = 0.0;

    now += TICK_MS;
    let events = sim.step(&mut state, DT, now, &[]);
    assert!(events.contains(&SimEvent::Scored { by: Side::Left }));
    assert_eq!(state.left.score, 1);
    let scored_at = now;

    // The respawn is deferred through the confirmation window.
    let mut respawn_scheduled_at = None;
    for _ in 0..10 {
        now += TICK_MS;
        sim.step(&mut state, DT, now, &[]);
        if matches!(state.phase, Phase::Spawn { .. }) {
            respawn_scheduled_at = Some(now);
            break;
        }
    }
    let scheduled = respawn_scheduled_at.expect("confirmed goal must schedule a respawn");
    assert!(
        scheduled - scored_at > config.confirmation_delay_ms,
        "commit cannot precede the confirmation window"
    );

    // And the countdown ends in a fresh serve.
    let mut served = false;
    for _ in 0..40 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        if events.contains(&SimEvent::BallRespawned) {
            served = true;
            break;
        }
    }
    assert!(served);
    assert!(state.ball.speed() > 0.0);
    assert_eq!(state.left.score, 1, "committed score survives the respawn");
}

#[test]
fn late_defender_input_reverts_provisional_goal() {
    let (mut sim, mut state, config) = setup(2);
    state.points_needed = 10;
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);

    // Send the ball toward the right goal, just in front of the paddle line.
    let paddle_x = config.paddle_x(Side::Right);
    state.ball.x = paddle_x - 30.0;
    state.ball.y = config.arena_height / 2.0;
    state.ball.vx = 900.0;
    state.ball.vy = 0.0;
    // Keep the defending paddle far away so the host sees a miss.
    state.right.paddle.y = 0.0;
    state.right.paddle.target_y = 0.0;
    state.right.paddle.vy = 0.0;
    let approach_time = now + TICK_MS;

    // Host ticks ahead: ball crosses the goal and a provisional score lands.
    let mut scored = false;
    for _ in 0..6 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        if events.contains(&SimEvent::Scored { by: Side::Left }) {
            scored = true;
            break;
        }
    }
    assert!(scored, "host should provisionally score the miss");
    assert_eq!(state.left.score, 1);

    // The defender's delayed input proves the paddle covered the ball when
    // it reached the paddle line.
    let input = PaddleInput {
        y: config.arena_height / 2.0 - state.right.paddle.height / 2.0,
        vy: 0.0,
        client_timestamp: approach_time,
    };
    now += TICK_MS;
    let events = sim.step(&mut state, DT, now, &[(Side::Right, input)]);

    assert!(
        events
            .iter()
            .any(|e| matches!(e, SimEvent::OutcomeReverted { defender: Side::Right })),
        "late interception must revert the goal: {events:?}"
    );
    assert_eq!(state.left.score, 0, "provisional score rolled back");
    assert!(state.pending.is_none());
    assert!(matches!(state.phase, Phase::Live));
    assert!(state.ball.vx < 0.0, "ball is returning after the correction");
}

#[test]
fn filled_meter_opens_selection_and_picks_resume_play() {
    let (mut sim, mut state, config) = setup(3);
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);
    assert_eq!(state.points_needed, 1, "first goal fills the meter");

    state.ball.x = -(state.ball.radius + 2.0);
    state.ball.y = config.arena_height / 2.0;
    state.ball.vx = -400.0;
    state.ball.vy = 0.0;

    // Score and wait out the confirmation window.
    let mut opened = false;
    for _ in 0..10 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        if events.contains(&SimEvent::SelectionOpened) {
            opened = true;
            break;
        }
    }
    assert!(opened, "filled meter must open the selection screen");
    assert!(matches!(state.phase, Phase::Selection { .. }));
    let (left_choice, right_choice) = {
        let selection = state.selection.as_ref().expect("selection data present");
        assert_eq!(selection.left.choices.len(), config.selection_choice_count);
        (
            selection.left.choices[0].clone(),
            selection.right.choices[0].clone(),
        )
    };

    // One pick is not enough.
    sim.choose_item(&mut state, Side::Left, &left_choice);
    now += TICK_MS;
    sim.step(&mut state, DT, now, &[]);
    assert!(matches!(state.phase, Phase::Selection { .. }));

    // Both picks: effects land and the respawn countdown starts.
    sim.choose_item(&mut state, Side::Right, &right_choice);
    now += TICK_MS;
    let events = sim.step(&mut state, DT, now, &[]);
    assert!(
        events
            .iter()
            .filter(|e| matches!(e, SimEvent::EffectApplied { .. }))
            .count()
            == 2,
        "both picks must apply: {events:?}"
    );
    assert!(matches!(state.phase, Phase::Spawn { .. }));
    assert!(state.left.has_effect(&left_choice));
    assert!(state.right.has_effect(&right_choice));
}

#[test]
fn stalemate_scenario_resets_after_idle_window() {
    let (mut sim, mut state, _config) = setup(4);
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);

    // Park the ball bouncing vertically far from both paddles.
    state.ball.x = 512.0;
    state.ball.vx = 0.0;
    state.ball.vy = 200.0;
    let idle_start = now;
    state.ball.last_paddle_hit_at = idle_start;

    let mut reset_at = None;
    while now < idle_start + 20_000.0 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        if events.contains(&SimEvent::StalemateReset) {
            reset_at = Some(now);
            break;
        }
    }
    let reset_at = reset_at.expect("idle rally must force a reset");
    assert!(
        reset_at - idle_start > 15_000.0,
        "reset must not fire before the idle timeout"
    );
    assert!(state.ball.speed() > 0.0, "reset reseeds the serve velocity");
}

#[test]
fn win_ends_match_once_and_stops_scoring() {
    let (mut sim, mut state, config) = setup(5);
    state.points_needed = 100;
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);

    state.right.score = config.winning_score - 1;
    state.ball.x = -(state.ball.radius + 2.0);
    state.ball.vx = -400.0;
    state.ball.vy = 0.0;

    let mut over = 0;
    for _ in 0..20 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        over += events
            .iter()
            .filter(|e| matches!(e, SimEvent::MatchOver { winner: Side::Right }))
            .count();
    }
    assert_eq!(over, 1, "match must end exactly once");
    assert!(matches!(state.phase, Phase::Over { winner: Side::Right }));
    let score_at_end = state.right.score;

    // Further ticks are inert.
    for _ in 0..20 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        assert!(events.is_empty());
    }
    assert_eq!(state.right.score, score_at_end);
}

#[test]
fn endless_continue_resumes_after_match_over() {
    let (mut sim, mut state, config) = setup(6);
    state.points_needed = 100;
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);

    state.left.score = config.winning_score;
    now += TICK_MS;
    sim.step(&mut state, DT, now, &[]);
    assert!(matches!(state.phase, Phase::Over { .. }));

    sim.continue_endless(&mut state, now);
    assert!(state.endless);
    assert!(matches!(state.phase, Phase::Spawn { .. }));

    // Scoring continues without re-ending the match.
    let mut served = false;
    for _ in 0..60 {
        now += TICK_MS;
        let events = sim.step(&mut state, DT, now, &[]);
        if events.contains(&SimEvent::BallRespawned) {
            served = true;
            break;
        }
    }
    assert!(served, "endless mode serves again");
}

#[test]
fn overdrive_arms_then_boosts_next_hit() {
    let (mut sim, mut state, config) = setup(7);
    state.points_needed = 100;
    let mut now = 0.0;
    run_until_live(&mut sim, &mut state, &mut now);

    // Grant overdrive through the generic application path.
    ricochet_sim::rules::apply_effect(
        &mut state,
        Side::Left,
        ids::OVERDRIVE,
        &EffectTable::builtin(),
        &config,
        &mut Vec::new(),
    );

    // Next tick arms the charge (cooldown starts unset).
    now += TICK_MS;
    sim.step(&mut state, DT, now, &[]);
    assert!(state.left.overdrive_armed);

    // Drive the ball into the left paddle and observe the boosted return.
    state.ball.x = config.paddle_x(Side::Left) + config.paddle_width + 30.0;
    state.ball.y = state.left.paddle.center_y();
    state.ball.vx = -400.0;
    state.ball.vy = 0.0;
    now += TICK_MS;
    let events = sim.step(&mut state, DT, now, &[]);
    let hit_speed = events.iter().find_map(|e| match e {
        SimEvent::PaddleHit { side: Side::Left, speed, .. } => Some(*speed),
        _ => None,
    });
    let hit_speed = hit_speed.expect("paddle hit must fire");
    assert!(
        hit_speed > 400.0 * 1.5,
        "overdrive return should be far faster than the incoming ball: {hit_speed}"
    );
    assert!(!state.left.overdrive_armed, "charge consumed");
    assert!(
        state.left.timer(ids::OVERDRIVE).ready_at > now,
        "cooldown starts on use"
    );
}
