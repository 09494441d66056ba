use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use seedcheck::logic::Logic;
use seedcheck::placement::{
    filter_pickup_nodes, filter_unassigned_pickup_nodes, find_node_with_resource,
    GeneratorReach, UncollectedState,
};
use seedcheck::reach::ResolverReach;
use seedcheck::resolver::{resolve, run_resolver, validate_layout, ResolveOptions, Verdict};
use seedcheck::settings::rng_from_seed;
use seedcheck::trace::{RecordingTrace, TraceEvent};
use seedcheck::ResolverSettings;
use seedcheck_game::{GameDescription, NodeIndex, RequirementSet, ResourceCollection, WorldGraph};
use seedcheck_logic::{GamePatches, PatchesData, State, TraversalContext};
use serde_json::{json, Value};

// One region, one area. Nodes are indexed in declaration order.
fn single_area(
    resource_database: Value,
    nodes: Value,
    connections: Value,
    victory: Value,
) -> Result<WorldGraph> {
    let description: GameDescription = serde_json::from_value(json!({
        "resource_database": resource_database,
        "regions": [{"name": "World", "areas": [{
            "name": "Area",
            "nodes": nodes,
            "connections": connections,
        }]}],
        "victory_condition": victory,
        "starting_location": {"region": "World", "area": "Area", "node": "Start"},
    }))?;
    WorldGraph::build(&description, None)
}

fn res(name: &str) -> Value {
    json!({"type": "resource", "resource": name})
}

fn settings(seed: u64) -> ResolverSettings {
    ResolverSettings {
        random_seed: seed,
        ..Default::default()
    }
}

fn full_path(graph: &WorldGraph, verdict: &Verdict) -> Result<Vec<String>> {
    let state = verdict.final_state().context("expected success")?;
    Ok(State::full_path(state)
        .into_iter()
        .map(|n| graph.nodes[n].name.clone())
        .collect())
}

// Start -> A, Start -> B, B -> A, A -> Goal needs X, B grants X.
fn diamond() -> Result<WorldGraph> {
    single_area(
        json!({"items": ["X"], "events": ["Victory"]}),
        json!([
            {"name": "Start"},
            {"name": "A"},
            {"name": "B", "gain": [{"resource": "X"}]},
            {"name": "Goal", "gain": [{"resource": "Victory"}]},
        ]),
        json!([
            {"from": "Start", "to": "A"},
            {"from": "Start", "to": "B"},
            {"from": "B", "to": "A"},
            {"from": "A", "to": "Goal", "requirement": res("X")},
        ]),
        res("Victory"),
    )
}

#[test]
fn diamond_is_beatable_through_b() -> Result<()> {
    let graph = diamond()?;
    let report = resolve(&graph, &GamePatches::default(), &settings(0), None)?;
    assert_eq!(full_path(&graph, &report.verdict)?, ["Start", "B", "A", "Goal"]);
    assert_eq!(report.attempts, 3);
    Ok(())
}

#[test]
fn victory_at_start_needs_one_attempt() -> Result<()> {
    let graph = single_area(
        json!({}),
        json!([{"name": "Start"}, {"name": "Other"}]),
        json!([{"from": "Start", "to": "Other"}]),
        json!({"type": "free"}),
    )?;
    let report = resolve(&graph, &GamePatches::default(), &settings(0), None)?;
    assert_eq!(report.attempts, 1);
    let state = report.verdict.final_state().context("expected success")?;
    assert!(state.previous_state.is_none());
    assert_eq!(state.node, graph.starting_node);
    Ok(())
}

// Start <-> A where A grants c; the goal needs c and d, and d exists nowhere.
fn missing_item() -> Result<WorldGraph> {
    single_area(
        json!({"items": ["c", "d"], "events": ["Win"]}),
        json!([
            {"name": "Start"},
            {"name": "A", "gain": [{"resource": "c"}]},
            {"name": "Goal", "gain": [{"resource": "Win"}]},
        ]),
        json!([
            {"from": "Start", "to": "A", "bidirectional": true},
            {"from": "Start", "to": "Goal", "requirement": {"type": "and", "items": [res("c"), res("d")]}},
        ]),
        res("Win"),
    )
}

#[test]
fn unsolvable_graph_is_impossible() -> Result<()> {
    let graph = missing_item()?;
    let report = resolve(&graph, &GamePatches::default(), &settings(0), None)?;
    assert!(matches!(report.verdict, Verdict::Impossible));
    assert_eq!(report.attempts, 2);
    Ok(())
}

#[test]
fn attempt_budget_wins_over_impossible() -> Result<()> {
    let graph = missing_item()?;
    let settings = ResolverSettings {
        max_attempts: Some(1),
        ..Default::default()
    };
    let report = resolve(&graph, &GamePatches::default(), &settings, None)?;
    assert!(matches!(
        report.verdict,
        Verdict::AttemptsExhausted { attempts: 1 }
    ));
    Ok(())
}

#[test]
fn cancel_flag_and_zero_timeout_abort() -> Result<()> {
    let graph = diamond()?;
    let patches = GamePatches::default();
    let cancel = Arc::new(AtomicBool::new(true));
    let report = resolve(&graph, &patches, &settings(0), Some(cancel))?;
    assert!(matches!(report.verdict, Verdict::Cancelled { attempts: 0 }));

    let timed = ResolverSettings {
        timeout_seconds: Some(0.0),
        ..Default::default()
    };
    let report = resolve(&graph, &patches, &timed, None)?;
    assert!(matches!(report.verdict, Verdict::TimedOut { .. }));
    Ok(())
}

// Several pickups, each granting one key; the goal needs all of them.
fn keys() -> Result<WorldGraph> {
    single_area(
        json!({"items": ["K1", "K2", "K3"], "events": ["Win"]}),
        json!([
            {"name": "Start"},
            {"name": "P1", "pickup_index": 0},
            {"name": "P2", "pickup_index": 1},
            {"name": "P3", "pickup_index": 2},
            {"name": "Goal", "gain": [{"resource": "Win"}]},
        ]),
        json!([
            {"from": "Start", "to": "P1"},
            {"from": "Start", "to": "P2"},
            {"from": "P1", "to": "P3", "requirement": res("K2")},
            {"from": "P2", "to": "P1"},
            {"from": "P3", "to": "Goal", "requirement": {"type": "and", "items": [res("K1"), res("K3")]}},
        ]),
        res("Win"),
    )
}

fn keys_patches(graph: &WorldGraph) -> Result<GamePatches> {
    let data: PatchesData = serde_json::from_value(json!({
        "pickups": [
            {"pickup_index": 0, "name": "K1"},
            {"pickup_index": 1, "name": "K2"},
            {"pickup_index": 2, "name": "K3"},
        ]
    }))?;
    GamePatches::build(&data, graph)
}

#[test]
fn same_seed_same_path() -> Result<()> {
    let graph = keys()?;
    let patches = keys_patches(&graph)?;
    for seed in 0..8 {
        let first = resolve(&graph, &patches, &settings(seed), None)?;
        let second = resolve(&graph, &patches, &settings(seed), None)?;
        assert_eq!(
            full_path(&graph, &first.verdict)?,
            full_path(&graph, &second.verdict)?
        );
        assert_eq!(first.attempts, second.attempts);
    }
    Ok(())
}

// A is a dead end; the goal opens with either a or b, and only B1 leads on.
fn dead_end() -> Result<WorldGraph> {
    single_area(
        json!({"items": ["a", "b"], "events": ["Win"]}),
        json!([
            {"name": "Start"},
            {"name": "A", "gain": [{"resource": "a"}]},
            {"name": "B1", "gain": [{"resource": "b"}]},
            {"name": "Goal", "gain": [{"resource": "Win"}]},
        ]),
        json!([
            {"from": "Start", "to": "A"},
            {"from": "Start", "to": "B1"},
            {"from": "B1", "to": "Goal", "requirement": {"type": "or", "items": [res("a"), res("b")]}},
        ]),
        res("Win"),
    )
}

#[test]
fn failed_branch_does_not_hide_solution() -> Result<()> {
    let graph = dead_end()?;
    for seed in 0..16 {
        let report = resolve(&graph, &GamePatches::default(), &settings(seed), None)?;
        assert_eq!(
            full_path(&graph, &report.verdict)?.last().map(String::as_str),
            Some("Goal")
        );
    }
    Ok(())
}

// Two tanks on a side branch must both be collected before N (holding k) so that the heat room
// H (which heals) and then the lava room G (holding the win) can be crossed.
fn heat_then_lava() -> Result<WorldGraph> {
    let damage = |name: &str, amount: i32| {
        json!({"type": "resource", "resource": name, "amount": amount})
    };
    single_area(
        json!({"items": ["k"], "events": ["Win"], "damage": ["Heat", "Lava"]}),
        json!([
            {"name": "Start"},
            {"name": "N", "gain": [{"resource": "k"}]},
            {"name": "T1", "gain": [{"resource": "EnergyTank"}]},
            {"name": "T2", "gain": [{"resource": "EnergyTank"}]},
            {"name": "H", "heal": true},
            {"name": "G", "gain": [{"resource": "Win"}]},
        ]),
        json!([
            {"from": "Start", "to": "N"},
            {"from": "Start", "to": "T1"},
            {"from": "T1", "to": "T2"},
            {"from": "T1", "to": "N"},
            {"from": "T2", "to": "N"},
            {"from": "N", "to": "H", "requirement": damage("Heat", 150)},
            {"from": "H", "to": "G", "requirement": damage("Lava", 250)},
        ]),
        json!({"type": "and", "items": [res("k"), res("Win")]}),
    )
}

#[test]
fn damage_from_separate_failures_is_not_summed() -> Result<()> {
    let graph = heat_then_lava()?;
    let unshuffled = ResolverSettings {
        shuffle_actions: false,
        ..Default::default()
    };
    let report = resolve(&graph, &GamePatches::default(), &unshuffled, None)?;
    assert_eq!(
        full_path(&graph, &report.verdict)?,
        ["Start", "T1", "T2", "N", "H", "G"]
    );
    let state = report.verdict.final_state().context("expected success")?;
    assert_eq!(state.maximum_energy, 299);
    assert_eq!(state.energy, 49);

    for seed in 0..8 {
        let report = resolve(&graph, &GamePatches::default(), &settings(seed), None)?;
        assert_eq!(
            full_path(&graph, &report.verdict)?,
            ["Start", "T1", "T2", "N", "H", "G"]
        );
    }
    Ok(())
}

#[test]
fn learned_requirements_hold_no_damage() -> Result<()> {
    let graph = heat_then_lava()?;
    let patches = GamePatches::default();
    let cx = TraversalContext::new(&graph, &patches);
    for seed in 0..8 {
        let mut logic = Logic::with_trace(&graph, RecordingTrace::default());
        let options = ResolveOptions {
            shuffle_actions: true,
            ..Default::default()
        };
        let report = run_resolver(
            &cx,
            &mut logic,
            State::initial(&cx)?,
            &options,
            false,
            &mut rng_from_seed(seed),
        );
        assert!(report.verdict.is_success());
        for event in &logic.trace.events {
            if let TraceEvent::Rollback { additional, .. } = event {
                assert!(additional.all_individual().iter().all(|r| !r.is_damage()));
            }
        }
        for node in 0..graph.nodes.len() {
            assert!(logic.get(node).all_individual().iter().all(|r| !r.is_damage()));
        }
    }
    Ok(())
}

#[test]
fn seeded_memo_prunes_and_ignore_cache_resets() -> Result<()> {
    let graph = dead_end()?;
    let patches = GamePatches::default();
    let cx = TraversalContext::new(&graph, &patches);
    let options = ResolveOptions::default();
    let b1: NodeIndex = 2;

    let mut logic = Logic::new(&graph);
    logic.set(b1, RequirementSet::impossible());
    let report = run_resolver(
        &cx,
        &mut logic,
        State::initial(&cx)?,
        &options,
        false,
        &mut rng_from_seed(0),
    );
    assert!(matches!(report.verdict, Verdict::Impossible));

    let mut logic = Logic::new(&graph);
    logic.set(b1, RequirementSet::impossible());
    let report = run_resolver(
        &cx,
        &mut logic,
        State::initial(&cx)?,
        &options,
        true,
        &mut rng_from_seed(0),
    );
    assert!(report.verdict.is_success());
    Ok(())
}

#[test]
fn trace_sees_every_attempt() -> Result<()> {
    let graph = diamond()?;
    let patches = GamePatches::default();
    let cx = TraversalContext::new(&graph, &patches);
    let mut logic = Logic::with_trace(&graph, RecordingTrace::default());
    let report = run_resolver(
        &cx,
        &mut logic,
        State::initial(&cx)?,
        &ResolveOptions::default(),
        false,
        &mut rng_from_seed(0),
    );
    let attempts = logic
        .trace
        .events
        .iter()
        .filter(|e| matches!(e, TraceEvent::NewAttempt { .. }))
        .count();
    assert_eq!(attempts, report.attempts);
    assert!(matches!(
        logic.trace.events.last(),
        Some(TraceEvent::Victory { node: 3, .. })
    ));
    Ok(())
}

#[test]
fn dangerous_resource_can_shrink_reach() -> Result<()> {
    let graph = single_area(
        json!({"items": ["Key", "Other"]}),
        json!([{"name": "Start"}, {"name": "Locked"}, {"name": "Open"}]),
        json!([
            {"from": "Start", "to": "Locked", "requirement": res("Key")},
            {"from": "Start", "to": "Open", "requirement": {"type": "resource", "resource": "Key", "negate": true}},
        ]),
        json!({"type": "never"}),
    )?;
    let db = &graph.resource_database;
    let key = db.get_by_name("Key")?;
    let other = db.get_by_name("Other")?;
    assert!(graph.is_dangerous(key));
    assert!(!graph.is_dangerous(other));

    let patches = GamePatches::default();
    let cx = TraversalContext::new(&graph, &patches);
    let logic = Logic::new(&graph);
    let reach_with = |gains: &[(seedcheck_game::ResourceId, i32)]| -> Result<Vec<NodeIndex>> {
        let state = State::with_start(&cx, 0, ResourceCollection::from_gains(gains))?;
        Ok(ResolverReach::calculate_reach(&cx, &logic, &state)
            .nodes()
            .to_vec())
    };
    assert_eq!(reach_with(&[])?, vec![2]);
    // Non-dangerous additions never shrink reach.
    assert_eq!(reach_with(&[(other, 1)])?, vec![2]);
    assert_eq!(reach_with(&[(key, 1)])?, vec![1]);
    Ok(())
}

// Start <-> Tank, Start -> Lava behind 150 heat; Lava holds the win.
fn lava(tank_item: &str) -> Result<(WorldGraph, GamePatches)> {
    let graph = single_area(
        json!({
            "items": ["Varia"],
            "events": ["Win"],
            "damage": ["Heat"],
            "damage_reductions": [{"damage": "Heat", "item": "Varia", "multiplier": 0.5}],
        }),
        json!([
            {"name": "Start"},
            {"name": "Tank", "pickup_index": 0},
            {"name": "Lava", "gain": [{"resource": "Win"}]},
        ]),
        json!([
            {"from": "Start", "to": "Tank", "bidirectional": true},
            {"from": "Start", "to": "Lava", "requirement": {"type": "resource", "resource": "Heat", "amount": 150}},
        ]),
        res("Win"),
    )?;
    let data: PatchesData = serde_json::from_value(json!({
        "pickups": [{"pickup_index": 0, "name": tank_item}]
    }))?;
    let patches = GamePatches::build(&data, &graph)?;
    Ok((graph, patches))
}

#[test]
fn energy_tank_opens_lava() -> Result<()> {
    let (graph, patches) = lava("EnergyTank")?;
    let report = resolve(&graph, &patches, &settings(0), None)?;
    assert_eq!(
        full_path(&graph, &report.verdict)?,
        ["Start", "Tank", "Start", "Lava"]
    );
    let state = report.verdict.final_state().context("expected success")?;
    assert_eq!(state.maximum_energy, 199);
    assert_eq!(state.energy, 49);
    Ok(())
}

#[test]
fn damage_reduction_opens_lava() -> Result<()> {
    let (graph, patches) = lava("Varia")?;
    let report = resolve(&graph, &patches, &settings(0), None)?;
    let state = report.verdict.final_state().context("expected success")?;
    assert_eq!(state.energy, 24);

    let (graph, _) = lava("Varia")?;
    let report = resolve(&graph, &GamePatches::default(), &settings(0), None)?;
    assert!(matches!(report.verdict, Verdict::Impossible));
    Ok(())
}

#[test]
fn heal_node_refills_energy() -> Result<()> {
    let build = |heal: bool| {
        single_area(
            json!({"damage": ["Heat"]}),
            json!([
                {"name": "Start"},
                {"name": "Save", "heal": heal},
                {"name": "Goal"},
            ]),
            json!([
                {"from": "Start", "to": "Save", "requirement": {"type": "resource", "resource": "Heat", "amount": 60}},
                {"from": "Save", "to": "Goal", "requirement": {"type": "resource", "resource": "Heat", "amount": 60}},
            ]),
            json!({"type": "never"}),
        )
    };
    for (heal, expected) in [(true, Some(39)), (false, None)] {
        let graph = build(heal)?;
        let patches = GamePatches::default();
        let cx = TraversalContext::new(&graph, &patches);
        let logic = Logic::new(&graph);
        let state = State::initial(&cx)?;
        let reach = ResolverReach::calculate_reach(&cx, &logic, &state);
        assert_eq!(reach.energy_at(2), expected);
    }
    Ok(())
}

#[test]
fn greedy_check_follows_solver_toggle() -> Result<()> {
    let greedy = ResolverSettings {
        validate_with_solver: false,
        ..Default::default()
    };
    let graph = diamond()?;
    assert!(validate_layout(&graph, &GamePatches::default(), &greedy)?);
    assert!(validate_layout(&graph, &GamePatches::default(), &settings(0))?);

    let graph = missing_item()?;
    assert!(!validate_layout(&graph, &GamePatches::default(), &greedy)?);
    Ok(())
}

#[test]
fn generator_reach_tracks_collections() -> Result<()> {
    let graph = diamond()?;
    let patches = GamePatches::default();
    let cx = TraversalContext::new(&graph, &patches);
    let mut reach = GeneratorReach::reach_from_state(&cx, State::initial(&cx)?);
    let before = UncollectedState::from_reach(&cx, &reach);
    assert_eq!(before.nodes.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(reach.collectable_nodes(&cx), vec![2]);

    reach.collect(&cx, 2)?;
    assert!(reach.is_reachable_node(3));
    let fresh = ResolverReach::calculate_reach(&cx, &Logic::new(&graph), reach.state());
    assert_eq!(reach.reach().nodes(), fresh.nodes());

    assert_eq!(reach.collect_all_safe(&cx)?, 1);
    assert!(reach.victory_condition_satisfied(&cx));
    let after = UncollectedState::from_reach(&cx, &reach);
    let diff = &after - &before;
    assert_eq!(diff.nodes.into_iter().collect::<Vec<_>>(), vec![3]);
    assert_eq!(diff.events.len(), 1);

    assert!(reach.collect(&cx, 2).is_err());
    Ok(())
}

#[test]
fn pickup_helpers() -> Result<()> {
    let graph = keys()?;
    let data: PatchesData = serde_json::from_value(json!({
        "pickups": [{"pickup_index": 1, "name": "K2"}]
    }))?;
    let patches = GamePatches::build(&data, &graph)?;
    let all: Vec<NodeIndex> = (0..graph.nodes.len()).collect();
    assert_eq!(
        filter_pickup_nodes(&graph, all.clone()).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        filter_unassigned_pickup_nodes(&graph, all.clone(), &patches).collect::<Vec<_>>(),
        vec![1, 3]
    );

    let win = graph.resource_database.get_by_name("Win")?;
    assert_eq!(find_node_with_resource(&graph, win, &all)?, 4);
    let k1 = graph.resource_database.get_by_name("K1")?;
    assert!(find_node_with_resource(&graph, k1, &all).is_err());
    Ok(())
}

#[test]
fn structural_errors_surface_at_build() {
    let cycle: Result<GameDescription, _> = serde_json::from_value(json!({
        "resource_database": {"items": ["A"]},
        "templates": {
            "One": {"type": "template", "name": "Two"},
            "Two": {"type": "or", "items": [res("A"), {"type": "template", "name": "One"}]},
        },
        "regions": [{"name": "World", "areas": [{"name": "Area", "nodes": [{"name": "Start"}]}]}],
        "victory_condition": {"type": "template", "name": "One"},
        "starting_location": {"region": "World", "area": "Area", "node": "Start"},
    }));
    let cycle = cycle.unwrap();
    assert!(WorldGraph::build(&cycle, None).is_err());

    let mut bad_start = cycle.clone();
    bad_start.templates.clear();
    bad_start.victory_condition = Default::default();
    assert!(WorldGraph::build(&bad_start, None).is_ok());
    bad_start.starting_location.node = "Nowhere".to_string();
    assert!(WorldGraph::build(&bad_start, None).is_err());
}
