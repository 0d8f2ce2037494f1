use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use sim_core::config::{ActionCosts, StandingsConfig};
use sim_core::{Control, EntityStore, Role, RosterRequirements, Team, TeamName, Tendencies};
use sim_econ::{discretionary_actions, Action, Ledger, OverdraftPolicy};

fn build_team(entities: &mut EntityStore) -> Team {
    let mut team = Team::new(
        TeamName::from("Meridian GP"),
        Control::Ai {
            profile: "aggressive".into(),
        },
    );
    let roster = [
        (Role::Driver, "D1", 62.0),
        (Role::Driver, "D2", 55.0),
        (Role::Engineer, "E1", 60.0),
        (Role::Mechanic, "M1", 58.0),
        (Role::Car, "C1", 60.0),
    ];
    for (role, name, base) in roster {
        let id = entities.create(role, name, 30, &[], base).unwrap();
        entities.assign(id, Some(team.name.clone())).unwrap();
        team.roster.insert(id);
    }
    team
}

fn bench_decide(c: &mut Criterion) {
    let mut entities = EntityStore::new();
    let team = build_team(&mut entities);
    let costs = ActionCosts::default();
    let mut actions = discretionary_actions(&team, &entities, &costs);
    for i in 0..40 {
        let id = entities
            .create(Role::Strategist, &format!("S{i}"), 40, &[], 40.0 + i as f32)
            .unwrap();
        actions.push(Action::hire(id, Decimal::new(600_000, 0), Decimal::new(150_000, 0)));
    }
    let ledger =
        Ledger::with_opening_balance(OverdraftPolicy::default(), 0, Decimal::new(10_000_000, 0))
            .unwrap();
    let req = RosterRequirements::default();
    let standings = StandingsConfig::default();
    let view = sim_ai::TeamView {
        team: &team,
        entities: &entities,
        ledger: &ledger,
        requirements: &req,
        standings: &standings,
        costs: &costs,
        committed_per_season: Decimal::new(7_000_000, 0),
    };
    let t = Tendencies::default();
    let policy = sim_ai::DecisionPolicy::default();
    c.bench_function("ai decide 50 actions", |b| {
        b.iter(|| black_box(sim_ai::decide(&view, &actions, &t, &policy)))
    });
}

criterion_group!(benches, bench_decide);
criterion_main!(benches);
