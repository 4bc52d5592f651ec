//! End-to-end scenarios driven through the public `Simulation` commands.

mod common;

use std::time::Duration;

use grid_sim::error::GridError;
use grid_sim::fleet::StaticFleet;
use grid_sim::sim::Simulation;
use grid_sim::sim::cascade::{CASCADE_SCENARIO_ID, CascadeStatus};
use grid_sim::sim::engine::V2G_DEMO_SCENARIO_ID;
use grid_sim::sim::kpi::KpiReport;
use grid_sim::sim::substation::Status;
use grid_sim::sim::types::{SimConfig, TickEvent};
use grid_sim::sim::v2g::{SessionStatus, V2gParams};

use common::{parked_vehicles, simple_sim, substation, three_substations, v2g_sim};

#[test]
fn sustained_overload_trips_after_thirty_seconds() {
    let mut sim = Simulation::new(
        SimConfig::new(1.0, 60, 7),
        vec![substation("plant", 800.0, 100_000.0, 0.0)],
        Box::new(StaticFleet::default()),
    );
    sim.force_load("plant", 860.0).ok();

    let mut statuses = Vec::new();
    let mut failed_at = None;
    for _ in 0..40 {
        let snap = sim.tick();
        let s = snap.substation("plant").map(|v| v.status);
        statuses.push(s);
        if s == Some(Status::Failed) && failed_at.is_none() {
            failed_at = Some(snap.time_s);
        }
    }

    assert_eq!(statuses[0], Some(Status::Overload));
    let failed_at = failed_at.unwrap_or(f64::INFINITY);
    assert!(
        (29.0..=31.0).contains(&failed_at),
        "expected trip near t=30s, got {failed_at}"
    );
    // no intermediate relief: every tick before the trip stays overloaded
    assert!(
        statuses
            .iter()
            .take_while(|s| **s != Some(Status::Failed))
            .all(|s| *s == Some(Status::Overload))
    );
}

#[test]
fn trip_countdown_clears_when_load_drops() {
    let mut sim = simple_sim();
    sim.force_load("north", 110.0).ok();
    for _ in 0..20 {
        sim.tick();
    }
    assert!(sim.status("north").is_ok_and(|s| s.countdown_remaining_s.is_some()));

    sim.force_load("north", 90.0).ok();
    sim.tick();
    let st = sim.status("north");
    assert!(st.as_ref().is_ok_and(|s| s.countdown_remaining_s.is_none()));
    assert_eq!(st.map(|s| s.status), Ok(Status::Warning));

    // a new overload gets a full window again
    sim.force_load("north", 110.0).ok();
    for _ in 0..25 {
        sim.tick();
    }
    assert_eq!(sim.status("north").map(|s| s.status), Ok(Status::Overload));

    // back to the load model, which keeps this feeder well under capacity
    assert_eq!(sim.clear_load_override("north"), Ok(()));
    sim.tick();
    let st = sim.status("north");
    assert_eq!(st.as_ref().map(|s| s.status), Ok(Status::Normal));
    assert!(st.is_ok_and(|s| s.countdown_remaining_s.is_none()));
    assert_eq!(
        sim.clear_load_override("atlantis"),
        Err(GridError::InvalidSubstationId("atlantis".into()))
    );
}

#[test]
fn v2g_session_meets_target_and_restores_substation() {
    let mut sim = v2g_sim(parked_vehicles(20, 0.9));
    sim.fail("north").ok();
    sim.enable_v2g("north", 50.0).ok();

    let snap = sim.tick();

    let ended = snap.events.iter().find_map(|e| match e {
        TickEvent::SessionEnded {
            status,
            delivered_kwh,
            ..
        } => Some((*status, *delivered_kwh)),
        _ => None,
    });
    let (status, delivered) = ended.unwrap_or((SessionStatus::Recruiting, 0.0));
    assert_eq!(status, SessionStatus::TargetMet);
    assert!((delivered - 51.6).abs() < 1e-6, "delivered {delivered}");

    assert!(snap
        .events
        .iter()
        .any(|e| matches!(e, TickEvent::AutoRestored { substation_id, .. } if substation_id == "north")));
    assert_ne!(sim.status("north").map(|s| s.status), Ok(Status::Failed));

    let session = sim.dispatcher().history().last().cloned();
    assert_eq!(session.as_ref().map(|s| s.participants.len()), Some(12));
    assert!(session.as_ref().is_some_and(|s| s.outcome().is_ok()));
    assert!(session.is_some_and(|s| s.revenue > 0.0));
    assert!(!sim.grid().get("north").is_ok_and(|s| s.v2g_enabled));
}

#[test]
fn set_time_conflicts_while_cascade_holds_lock() {
    let mut sim = simple_sim();
    sim.set_time(14).ok();
    sim.start_cascade(
        vec!["north".into(), "central".into(), "south".into()],
        Duration::from_secs(10),
        None,
    )
    .ok();
    sim.tick();

    let hour_before = sim.arbiter().weather().hour();
    let temp_before = sim.arbiter().weather().temperature_f();
    assert_eq!(
        sim.set_time(8),
        Err(GridError::ConflictActiveScenario {
            held_by: CASCADE_SCENARIO_ID.into()
        })
    );
    assert!(matches!(
        sim.set_temperature(100.0),
        Err(GridError::ConflictActiveScenario { .. })
    ));
    assert_eq!(sim.arbiter().weather().hour(), hour_before);
    assert_eq!(sim.arbiter().weather().temperature_f(), temp_before);

    // a competing scenario start is rejected too
    assert!(matches!(
        sim.run_v2g_demo("south", 10.0),
        Err(GridError::ConflictActiveScenario { .. })
    ));
}

#[test]
fn restore_mid_session_cancels_and_keeps_delivered_energy() {
    let mut sim = v2g_sim(parked_vehicles(3, 0.9)).with_v2g_params(V2gParams {
        discharge_kw: 60.0,
        ..V2gParams::default()
    });
    sim.force_load("north", 110.0).ok();
    sim.fail("north").ok();
    sim.enable_v2g("north", 50.0).ok();

    // 3 vehicles x 60 kW x 300 s = 15 kWh per tick
    sim.tick();
    sim.tick();
    let delivered = sim.dispatcher().session("north").map(|s| s.delivered_kwh);
    assert!(delivered.is_some_and(|d| (d - 30.0).abs() < 1e-6), "{delivered:?}");

    // restored into overload, not forced back to NORMAL
    assert_eq!(sim.restore("north"), Ok(Status::Overload));
    assert!(sim.dispatcher().session("north").is_none());

    let session = sim.dispatcher().history().last().cloned();
    assert_eq!(session.as_ref().map(|s| s.status), Some(SessionStatus::Cancelled));
    assert!(session.is_some_and(|s| (s.delivered_kwh - 30.0).abs() < 1e-6));

    // the cancelled session does not deliver on later ticks
    sim.tick();
    assert!(sim.dispatcher().session("north").is_none());
}

#[test]
fn cancelled_session_energy_reaches_kpi_report() {
    let mut sim = v2g_sim(parked_vehicles(3, 0.9)).with_v2g_params(V2gParams {
        discharge_kw: 60.0,
        ..V2gParams::default()
    });
    sim.fail("north").ok();
    sim.enable_v2g("north", 50.0).ok();
    let mut snapshots = vec![sim.tick(), sim.tick()];
    assert!(sim.restore("north").is_ok());
    snapshots.push(sim.tick());

    assert!(snapshots[2].events.iter().any(|e| matches!(
        e,
        TickEvent::SessionEnded { status: SessionStatus::Cancelled, .. }
    )));
    let kpi = KpiReport::from_snapshots(&snapshots, sim.manual_failures());
    assert_eq!(kpi.sessions_cancelled, 1);
    assert_eq!(kpi.sessions_active, 0);
    assert!((kpi.v2g_energy_kwh - 30.0).abs() < 1e-6, "{}", kpi.v2g_energy_kwh);
    assert!(kpi.v2g_revenue > 0.0);
}

#[test]
fn disabled_session_is_reported_once() {
    let mut sim = v2g_sim(parked_vehicles(3, 0.9));
    sim.fail("south").ok();
    sim.enable_v2g("south", 500.0).ok();
    let mut snapshots = vec![sim.tick()];
    assert!(sim.disable_v2g("south").is_ok());
    snapshots.push(sim.tick());
    snapshots.push(sim.tick());

    let ended = |snap: &grid_sim::sim::types::GridSnapshot| {
        snap.events
            .iter()
            .filter(|e| matches!(e, TickEvent::SessionEnded { .. }))
            .count()
    };
    assert_eq!(ended(&snapshots[1]), 1);
    assert_eq!(ended(&snapshots[2]), 0);
    assert_eq!(KpiReport::from_snapshots(&snapshots, 1).sessions_cancelled, 1);
}

#[test]
fn rejected_v2g_demo_leaves_substation_and_lock_untouched() {
    let mut sim = v2g_sim(parked_vehicles(5, 0.9));
    assert!(matches!(
        sim.run_v2g_demo("north", -1.0),
        Err(GridError::InvalidArgument(_))
    ));
    sim.start_drill("storm-drill").ok();
    assert!(matches!(
        sim.run_v2g_demo("north", 20.0),
        Err(GridError::ConflictActiveScenario { .. })
    ));

    assert_eq!(sim.status("north").map(|s| s.status), Ok(Status::Normal));
    assert_eq!(sim.manual_failures(), 0);
    assert_eq!(sim.arbiter().held_by(), Some("storm-drill"));
    assert!(sim.dispatcher().session("north").is_none());
}

#[test]
fn cancelled_cascade_fails_nothing_further() {
    let mut sim = simple_sim();
    sim.start_cascade(
        vec!["north".into(), "central".into(), "south".into()],
        Duration::from_secs(10),
        None,
    )
    .ok();
    for _ in 0..5 {
        sim.tick();
    }
    assert_eq!(sim.cancel_cascade(), Ok(()));
    for _ in 0..30 {
        sim.tick();
    }

    assert_eq!(sim.cascade().map(|c| c.status()), Some(CascadeStatus::Cancelled));
    assert_eq!(sim.cascade().map(|c| c.failed().to_vec()), Some(vec!["north".to_string()]));
    assert_eq!(sim.status("north").map(|s| s.status), Ok(Status::Failed));
    assert_ne!(sim.status("central").map(|s| s.status), Ok(Status::Failed));
    assert_ne!(sim.status("south").map(|s| s.status), Ok(Status::Failed));
    assert!(sim.arbiter().lock().is_none());
    assert_eq!(sim.cancel_cascade(), Err(GridError::NoActiveCascade));
}

#[test]
fn completed_cascade_releases_lock_and_spares_survivor() {
    let mut sim = simple_sim();
    sim.start_cascade(
        vec!["north".into(), "central".into(), "south".into()],
        Duration::from_secs(2),
        Some("central".into()),
    )
    .ok();
    let mut released = false;
    for _ in 0..10 {
        let snap = sim.tick();
        released |= snap
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::LockReleased { scenario_id } if scenario_id == CASCADE_SCENARIO_ID));
    }
    assert!(released);
    assert_eq!(sim.status("north").map(|s| s.status), Ok(Status::Failed));
    assert_eq!(sim.status("south").map(|s| s.status), Ok(Status::Failed));
    assert_ne!(sim.status("central").map(|s| s.status), Ok(Status::Failed));
    assert_eq!(sim.set_time(8), Ok(8));
}

#[test]
fn cascade_rejects_unknown_ids_without_locking() {
    let mut sim = simple_sim();
    assert_eq!(
        sim.start_cascade(vec!["north".into(), "atlantis".into()], Duration::ZERO, None),
        Err(GridError::InvalidSubstationId("atlantis".into()))
    );
    assert!(sim.arbiter().lock().is_none());
}

#[test]
fn v2g_demo_holds_lock_until_session_ends() {
    let mut sim = v2g_sim(parked_vehicles(20, 0.9));
    assert_eq!(sim.run_v2g_demo("north", 20.0), Ok(()));
    assert_eq!(sim.status("north").map(|s| s.status), Ok(Status::Failed));
    assert_eq!(sim.arbiter().held_by(), Some(V2G_DEMO_SCENARIO_ID));
    assert!(matches!(
        sim.set_temperature(40.0),
        Err(GridError::ConflictActiveScenario { .. })
    ));

    sim.tick();
    assert!(sim.arbiter().lock().is_none());
    assert_ne!(sim.status("north").map(|s| s.status), Ok(Status::Failed));
    assert_eq!(sim.manual_failures(), 1);
}

#[test]
fn session_without_vehicles_times_out() {
    let mut sim = v2g_sim(Vec::new());
    sim.fail("south").ok();
    sim.enable_v2g("south", 25.0).ok();

    // default recruitment timeout is 600 s, two 300 s ticks
    sim.tick();
    assert!(sim.dispatcher().session("south").is_some());
    sim.tick();
    assert!(sim.dispatcher().session("south").is_none());

    let session = sim.dispatcher().history().last().cloned();
    assert_eq!(session.as_ref().map(|s| s.status), Some(SessionStatus::TimedOut));
    assert_eq!(
        session.map(|s| s.outcome()),
        Some(Err(GridError::InsufficientAssets("south".into())))
    );
    // the substation stays down
    assert_eq!(sim.status("south").map(|s| s.status), Ok(Status::Failed));
}

#[test]
fn command_errors_leave_state_untouched() {
    let mut sim = simple_sim();
    sim.tick();
    let before = sim.snapshot();

    assert_eq!(
        sim.fail("atlantis"),
        Err(GridError::InvalidSubstationId("atlantis".into()))
    );
    assert_eq!(
        sim.restore("north"),
        Err(GridError::AlreadyOperational("north".into()))
    );
    assert_eq!(sim.enable_v2g("north", 10.0), Err(GridError::NotFailed("north".into())));
    assert_eq!(
        sim.disable_v2g("north").map(|_| ()),
        Err(GridError::NoActiveSession("north".into()))
    );
    assert!(matches!(
        sim.enable_v2g("north", -5.0),
        Err(GridError::InvalidArgument(_))
    ));

    assert_eq!(sim.snapshot(), before);
}

#[test]
fn drill_blocks_scenarios_but_not_weather_edits() {
    let mut sim = simple_sim();
    assert_eq!(sim.start_drill("storm-drill"), Ok(()));
    assert_eq!(sim.set_time(3), Ok(3));
    assert_eq!(sim.set_temperature(200.0), Ok(120.0));
    assert!(matches!(
        sim.start_cascade(vec!["north".into()], Duration::ZERO, None),
        Err(GridError::ConflictActiveScenario { .. })
    ));
    assert!(matches!(
        sim.end_drill("other"),
        Err(GridError::NotLockOwner { .. })
    ));
    assert_eq!(sim.end_drill("storm-drill"), Ok(()));
    assert!(sim.arbiter().lock().is_none());
}

#[test]
fn failed_substations_drop_out_of_city_load() {
    let mut sim = Simulation::new(
        SimConfig::new(1.0, 10, 1),
        three_substations(),
        Box::new(StaticFleet::default()),
    );
    let before = sim.tick().total_load_mw;
    sim.fail("central").ok();
    let after = sim.tick();
    assert!(after.total_load_mw < before);
    assert_eq!(after.count(Status::Failed), 1);
}
