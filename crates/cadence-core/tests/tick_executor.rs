//! Integration tests for the tick executor: barrier coverage, keyed
//! scheduling, failure isolation, deadlines, and seeded ordering.
//!
//! Agents are spawned through a [`Platform`] so they are wired to the
//! executor exactly as in a running simulation.

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_agents::{
    AgentArguments, AgentView, DeliberationRunnable, PlanContext, PlanError, Scheduler, run_once,
    scheme_fn,
};
use cadence_core::config::ExecutorConfig;
use cadence_core::executor::AgentFailure;
use cadence_core::platform::Platform;
use cadence_types::{AgentId, Trigger};

type Action = String;

fn platform(pool_size: usize) -> Platform<Action> {
    Platform::new(&ExecutorConfig {
        pool_size,
        ..ExecutorConfig::default()
    })
    .unwrap()
}

fn say(text: &'static str) -> AgentArguments<Action> {
    AgentArguments::new().add_initial_plan(run_once(move |_: &mut PlanContext<'_, Action>| {
        Ok(Some(text.to_owned()))
    }))
}

#[test]
fn tick_covers_exactly_the_scheduled_agents() {
    let platform = platform(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let ids: Vec<AgentId> = (0..6)
        .map(|i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let args = AgentArguments::new().add_initial_plan(run_once(
                move |_: &mut PlanContext<'_, Action>| {
                    let now = running.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(Some(format!("agent{i}")))
                },
            ));
            platform.spawn_agent(args).id()
        })
        .collect();

    let results = platform.executor().do_tick().unwrap();
    assert_eq!(results.keys().copied().collect::<Vec<_>>(), {
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted
    });
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(results[id].as_ref().unwrap(), &vec![format!("agent{i}")]);
    }
    assert_eq!(running.load(Ordering::SeqCst), 0);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(platform.executor().current_tick(), 1);
}

#[test]
fn scheduling_twice_runs_once() {
    let platform = platform(2);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let agent = platform.spawn_agent(AgentArguments::new().add_initial_plan(run_once(
        move |_: &mut PlanContext<'_, Action>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        },
    )));

    let executor = platform.executor();
    assert!(executor.schedule_for_next_tick(DeliberationRunnable::new(Arc::clone(&agent))));
    assert!(executor.schedule_for_next_tick(DeliberationRunnable::new(Arc::clone(&agent))));
    assert_eq!(executor.nof_scheduled_agents(), 1);

    let results = executor.do_tick().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn agents_woken_during_a_tick_run_in_the_next_one() {
    let platform = platform(2);
    let target = platform.spawn_agent(AgentArguments::new().add_external_trigger_plan_scheme(
        scheme_fn(|trigger: &Trigger, _: &AgentView<'_>| {
            let value = *trigger.payload()?.downcast_ref::<u32>()?;
            Some(run_once(move |_: &mut PlanContext<'_, Action>| {
                Ok(Some(format!("target got {value}")))
            }))
        }),
    ));
    let poked = Arc::clone(&target);
    let poker = platform.spawn_agent(AgentArguments::new().add_external_trigger_plan_scheme(
        scheme_fn(move |trigger: &Trigger, _: &AgentView<'_>| {
            trigger.payload()?.downcast_ref::<&str>()?;
            let target = Arc::clone(&poked);
            Some(run_once(move |_: &mut PlanContext<'_, Action>| {
                target.add_external_trigger(Trigger::external(7_u32));
                Ok(Some("poked".to_owned()))
            }))
        }),
    ));

    let executor = platform.executor();
    // Both start idle.
    executor.do_tick().unwrap();
    assert_eq!(executor.nof_scheduled_agents(), 0);

    poker.add_external_trigger(Trigger::external("go"));
    let during = executor.do_tick().unwrap();
    assert_eq!(during.keys().copied().collect::<Vec<_>>(), vec![poker.id()]);
    assert!(executor.scheduled_agents().contains(&target.id()));

    let next = executor.do_tick().unwrap();
    assert_eq!(next[&target.id()].as_ref().unwrap(), &vec!["target got 7".to_owned()]);
}

#[test]
fn failures_are_isolated_to_their_agent() {
    let platform = platform(3);
    let healthy = platform.spawn_agent(say("fine")).id();
    let failing = platform
        .spawn_agent(AgentArguments::new().add_initial_plan(run_once(
            |_: &mut PlanContext<'_, Action>| Err(PlanError::failed("boom")),
        )))
        .id();
    let panicking = platform
        .spawn_agent(AgentArguments::new().add_initial_plan(run_once(
            |_: &mut PlanContext<'_, Action>| -> Result<Option<Action>, PlanError> {
                panic!("kaboom")
            },
        )))
        .id();

    let results = platform.executor().do_tick().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[&healthy].as_ref().unwrap(), &vec!["fine".to_owned()]);
    assert!(matches!(
        results[&failing],
        Err(AgentFailure::Deliberation { .. })
    ));
    match &results[&panicking] {
        Err(AgentFailure::Panicked { message }) => assert!(message.contains("kaboom")),
        other => panic!("expected a panic slot, got {other:?}"),
    }
}

#[test]
fn slow_agent_times_out_without_holding_up_the_tick() {
    let platform: Platform<Action> = Platform::new(&ExecutorConfig {
        pool_size: 2,
        unit_timeout_ms: Some(50),
        ..ExecutorConfig::default()
    })
    .unwrap();
    let fast = platform.spawn_agent(say("quick")).id();
    let slow = platform
        .spawn_agent(AgentArguments::new().add_initial_plan(run_once(
            |_: &mut PlanContext<'_, Action>| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(Some("late".to_owned()))
            },
        )))
        .id();

    let results = platform.executor().do_tick().unwrap();
    assert_eq!(results[&fast].as_ref().unwrap(), &vec!["quick".to_owned()]);
    assert!(matches!(
        results[&slow],
        Err(AgentFailure::TimedOut { timeout_ms: 50 })
    ));
    assert!(!platform.executor().scheduled_agents().contains(&slow));
}

fn sleeper(millis: u64) -> AgentArguments<Action> {
    AgentArguments::new().add_initial_plan(run_once(move |_: &mut PlanContext<'_, Action>| {
        std::thread::sleep(Duration::from_millis(millis));
        Ok(Some("late".to_owned()))
    }))
}

fn single_worker_with_deadline(timeout_ms: u64) -> Platform<Action> {
    Platform::new(&ExecutorConfig {
        pool_size: 1,
        unit_timeout_ms: Some(timeout_ms),
        ..ExecutorConfig::default()
    })
    .unwrap()
}

#[test]
fn abandoned_cycle_does_not_time_out_the_next_tick() {
    let platform = single_worker_with_deadline(50);
    let slow = platform.spawn_agent(sleeper(300)).id();

    let first = platform.executor().do_tick().unwrap();
    assert!(matches!(
        first[&slow],
        Err(AgentFailure::TimedOut { timeout_ms: 50 })
    ));

    // The only worker is still busy with the abandoned cycle; the deadline
    // must not start until this agent is actually running.
    let fast = platform.spawn_agent(say("quick")).id();
    let second = platform.executor().do_tick().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[&fast].as_ref().unwrap(), &vec!["quick".to_owned()]);
}

#[test]
fn agent_with_abandoned_cycle_is_deferred_until_it_returns() {
    let platform = single_worker_with_deadline(50);
    let slow = platform.spawn_agent(sleeper(300));
    let id = slow.id();

    let first = platform.executor().do_tick().unwrap();
    assert!(matches!(first[&id], Err(AgentFailure::TimedOut { .. })));

    slow.wake();
    let second = platform.executor().do_tick().unwrap();
    assert!(matches!(second[&id], Err(AgentFailure::StillRunning)));
    assert!(platform.executor().scheduled_agents().contains(&id));

    std::thread::sleep(Duration::from_millis(500));
    let third = platform.executor().do_tick().unwrap();
    assert!(third[&id].as_ref().unwrap().is_empty());
}

fn run_order(seed: Option<u64>, ids: &[AgentId]) -> Vec<AgentId> {
    let platform: Platform<Action> = Platform::new(&ExecutorConfig {
        pool_size: 1,
        seed,
        ..ExecutorConfig::default()
    })
    .unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for id in ids {
        let order = Arc::clone(&order);
        platform
            .spawn_agent_with_id(
                *id,
                AgentArguments::new().add_initial_plan(run_once(
                    move |ctx: &mut PlanContext<'_, Action>| {
                        order.lock().unwrap().push(ctx.agent_id());
                        Ok(None)
                    },
                )),
            )
            .unwrap();
    }
    platform.executor().do_tick().unwrap();
    order.lock().unwrap().clone()
}

#[test]
fn seeded_order_is_reproducible() {
    let ids: Vec<AgentId> = (0..8).map(|_| AgentId::new()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();

    assert_eq!(run_order(None, &ids), sorted);

    let first = run_order(Some(42), &ids);
    let second = run_order(Some(42), &ids);
    assert_eq!(first, second);
    let mut covered = first.clone();
    covered.sort_unstable();
    assert_eq!(covered, sorted);
}

#[test]
fn pool_runs_unrelated_tasks() {
    let platform = platform(2);
    let tasks: Vec<_> = (1_u32..=4).map(|n| move || n.saturating_mul(n)).collect();
    let squares = platform.executor().use_executor_for_tasks(tasks).unwrap();
    assert_eq!(squares, vec![1, 4, 9, 16]);
}
