//! End-to-end scenarios driven through the platform and the simulation
//! engine: goal pursuit across ticks, enhanced interceptors, multi-tick
//! plans, messaging between agents, and engine hooks.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_agents::{
    AgentArguments, AgentView, EnhancedInterceptor, PlanContext, TriggerInterceptor, decoupled,
    plan_fn, run_once, scheme_fn,
};
use cadence_core::config::ExecutorConfig;
use cadence_core::engine::{SimulationEndReason, SimulationEngine, StopHandle, TickHookProcessor};
use cadence_core::executor::TickResults;
use cadence_core::platform::Platform;
use cadence_types::{AgentId, ContextContainer, Goal, GoalHandle, Message, Trigger, TriggerKind};

type Action = String;

fn platform() -> Arc<Platform<Action>> {
    Arc::new(
        Platform::new(&ExecutorConfig {
            pool_size: 2,
            ..ExecutorConfig::default()
        })
        .unwrap(),
    )
}

/// Achieved once the agent's `AtomicBool` context is set.
#[derive(Debug)]
struct FlagRaised;

impl Goal for FlagRaised {
    fn is_achieved(&self, contexts: &ContextContainer) -> bool {
        contexts
            .get::<AtomicBool>()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[test]
fn goal_plan_acts_once_then_agent_goes_quiet() {
    let platform = platform();
    let agent = platform.spawn_agent(
        AgentArguments::new()
            .add_context(AtomicBool::new(false))
            .add_goal_plan_scheme(scheme_fn(|trigger: &Trigger, _: &AgentView<'_>| {
                trigger.as_goal()?.downcast_ref::<FlagRaised>()?;
                Some(run_once(|ctx: &mut PlanContext<'_, Action>| {
                    ctx.require_context::<AtomicBool>()?.store(true, Ordering::SeqCst);
                    Ok(Some("act1".to_owned()))
                }))
            })),
    );
    let goal = GoalHandle::new(FlagRaised);
    agent.adopt_goal(goal.clone());
    let executor = platform.executor();

    let first = executor.do_tick().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[&agent.id()].as_ref().unwrap(), &vec!["act1".to_owned()]);

    let second = executor.do_tick().unwrap();
    assert!(second[&agent.id()].as_ref().unwrap().is_empty());
    assert!(agent.goals().is_empty());
    assert!(!goal.is_pursued());

    assert!(executor.do_tick().unwrap().is_empty());
}

fn echo(tag: &'static str) -> TriggerInterceptor<Action> {
    TriggerInterceptor::new(
        false,
        scheme_fn(move |trigger: &Trigger, _: &AgentView<'_>| {
            let content = trigger.as_message()?.content.clone();
            Some(run_once(move |_: &mut PlanContext<'_, Action>| {
                Ok(Some(format!("{tag}:{content}")))
            }))
        }),
    )
}

#[test]
fn enhanced_interceptor_disarms_its_sibling_across_ticks() {
    let platform = platform();
    let sibling = echo("sibling");
    let enhanced = EnhancedInterceptor::new(
        true,
        |trigger: &Trigger| trigger.as_message().is_some(),
        decoupled(|trigger: &Trigger, ctx: &mut PlanContext<'_, Action>| {
            ctx.finish();
            let content = trigger.as_message().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Some(format!("accepted:{content}")))
        }),
    )
    .remove_on_fire(TriggerKind::Message, sibling.id());
    let agent = platform.spawn_agent(
        AgentArguments::new()
            .add_interceptor(TriggerKind::Message, enhanced.into_interceptor())
            .add_interceptor(TriggerKind::Message, sibling),
    );
    let executor = platform.executor();
    executor.do_tick().unwrap();

    agent.receive_message(Message::new(AgentId::new(), "offer"));
    let fired = executor.do_tick().unwrap();
    assert_eq!(fired[&agent.id()].as_ref().unwrap(), &vec!["accepted:offer".to_owned()]);
    assert_eq!(agent.interceptor_count(TriggerKind::Message), 0);

    agent.receive_message(Message::new(AgentId::new(), "late offer"));
    let after = executor.do_tick().unwrap();
    assert!(after[&agent.id()].as_ref().unwrap().is_empty());
}

#[test]
fn long_running_plan_keeps_agent_scheduled_until_done() {
    let platform = platform();
    let mut runs = 0_u32;
    let agent = platform.spawn_agent(AgentArguments::new().add_initial_plan(plan_fn(
        move |ctx: &mut PlanContext<'_, Action>| {
            runs = runs.saturating_add(1);
            if runs == 4 {
                ctx.finish();
            }
            Ok(Some(format!("run{runs}")))
        },
    )));
    let executor = platform.executor();

    for expected in 1..=3 {
        let results = executor.do_tick().unwrap();
        assert_eq!(results[&agent.id()].as_ref().unwrap(), &vec![format!("run{expected}")]);
        assert_eq!(agent.active_plan_count(), 1);
        assert_eq!(executor.scheduled_agents(), vec![agent.id()]);
    }

    let last = executor.do_tick().unwrap();
    assert_eq!(last[&agent.id()].as_ref().unwrap(), &vec!["run4".to_owned()]);
    assert_eq!(agent.active_plan_count(), 0);

    let quiet = executor.do_tick().unwrap();
    assert!(quiet[&agent.id()].as_ref().unwrap().is_empty());
    assert_eq!(executor.nof_scheduled_agents(), 0);
}

#[test]
fn internal_triggers_surface_in_the_next_tick() {
    let platform = platform();
    let agent = platform.spawn_agent(
        AgentArguments::new()
            .add_initial_plan(run_once(|ctx: &mut PlanContext<'_, Action>| {
                ctx.raise(3_u8);
                Ok(Some("raised".to_owned()))
            }))
            .add_internal_trigger_plan_scheme(scheme_fn(|trigger: &Trigger, _: &AgentView<'_>| {
                let value = *trigger.payload()?.downcast_ref::<u8>()?;
                Some(run_once(move |_: &mut PlanContext<'_, Action>| {
                    Ok(Some(format!("handled {value}")))
                }))
            })),
    );
    let executor = platform.executor();

    assert_eq!(
        executor.do_tick().unwrap()[&agent.id()].as_ref().unwrap(),
        &vec!["raised".to_owned()]
    );
    assert_eq!(
        executor.do_tick().unwrap()[&agent.id()].as_ref().unwrap(),
        &vec!["handled 3".to_owned()]
    );
}

/// Collect every agent's actions until the schedule drains.
fn drain(platform: &Platform<Action>, max_ticks: usize) -> BTreeMap<AgentId, Vec<Action>> {
    let mut collected: BTreeMap<AgentId, Vec<Action>> = BTreeMap::new();
    for _ in 0..max_ticks {
        if platform.executor().nof_scheduled_agents() == 0 {
            break;
        }
        for (agent_id, slot) in platform.executor().do_tick().unwrap() {
            collected.entry(agent_id).or_default().extend(slot.unwrap());
        }
    }
    collected
}

#[test]
fn ping_pong_through_the_messenger() {
    let platform = platform();
    let ponger = platform.spawn_agent(AgentArguments::new().add_message_plan_scheme(scheme_fn(
        |trigger: &Trigger, _: &AgentView<'_>| {
            let message = trigger.as_message()?;
            if message.content != "ping" {
                return None;
            }
            let reply_to = message.sender;
            Some(run_once(move |ctx: &mut PlanContext<'_, Action>| {
                ctx.send(Message::new(ctx.agent_id(), "pong").to(reply_to))?;
                Ok(Some("sent pong".to_owned()))
            }))
        },
    )));
    let ponger_id = ponger.id();
    let pinger = platform.spawn_agent(
        AgentArguments::new()
            .add_initial_plan(run_once(move |ctx: &mut PlanContext<'_, Action>| {
                ctx.send(Message::new(ctx.agent_id(), "ping").to(ponger_id))?;
                Ok(Some("sent ping".to_owned()))
            }))
            .add_message_plan_scheme(scheme_fn(|trigger: &Trigger, _: &AgentView<'_>| {
                let content = trigger.as_message()?.content.clone();
                Some(run_once(move |_: &mut PlanContext<'_, Action>| {
                    Ok(Some(format!("got {content}")))
                }))
            })),
    );

    let collected = drain(&platform, 10);
    assert_eq!(collected[&pinger.id()], vec!["sent ping", "got pong"]);
    assert_eq!(collected[&ponger_id], vec!["sent pong"]);
}

#[test]
fn sending_to_a_killed_agent_fails_the_plan() {
    let platform = platform();
    let gone = platform.spawn_agent(AgentArguments::new()).id();
    platform.kill_agent(gone).unwrap();
    let sender = platform.spawn_agent(AgentArguments::new().add_initial_plan(run_once(
        move |ctx: &mut PlanContext<'_, Action>| {
            ctx.send(Message::new(ctx.agent_id(), "hello?").to(gone))?;
            Ok(None)
        },
    )));

    let results = platform.executor().do_tick().unwrap();
    assert!(results[&sender.id()].is_err());
    assert!(results[&gone].as_ref().unwrap().is_empty());
}

#[derive(Default)]
struct TickLog {
    actions_per_tick: Mutex<Vec<(u64, usize)>>,
    finished: Mutex<Option<u64>>,
}

impl TickHookProcessor<Action> for TickLog {
    fn tick_post_hook(&self, tick: u64, _duration: Duration, results: &TickResults<Action>) {
        let actions = results
            .values()
            .filter_map(|slot| slot.as_ref().ok())
            .map(Vec::len)
            .sum();
        self.actions_per_tick.lock().unwrap().push((tick, actions));
    }

    fn simulation_finished_hook(&self, last_tick: u64, _last_tick_duration: Duration) {
        *self.finished.lock().unwrap() = Some(last_tick);
    }
}

/// Stops the simulation once a given tick has completed.
struct StopAfter {
    tick: u64,
    handle: StopHandle,
}

impl TickHookProcessor<Action> for StopAfter {
    fn tick_post_hook(&self, tick: u64, _duration: Duration, _results: &TickResults<Action>) {
        if tick >= self.tick {
            self.handle.stop();
        }
    }
}

#[test]
fn engine_runs_hooks_and_reaps_stopped_agents() {
    let platform = platform();
    platform.spawn_agent(
        AgentArguments::new()
            .add_initial_plan(run_once(|ctx: &mut PlanContext<'_, Action>| {
                ctx.request_stop();
                Ok(Some("working".to_owned()))
            }))
            .add_shutdown_plan(run_once(|_: &mut PlanContext<'_, Action>| {
                Ok(Some("goodbye".to_owned()))
            })),
    );
    let log = Arc::new(TickLog::default());
    let mut engine = SimulationEngine::new(Arc::clone(&platform), 3);
    engine.register_hook(Arc::clone(&log) as Arc<dyn TickHookProcessor<Action>>);

    let summary = engine.run().unwrap();
    assert_eq!(summary.ticks_run, 3);
    assert_eq!(summary.last_tick, Some(2));
    assert_eq!(summary.end_reason, SimulationEndReason::IterationsReached);
    assert_eq!(*log.actions_per_tick.lock().unwrap(), vec![(0, 1), (1, 1), (2, 0)]);
    assert_eq!(*log.finished.lock().unwrap(), Some(3));
    assert_eq!(platform.agent_count(), 0);
    assert!(platform.messenger().registered_agents().is_empty());
}

#[test]
fn unbounded_engine_ends_through_its_stop_handle() {
    let platform = platform();
    platform.spawn_agent(AgentArguments::new().add_initial_plan(plan_fn(
        |_: &mut PlanContext<'_, Action>| Ok(Some("forever".to_owned())),
    )));
    let mut engine = SimulationEngine::new(Arc::clone(&platform), 0);
    let stopper = StopAfter {
        tick: 4,
        handle: engine.stop_handle(),
    };
    engine.register_hook(Arc::new(stopper));

    let summary = engine.run().unwrap();
    assert_eq!(summary.ticks_run, 5);
    assert_eq!(summary.end_reason, SimulationEndReason::StopRequested);
    assert!(platform.executor().is_shut_down());
}
