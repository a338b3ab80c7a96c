//! Tick execution and simulation orchestration for the Cadence engine.
//!
//! This crate runs agents from `cadence-agents` in lock-step ticks: every
//! scheduled agent deliberates once per tick on a fixed worker pool, and the
//! tick ends only when all of them have finished.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `cadence-config.yaml`.
//! - [`executor`] -- [`TickExecutor`], the keyed schedule and worker pool.
//! - [`engine`] -- [`SimulationEngine`], tick hooks, and [`StopHandle`].
//! - [`platform`] -- [`Platform`], which spawns and kills agents.
//! - [`messenger`] -- [`LocalMessenger`] for in-process delivery.
//! - [`codec`] -- [`MessageCodec`] and the JSON codec.
//!
//! [`TickExecutor`]: executor::TickExecutor
//! [`SimulationEngine`]: engine::SimulationEngine
//! [`StopHandle`]: engine::StopHandle
//! [`Platform`]: platform::Platform
//! [`LocalMessenger`]: messenger::LocalMessenger
//! [`MessageCodec`]: codec::MessageCodec

pub mod codec;
pub mod config;
pub mod engine;
pub mod executor;
pub mod messenger;
pub mod platform;
