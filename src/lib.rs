//! # Drive Zoo
//!
//! Orchestration for training reinforcement-learning driving agents: per-algorithm
//! YAML hyperparameters, environment composition (normalization, frame stacking,
//! optional visual encoder), exploration noise, numbered run directories, plus
//! a sequential batch runner and an offline frame stacker.
//!
//! Algorithms, simulators and encoders are provided by a backend through the
//! [`algos::AlgorithmFactory`] and [`env::EnvBackend`] traits.
//!
//! This crate builds no `train` binary. A backend crate provides one whose
//! `main` registers its factories and calls [`training::run_cli`]; the batch
//! plans under `plans/` that run `program = "train"` expect it on `PATH`.
//!
//! ## Modules
//!
//! - [`hyperparams`] — YAML loader, control keys, schedules
//! - [`env`] — environment traits and wrapper layers, composer
//! - [`noise`] — action and parameter noise
//! - [`algos`] — algorithm keys, model interface, factory registry
//! - [`training`] — training driver and its CLI
//! - [`checkpoint`] — run directories and saved artifacts
//! - [`batch`] — batch runner
//! - [`frames`] — frame stacker
//! - [`config`] — TOML settings loading and validation
//! - [`error`] — Structured error types
//! - [`telemetry`] — logging setup

pub mod algos;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod env;
pub mod error;
pub mod frames;
pub mod hyperparams;
pub mod noise;
pub mod telemetry;
pub mod training;
