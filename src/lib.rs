//! # lou
//!
//! A script bridge for a small 2D host, embedding QuickJS through `rquickjs`.
//!
//! ## Features
//!
//! - **Tagged handles**: native objects live in a generation-checked store; scripts hold owning or reference handles
//! - **Dispatch tables**: per-type field/method/tostring/arithmetic tables with interned method names
//! - **Callback lists**: ordered script closures per event with error isolation and idempotent unbind
//! - **Module loader**: path resolution, non-suspendable module bodies and a per-path cache
//! - **Lockdown**: built-ins and globals are deep-frozen before any script runs
//!
//! ### Example
//!
//! ```no_run
//! use lou::config::HostConfig;
//! use lou::core::Host;
//!
//! let (mut host, _probe) = Host::headless(HostConfig::default())?;
//! host.eval("lou.on_update((dt) => print('tick', dt))", "repl");
//! host.frame();
//! # Ok::<(), lou::core::HostError>(())
//! ```
//!
//! ## Modules
//!
//! - [`bridge`]: tags, interning, the native store, handles and dispatch
//! - [`callbacks`]: callback lists and subscriptions
//! - [`modules`]: the module loader
//! - [`natives`]: types exposed to scripts
//! - [`platform`]: collaborator traits and headless implementations
//! - [`core`]: errors, logging and the host frame loop

/// Core host functionality including the boot sequence and frame loop
pub mod core;
/// Tag registry, handles and dispatch tables
pub mod bridge;
/// Callback registry
pub mod callbacks;
/// Configuration system
pub mod config;
/// Module loader
pub mod modules;
/// Native types exposed to scripts
pub mod natives;
/// Platform abstraction layer (window, canvas, graphics, events)
pub mod platform;
