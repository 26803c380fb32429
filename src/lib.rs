//! calltree - per-test call-tree tracer
//!
//! This library reconstructs, for every test function a test run executes,
//! the nested tree of calls it makes into the project's own source, with
//! arguments and source locations. Calls into the runtime and installed
//! dependencies are dropped; tracked packages are summarized as a single
//! boundary call.
//!
//! The engine consumes call/return events through [`engine::TraceHook`] and
//! a runtime-neutral [`frame::FrameSnapshot`], so it can be driven by a live
//! hook or by a recorded JSON-lines stream ([`events`]). For Python test
//! commands the stream is produced by the [`hook`] module the driver installs.

pub mod call_tree;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod driver;
pub mod engine;
pub mod events;
pub mod frame;
pub mod hook;
pub mod report;
