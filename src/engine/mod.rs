//! The connection-state-machine/scheduler and RDMA data-path engine at the
//! core of this crate: a credit-based sliding-window
//! protocol over RDMA Send/Receive and RDMA Read/Write verbs, presenting a
//! request/response and one-way messaging surface to applications.
//!
//! This module is generic over its four external collaborators ([`iface`])
//! so the scheduler and data-path logic are unit-testable without real
//! RDMA hardware; [`crate::backend`] wires the production [`iface::Verbs`]
//! implementation to this crate's own [`crate::rdma`] wrapper.

/// Tunables and wire constants.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Interfaces consumed from external collaborators.
pub mod iface;

/// The application-visible message envelope.
pub mod message;

/// Task pool and message buffer.
pub mod task;

/// Credit-based sliding-window flow control and the RDMA handle.
pub mod window;

/// On-the-wire TLV envelope and headers.
pub mod wire;

/// Connection scheduler: admission, budgets, round-robin pump.
pub mod connection;

/// Wires the scheduler, data-path engine, window, reactor, close state
/// machine, and cancel subsystem together against a concrete
/// [`iface::Verbs`]/[`iface::SessionHooks`] pair.
pub mod channel;

/// Graceful close state machine.
pub mod close;

/// Cancel subsystem.
pub mod cancel;

/// Transfer-mode decision and RDMA work-request segmentation.
pub mod datapath;

/// Completion-queue reactor.
pub mod reactor;

/// In-process fakes for [`iface`]'s traits, for tests.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
