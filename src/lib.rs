//! A message-passing library over RDMA transports: a request/response and
//! one-way messaging surface on top of a safe RDMA wrapping.
//!
//! The RDMA plumbing lives in the [`rdma`] mod, which provides mostly-safe
//! wrappers of RDMA resources and data-plane operations. The connection
//! state machine and data-path protocol ride on top of it, in [`engine`];
//! [`backend`] wires the two together.
//!
//! Aside from RDMA functionalities, there are some TCP-based connection
//! management utilities in the [`ctrl`] mod. Currently there is only a
//! connection builder ([`ctrl::Connecter`]). Some higher-level wrappings
//! of RDMA resources are in the [`wrap`] mod and under continuous development.
//!
//! **WARNING: The interfaces are unstable and up to change!**
//!
//! # Example
//!
//! This example sends and receives a message via RDMA RC QPs.
//!
//! ```rust,ignore
#![doc = include_str!("../demos/local_sendrecv.rs")]
//! ```
//!
//! (Ignored: it needs a real RDMA-capable NIC to run, and the demo's API
//! usage has drifted from this crate's current `rdma` surface — see
//! DESIGN.md.)
//!
//! [`rdma-sys`]: https://docs.rs/rdma-sys/latest/rdma_sys/

#[cfg(not(target_os = "linux"))]
compile_error!("`rmsg` currently only supports Linux");

/// Bindings of C interfaces.
pub mod bindings;

/// Shared utility functions.
mod utils;

/// RDMA functionalities.
/// Not to be publicly exposed, instead `pub use` necessary items.
mod rdma;

pub use rdma::context::*;
pub use rdma::cq::*;
pub use rdma::gid::*;
pub use rdma::mr::*;
pub use rdma::nic::*;
pub use rdma::pd::*;
pub use rdma::qp::*;
pub use rdma::wr::*;

/// Type aliases and re-exports for RDMA-related operations.
pub use rdma::types;

/// Connection management utilities.
pub mod ctrl;

/// Higher-level wrappings of RDMA resources.
pub mod wrap;

/// Connection scheduler and RDMA data-path engine, generic over its
/// external collaborators so it is unit-testable without RDMA hardware.
pub mod engine;

/// Production wiring of [`engine::iface::Verbs`] onto this crate's own RDMA
/// verbs wrapper.
pub mod backend;
