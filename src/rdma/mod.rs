// RDMA contexts.
pub mod context;

// RDMA completion queues.
pub mod cq;

// RDMA devices and device lists.
pub mod device;

// RDMA device GIDs.
pub mod gid;

// Local RDMA memory regions.
pub mod mr;

// RDMA NICs and ports.
pub mod nic;

// RDMA protection domains.
pub mod pd;

// RDMA queue pairs.
pub mod qp;

// RDMA shared receive queues.
pub mod srq;

// Type aliases for RDMA identifiers (QPN, PSN, LKey, ...).
pub mod type_alias;

// Further type aliases and re-exports for RDMA-related operations.
pub mod types;

// RDMA work requests.
pub mod wr;
