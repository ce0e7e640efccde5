//! Wire format and collaborator interfaces for the membership and
//! rebuild-orchestration core.
//!
//! Everything outside this crate that the core talks to — the RPC
//! transport, the pool-map/leader-term service, the IV dissemination
//! tree — is out of scope per the design's purpose statement; this crate
//! is the seam: wire structs plus `async_trait` traits the engines invoke
//! through, and an in-memory mock implementation for tests.

pub mod fault;
pub mod mock;
pub mod rebuild_transport;
pub mod rebuild_wire;
pub mod swim_transport;
pub mod swim_wire;

pub use fault::DropRpcFaultInjector;
pub use rebuild_transport::{IvSyncMode, IvSyncPayload, IvTree, PoolMapService, RebuildTransport};
pub use rebuild_wire::{aggregate_scan_replies, ObjectsScanReply, ObjectsScanRequest};
pub use swim_transport::{parse_fault_args, FaultInjector, ProbeError, SwimTransport};
pub use swim_wire::{decode_update_record, encode_update_record, SwimHeader, SwimOpcode, SwimReply, SwimRequest, WIRE_RECORD_SIZE};
