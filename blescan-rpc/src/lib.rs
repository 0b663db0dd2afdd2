//! JSON-RPC-over-BLE transport: request framing, MTU-bounded chunking, id
//! allocation, incremental fragment reassembly, and the typed result
//! extraction rules BT510 firmware's flattened responses require. Carries
//! no notion of a BLE connection itself — `blescan-discovery` drives this
//! crate's types over an actual characteristic.

pub mod chunk;
pub mod id_allocator;
pub mod reassembler;
pub mod typed;
pub mod types;

pub use chunk::chunk_for_mtu;
pub use id_allocator::IdAllocator;
pub use reassembler::{parse_complete, try_extract_response};
pub use typed::RpcScalar;
pub use types::{JsonRpcRequest, JsonRpcResponse, RpcErrorObject, JSONRPC_VERSION};
