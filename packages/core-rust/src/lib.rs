//! RPA core: step documents, operation results, JSON-RPC message schemas, and
//! step identity assignment.

pub mod identity;
pub mod rpc;
pub mod step;
pub mod types;

pub use identity::{StepIdentity, StepIdentityRegistry};
pub use rpc::{
    error_codes, method_names, notification_names, OutgoingMessage, RequestDecodeError,
    ResponsePayload, RpcError, RpcNotification, RpcRequest, RpcResponse, JSONRPC_VERSION,
};
pub use step::{Step, StepResult, StepStatus};
pub use types::{OperationKey, OperationResult, OperationStatus, Params};
