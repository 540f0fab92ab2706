pub mod builtin;
pub mod http_call;
pub mod records;
pub mod registry;
pub mod transport;
pub mod verify;

pub use http_call::{HttpCallSpec, HttpCaller};
pub use records::RestRecordLookup;
pub use registry::{BuiltinDeps, NodeRegistry, RegistryEntry};
pub use transport::ReqwestTransport;
pub use verify::{RetryPolicy, VerificationTarget, Verifier};
