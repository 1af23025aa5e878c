//! Invocation harness for qcensus.

pub mod invocation;
pub mod routes;
pub mod telemetry;

pub use invocation::{InvocationEvent, InvocationResponse, Invoker};
pub use routes::create_router;
