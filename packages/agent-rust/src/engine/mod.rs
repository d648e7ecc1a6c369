//! Step execution engine: catalog, handler contract, shared session, workflow
//! runner, and catalog document generation.

pub mod catalog;
pub mod document;
pub mod handler;
pub mod runner;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;

pub use catalog::{CatalogBuilder, CatalogError, OperationCatalog, OperationDescriptor, OperationEntry};
pub use document::{generate_document, CatalogDocument, DocumentStep};
pub use handler::{missing_params, validate_params, HandlerFactory, OperationError, OperationHandler};
pub use runner::{WorkflowError, WorkflowRunner};
pub use session::SharedSession;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
