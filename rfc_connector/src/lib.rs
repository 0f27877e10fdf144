//! Connector for remote function modules of an enterprise back-end.
//!
//! Provides:
//! - Batch invocation of arbitrary function modules from a nested parameter tree
//! - Table reads through a generic table reader function, with filter chunking
//!   and packed row decoding
//! - Metadata repository lookups and cache maintenance
//!
//! The RFC client library itself is consumed through the traits in [`client`].
//! [`MemoryRfcClient`] is an in-process implementation for tests and local use.

mod common;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod invoker;
pub mod memory;
pub mod parameters;
pub mod query;
pub mod repository;
mod service;
pub mod session;
pub mod types;

// Re-export client seam
pub use client::{
    AbapObjectMetadata, DataContainer, Direction, FieldMetadata, FunctionMetadata,
    ParameterMetadata, RfcClient, RfcConnection, RfcFunction, RfcRepository, RfcTable,
    StructureMetadata, TableMetadata,
};
pub use config::{ConnectionParams, ConnectorConfig, QueryOptions, ReadTableFunction};
pub use error::{RemoteError, RemoteResult, RfcError, RfcResult};
pub use filter::{filter_chunks, split_filter, FilterChunks, DEFAULT_FILTER_MAX_LEN};
pub use invoker::{CallResult, FunctionInvoker, FunctionOutput};
// Re-export memory implementation for testing
pub use memory::{CallEvent, MemoryRfcClient};
pub use parameters::{
    ExecuteFunctionInput, Field, FunctionInput, InputType, SimpleFunctionInput,
    SimpleStructure, Structure, Table,
};
pub use query::{PreparedQuery, TableQuery, TableQueryEngine, TableQueryRecord};
pub use repository::{RepositoryOperation, RepositoryRequest};
pub use service::RfcConnector;
pub use session::Session;
pub use types::{RfcType, RfcValue, ValueKind};
