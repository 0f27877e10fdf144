//! Metadata repository pass-through: lookups and cache maintenance, one
//! operation per request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    client::{RfcConnection, RfcRepository},
    common::ensure_active,
    error::{RemoteError, RfcError, RfcResult},
    session::Session,
};

/// One repository operation. Serialized as
/// `{"operation": "GetFunctionMetadata", "name": "BAPI_USER_GET_DETAIL"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "name")]
pub enum RepositoryOperation {
    ClearAbapObjectMetadata,
    ClearAllMetadata,
    ClearFunctionMetadata,
    ClearTableMetadata,
    CreateFunction(String),
    GetAbapObjectMetadata(String),
    GetFunctionMetadata(String),
    GetStructureMetadata(String),
    GetTableMetadata(String),
    RemoveAbapObjectMetadata(String),
    RemoveFunctionMetadata(String),
    RemoveStructureMetadata(String),
    RemoveTableMetadata(String),
}

impl RepositoryOperation {
    pub fn name(&self) -> Option<&str> {
        match self {
            RepositoryOperation::ClearAbapObjectMetadata
            | RepositoryOperation::ClearAllMetadata
            | RepositoryOperation::ClearFunctionMetadata
            | RepositoryOperation::ClearTableMetadata => None,
            RepositoryOperation::CreateFunction(name)
            | RepositoryOperation::GetAbapObjectMetadata(name)
            | RepositoryOperation::GetFunctionMetadata(name)
            | RepositoryOperation::GetStructureMetadata(name)
            | RepositoryOperation::GetTableMetadata(name)
            | RepositoryOperation::RemoveAbapObjectMetadata(name)
            | RepositoryOperation::RemoveFunctionMetadata(name)
            | RepositoryOperation::RemoveStructureMetadata(name)
            | RepositoryOperation::RemoveTableMetadata(name) => Some(name),
        }
    }

    pub fn validate(&self) -> RfcResult<()> {
        match self.name() {
            Some(name) if name.trim().is_empty() => Err(RfcError::InvalidInput(
                "repository operation needs a non-empty name".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Run against `repository`. Getters and `CreateFunction` return the
    /// metadata as JSON; cache maintenance returns `None`.
    pub fn apply(&self, repository: &mut dyn RfcRepository) -> RfcResult<Option<Value>> {
        match self {
            RepositoryOperation::ClearAbapObjectMetadata => {
                repository.clear_abap_object_metadata();
                Ok(None)
            }
            RepositoryOperation::ClearAllMetadata => {
                repository.clear_all_metadata();
                Ok(None)
            }
            RepositoryOperation::ClearFunctionMetadata => {
                repository.clear_function_metadata();
                Ok(None)
            }
            RepositoryOperation::ClearTableMetadata => {
                repository.clear_table_metadata();
                Ok(None)
            }
            RepositoryOperation::CreateFunction(name) => {
                let function = repository.create_function(name).map_err(RfcError::Repository)?;
                to_json(function.metadata())
            }
            RepositoryOperation::GetAbapObjectMetadata(name) => {
                to_json(&repository.abap_object_metadata(name).map_err(RfcError::Repository)?)
            }
            RepositoryOperation::GetFunctionMetadata(name) => {
                to_json(&repository.function_metadata(name).map_err(RfcError::Repository)?)
            }
            RepositoryOperation::GetStructureMetadata(name) => {
                to_json(&repository.structure_metadata(name).map_err(RfcError::Repository)?)
            }
            RepositoryOperation::GetTableMetadata(name) => {
                to_json(&repository.table_metadata(name).map_err(RfcError::Repository)?)
            }
            RepositoryOperation::RemoveAbapObjectMetadata(name) => {
                repository.remove_abap_object_metadata(name);
                Ok(None)
            }
            RepositoryOperation::RemoveFunctionMetadata(name) => {
                repository.remove_function_metadata(name);
                Ok(None)
            }
            RepositoryOperation::RemoveStructureMetadata(name) => {
                repository.remove_structure_metadata(name);
                Ok(None)
            }
            RepositoryOperation::RemoveTableMetadata(name) => {
                repository.remove_table_metadata(name);
                Ok(None)
            }
        }
    }

    /// Open a session on `connection`, apply, and end the session.
    pub fn execute(
        &self,
        connection: Box<dyn RfcConnection>,
        cancel: &CancellationToken,
    ) -> RfcResult<Option<Value>> {
        ensure_active(cancel)?;
        let mut session = Session::start(connection)?;
        ensure_active(cancel)?;

        info!("Applying repository operation {:?}", self);
        let result = self.apply(session.connection().repository())?;
        session.end();
        Ok(result)
    }
}

fn to_json<T: Serialize>(metadata: &T) -> RfcResult<Option<Value>> {
    serde_json::to_value(metadata)
        .map(Some)
        .map_err(|e| RfcError::Repository(RemoteError::System(e.to_string())))
}

/// A repository operation against the system named by `connection_string`.
#[derive(Clone, Serialize, Deserialize)]
pub struct RepositoryRequest {
    pub connection_string: String,
    #[serde(flatten)]
    pub operation: RepositoryOperation,
}

impl RepositoryRequest {
    pub fn new(connection_string: impl Into<String>, operation: RepositoryOperation) -> Self {
        Self {
            connection_string: connection_string.into(),
            operation,
        }
    }
}

impl std::fmt::Debug for RepositoryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRequest")
            .field("connection_string", &"<redacted>")
            .field("operation", &self.operation)
            .finish()
    }
}
