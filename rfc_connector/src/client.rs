// client.rs
//
// Capability surface of the RFC client library the connector drives.
// The connector never speaks the wire protocol itself; it only needs these
// traits. Implementations are blocking, so the async facade runs them on
// the blocking thread pool.
//
// Structure:
// 1. Metadata types
// 2. Container traits (DataContainer, RfcTable, RfcFunction)
// 3. Connection traits (RfcClient, RfcConnection, RfcRepository)

use serde::{Deserialize, Serialize};

use crate::{
    config::ConnectionParams,
    error::RemoteResult,
    types::{RfcType, RfcValue, ValueKind},
};

// ============================================================================
// PART 1: Metadata
// ============================================================================

/// One element of a structure or table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    pub data_type: RfcType,
    /// Declared length in characters (digits for NUM).
    #[serde(default)]
    pub length: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub decimals: usize,
    /// Element layout for STRUCTURE fields, row layout for TABLE fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_type: Option<StructureMetadata>,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, data_type: RfcType, length: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            length,
            decimals: 0,
            line_type: None,
        }
    }

    pub fn structure(name: impl Into<String>, line_type: StructureMetadata) -> Self {
        Self {
            line_type: Some(line_type),
            ..Self::new(name, RfcType::Structure, 0)
        }
    }

    pub fn table(name: impl Into<String>, line_type: StructureMetadata) -> Self {
        Self {
            line_type: Some(line_type),
            ..Self::new(name, RfcType::Table, 0)
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        ValueKind::for_field(&self.data_type, self.length)
    }
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructureMetadata {
    pub name: String,
    pub fields: Vec<FieldMetadata>,
}

impl StructureMetadata {
    pub fn new(name: impl Into<String>, fields: Vec<FieldMetadata>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub line_type: StructureMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbapObjectMetadata {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<FieldMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Import,
    Export,
    Changing,
    Tables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    pub name: String,
    pub direction: Direction,
    pub data_type: RfcType,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_type: Option<StructureMetadata>,
}

impl ParameterMetadata {
    pub fn scalar(
        name: impl Into<String>,
        direction: Direction,
        data_type: RfcType,
        length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type,
            length,
            optional: false,
            line_type: None,
        }
    }

    /// A TABLES parameter with the given row layout.
    pub fn table(name: impl Into<String>, line_type: StructureMetadata) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Tables,
            data_type: RfcType::Table,
            length: 0,
            optional: true,
            line_type: Some(line_type),
        }
    }

    /// A structured parameter (IMPORT/EXPORT/CHANGING of STRUCTURE type).
    pub fn structure(
        name: impl Into<String>,
        direction: Direction,
        line_type: StructureMetadata,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type: RfcType::Structure,
            length: 0,
            optional: false,
            line_type: Some(line_type),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// View as a container element, for code shared with structure fields.
    pub fn as_field(&self) -> FieldMetadata {
        FieldMetadata {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            length: self.length,
            decimals: 0,
            line_type: self.line_type.clone(),
        }
    }
}

/// Declared interface of a remote function module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub name: String,
    pub parameters: Vec<ParameterMetadata>,
}

impl FunctionMetadata {
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterMetadata>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterMetadata> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Names of TABLES parameters, in declaration order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.direction == Direction::Tables)
            .map(|p| p.name.as_str())
    }

    /// Names of EXPORT parameters, in declaration order.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.direction == Direction::Export)
            .map(|p| p.name.as_str())
    }
}

// ============================================================================
// PART 2: Containers
// ============================================================================

/// Anything that holds named elements: a function's parameter list, a
/// structure, or one row of a table.
pub trait DataContainer: Send {
    /// Set a scalar element from its textual form. The implementation converts
    /// the text to the element's declared type.
    fn set_value(&mut self, name: &str, value: &str) -> RemoteResult<()>;

    /// Read a scalar element as the requested representation.
    fn get_value(&self, name: &str, kind: ValueKind) -> RemoteResult<RfcValue>;

    fn table(&mut self, name: &str) -> RemoteResult<&mut dyn RfcTable>;

    fn structure(&mut self, name: &str) -> RemoteResult<&mut dyn DataContainer>;

    fn get_string(&self, name: &str) -> RemoteResult<String> {
        match self.get_value(name, ValueKind::String)? {
            RfcValue::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

/// A table parameter: an ordered sequence of rows sharing one layout.
pub trait RfcTable: Send {
    fn line_type(&self) -> &StructureMetadata;

    /// Create a detached row from the table's line type.
    fn new_row(&self) -> Box<dyn DataContainer>;

    /// Append a row created by `new_row` at the end of the table.
    fn append_row(&mut self, row: Box<dyn DataContainer>) -> RemoteResult<()>;

    fn row_count(&self) -> usize;

    fn row(&self, index: usize) -> RemoteResult<&dyn DataContainer>;
}

/// A function handle created from repository metadata.
pub trait RfcFunction: DataContainer {
    fn metadata(&self) -> &FunctionMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

// ============================================================================
// PART 3: Connections
// ============================================================================

/// Opens physical connections. Shared by all calls of a connector.
pub trait RfcClient: Send + Sync + 'static {
    fn open(&self, params: &ConnectionParams) -> RemoteResult<Box<dyn RfcConnection>>;
}

/// One open link to the back-end. Closed when dropped.
pub trait RfcConnection: Send {
    /// Start a stateful session so consecutive calls share the remote context.
    fn begin_session(&mut self) -> RemoteResult<()>;

    fn end_session(&mut self) -> RemoteResult<()>;

    fn repository(&mut self) -> &mut dyn RfcRepository;

    /// Execute `function` remotely; export and table parameters are updated
    /// in place.
    fn invoke(&mut self, function: &mut dyn RfcFunction) -> RemoteResult<()>;

    fn create_function(&mut self, name: &str) -> RemoteResult<Box<dyn RfcFunction>> {
        self.repository().create_function(name)
    }
}

/// Metadata repository of a destination, including its local cache.
pub trait RfcRepository: Send {
    fn create_function(&mut self, name: &str) -> RemoteResult<Box<dyn RfcFunction>>;

    fn function_metadata(&mut self, name: &str) -> RemoteResult<FunctionMetadata>;

    fn structure_metadata(&mut self, name: &str) -> RemoteResult<StructureMetadata>;

    fn table_metadata(&mut self, name: &str) -> RemoteResult<TableMetadata>;

    fn abap_object_metadata(&mut self, name: &str) -> RemoteResult<AbapObjectMetadata>;

    fn clear_all_metadata(&mut self);

    fn clear_function_metadata(&mut self);

    fn clear_table_metadata(&mut self);

    fn clear_abap_object_metadata(&mut self);

    fn remove_function_metadata(&mut self, name: &str);

    fn remove_structure_metadata(&mut self, name: &str);

    fn remove_table_metadata(&mut self, name: &str);

    fn remove_abap_object_metadata(&mut self, name: &str);
}
