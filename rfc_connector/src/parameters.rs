//! Function call input: the recursive parameter tree and how it is written
//! into a remote call container.
//!
//! A batch is either decoded from JSON (`[{"Name": ..., "Fields": [...],
//! "Structures": [...], "Tables": [...]}]`) or built from the flat
//! [`SimpleStructure`] form. Names are not checked against remote metadata;
//! the container rejects unknown names during population.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    client::DataContainer,
    error::{RemoteResult, RfcError, RfcResult},
};

/// A scalar parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(
        rename = "Value",
        alias = "value",
        default,
        deserialize_with = "scalar_as_string"
    )]
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One nested container of the call input. At the top level `name` is the
/// function module name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Structure {
    /// Empty for table rows.
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(
        rename = "Fields",
        alias = "fields",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub fields: Vec<Field>,
    #[serde(
        rename = "Structures",
        alias = "structures",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub structures: Vec<Structure>,
    #[serde(
        rename = "Tables",
        alias = "tables",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tables: Vec<Table>,
}

/// Rows appended, in order, to a table parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(
        rename = "Rows",
        alias = "rows",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub rows: Vec<Structure>,
}

/// Field-only form of [`Structure`], for calls that need no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimpleStructure {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(
        rename = "Fields",
        alias = "fields",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub fields: Vec<Field>,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structures.push(structure);
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Write this node into `container`: fields first, then every table row
    /// in input order, then nested structures. Stops at the first rejected
    /// element.
    pub fn populate<C>(&self, container: &mut C) -> RemoteResult<()>
    where
        C: DataContainer + ?Sized,
    {
        for field in &self.fields {
            container.set_value(&field.name, &field.value)?;
        }

        for table in &self.tables {
            let handle = container.table(&table.name)?;
            for row in &table.rows {
                let mut element = handle.new_row();
                row.populate(element.as_mut())?;
                handle.append_row(element)?;
            }
        }

        for structure in &self.structures {
            let handle = container.structure(&structure.name)?;
            structure.populate(handle)?;
        }

        Ok(())
    }

    // Table rows are anonymous, only their children carry names.
    fn validate_names(&self, path: &str, named: bool) -> RfcResult<()> {
        if named && self.name.trim().is_empty() {
            return Err(RfcError::InvalidInput(format!("{path}: name is empty")));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(RfcError::InvalidInput(format!(
                    "{path}.Fields[{i}]: name is empty"
                )));
            }
        }
        for (i, structure) in self.structures.iter().enumerate() {
            structure.validate_names(&format!("{path}.Structures[{i}]"), true)?;
        }
        for (i, table) in self.tables.iter().enumerate() {
            let table_path = format!("{path}.Tables[{i}]");
            if table.name.trim().is_empty() {
                return Err(RfcError::InvalidInput(format!(
                    "{table_path}: name is empty"
                )));
            }
            for (j, row) in table.rows.iter().enumerate() {
                row.validate_names(&format!("{table_path}.Rows[{j}]"), false)?;
            }
        }
        Ok(())
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Structure) -> Self {
        self.rows.push(row);
        self
    }
}

impl SimpleStructure {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn populate<C>(&self, container: &mut C) -> RemoteResult<()>
    where
        C: DataContainer + ?Sized,
    {
        for field in &self.fields {
            container.set_value(&field.name, &field.value)?;
        }
        Ok(())
    }
}

impl From<SimpleStructure> for Structure {
    fn from(simple: SimpleStructure) -> Self {
        Structure {
            name: simple.name,
            fields: simple.fields,
            ..Default::default()
        }
    }
}

/// Flat batch of function calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimpleFunctionInput {
    #[serde(alias = "Functions", default, deserialize_with = "null_as_empty")]
    pub functions: Vec<SimpleStructure>,
}

/// An ordered batch of function calls, executed in one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionInput {
    pub functions: Vec<Structure>,
}

impl FunctionInput {
    pub fn new(functions: Vec<Structure>) -> Self {
        Self { functions }
    }

    /// Decode a JSON array of structures.
    pub fn from_json(json: &str) -> RfcResult<Self> {
        let functions: Vec<Structure> = serde_json::from_str(json)
            .map_err(|e| RfcError::InvalidInput(format!("Failed to parse input JSON: {e}")))?;
        Ok(Self { functions })
    }

    pub fn from_simple(input: SimpleFunctionInput) -> Self {
        Self {
            functions: input.functions.into_iter().map(Structure::from).collect(),
        }
    }

    /// Reject empty names anywhere in the tree, and a function listed twice
    /// since results are keyed by function name. Names are otherwise left for
    /// the back-end to judge.
    pub fn validate(&self) -> RfcResult<()> {
        let mut seen = HashSet::with_capacity(self.functions.len());
        for (i, function) in self.functions.iter().enumerate() {
            function.validate_names(&format!("Functions[{i}]"), true)?;
            if !seen.insert(function.name.as_str()) {
                return Err(RfcError::InvalidInput(format!(
                    "Functions[{i}]: function '{}' appears more than once in the batch",
                    function.name
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// How an [`ExecuteFunctionInput`] carries its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputType {
    #[default]
    Parameters,
    Json,
}

/// Request to run one or more function modules in a single session.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ExecuteFunctionInput {
    /// `KEY=VALUE;...` connection descriptor.
    pub connection_string: String,
    #[serde(default)]
    pub input_type: InputType,
    /// JSON array of structures, used when `input_type` is `JSON`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_functions: Option<String>,
    /// Used when `input_type` is `PARAMETERS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_input: Option<SimpleFunctionInput>,
}

impl ExecuteFunctionInput {
    pub fn json(connection_string: impl Into<String>, functions: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            input_type: InputType::Json,
            input_functions: Some(functions.into()),
            simple_input: None,
        }
    }

    pub fn parameters(
        connection_string: impl Into<String>,
        functions: Vec<SimpleStructure>,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            input_type: InputType::Parameters,
            input_functions: None,
            simple_input: Some(SimpleFunctionInput { functions }),
        }
    }

    /// Build the validated batch selected by `input_type`.
    pub fn function_input(&self) -> RfcResult<FunctionInput> {
        let input = match self.input_type {
            InputType::Json => {
                let json = self.input_functions.as_deref().ok_or_else(|| {
                    RfcError::InvalidInput("input_functions is required for JSON input".into())
                })?;
                FunctionInput::from_json(json)?
            }
            InputType::Parameters => {
                let simple = self.simple_input.clone().ok_or_else(|| {
                    RfcError::InvalidInput("simple_input is required for PARAMETERS input".into())
                })?;
                FunctionInput::from_simple(simple)
            }
        };
        input.validate()?;
        Ok(input)
    }
}

impl std::fmt::Debug for ExecuteFunctionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteFunctionInput")
            .field("input_type", &self.input_type)
            .field("input_functions", &self.input_functions)
            .field("simple_input", &self.simple_input)
            .finish_non_exhaustive()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// Values are passed to the back-end as text; accept JSON numbers and booleans too.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar value, got {other}"
        ))),
    }
}
