//! Batch execution of function modules in one stateful session.
//!
//! For each function, in input order: resolve it from the repository, write
//! the parameter tree, invoke, then read every TABLES parameter and every
//! EXPORT parameter back. The batch is all-or-nothing: the first failure
//! aborts it and no partial result is returned.

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    client::{DataContainer, FieldMetadata, RfcConnection, RfcFunction, RfcTable},
    common::ensure_active,
    error::{RemoteError, RfcError, RfcResult},
    parameters::{FunctionInput, Structure},
    session::Session,
    types::RfcType,
};

/// Return values of one function: table name -> array of row objects, export
/// name -> string value, or an object for a structured export.
pub type FunctionOutput = Map<String, Value>;

/// Function name -> its [`FunctionOutput`], in input order.
pub type CallResult = Map<String, Value>;

pub struct FunctionInvoker {
    cancel: CancellationToken,
}

impl FunctionInvoker {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Run `input` on `connection` inside one session. The session is ended on
    /// every path, and the connection is closed when this returns.
    pub fn execute(
        &self,
        connection: Box<dyn RfcConnection>,
        input: &FunctionInput,
    ) -> RfcResult<CallResult> {
        input.validate()?;
        ensure_active(&self.cancel)?;
        info!("Executing {} RFC function(s)", input.functions.len());

        let mut session = Session::start(connection)?;
        let mut results = CallResult::new();
        for function in &input.functions {
            ensure_active(&self.cancel)?;
            let output = self.call(&mut session, function)?;
            results.insert(function.name.clone(), Value::Object(output));
        }
        session.end();

        info!("RFC batch finished with {} result(s)", results.len());
        Ok(results)
    }

    fn call(&self, session: &mut Session, input: &Structure) -> RfcResult<FunctionOutput> {
        let name = input.name.as_str();

        debug!("Creating function '{}'", name);
        let mut function = session
            .connection()
            .create_function(name)
            .map_err(|source| RfcError::FunctionResolution {
                function: name.to_string(),
                source,
            })?;

        debug!("Populating input of '{}'", name);
        input
            .populate(function.as_mut())
            .map_err(|source| RfcError::Population {
                function: name.to_string(),
                source,
            })?;

        ensure_active(&self.cancel)?;
        debug!("Invoking '{}'", name);
        session
            .connection()
            .invoke(function.as_mut())
            .map_err(|source| RfcError::Invocation {
                function: name.to_string(),
                source,
            })?;

        match self.extract(name, function.as_mut()) {
            Ok(output) => Ok(output),
            Err(e) => {
                // Release the remote context before the error travels up.
                session.end();
                Err(e)
            }
        }
    }

    fn extract(&self, name: &str, function: &mut dyn RfcFunction) -> RfcResult<FunctionOutput> {
        let extraction = |source: RemoteError| RfcError::ResultExtraction {
            function: name.to_string(),
            source,
        };
        let read_failed = |e: ReadError| match e {
            ReadError::Cancelled => RfcError::Cancelled,
            ReadError::Remote(source) => extraction(source),
        };

        let metadata = function.metadata().clone();
        let mut output = FunctionOutput::new();

        for table_name in metadata.table_names() {
            ensure_active(&self.cancel)?;
            let table = function.table(table_name).map_err(extraction)?;
            let rows = self.read_rows(table).map_err(read_failed)?;
            debug!("Read {} row(s) from '{}.{}'", rows.len(), name, table_name);
            output.insert(table_name.to_string(), Value::Array(rows));
        }

        for export in metadata.export_names() {
            ensure_active(&self.cancel)?;
            let value = match metadata.parameter(export) {
                Some(parameter) if parameter.data_type.is_container() => self
                    .read_element(&mut *function, &parameter.as_field())
                    .map_err(read_failed)?,
                _ => Value::String(function.get_string(export).map_err(extraction)?),
            };
            output.insert(export.to_string(), value);
        }

        Ok(output)
    }

    /// Structures become objects keyed by their field names, tables become
    /// arrays of row objects. Scalars use the same conversion as table columns.
    fn read_element<C>(&self, container: &mut C, field: &FieldMetadata) -> Result<Value, ReadError>
    where
        C: DataContainer + ?Sized,
    {
        match (&field.data_type, &field.line_type) {
            (RfcType::Structure, Some(line_type)) => {
                let structure = container.structure(&field.name)?;
                let mut record = Map::new();
                for child in &line_type.fields {
                    let value = self.read_element(&mut *structure, child)?;
                    record.insert(child.name.clone(), value);
                }
                Ok(Value::Object(record))
            }
            (RfcType::Table, _) => {
                let table = container.table(&field.name)?;
                Ok(Value::Array(self.read_rows(table)?))
            }
            (RfcType::AbapObject, _) => Ok(Value::String(container.get_string(&field.name)?)),
            _ => Ok(container.get_value(&field.name, field.value_kind())?.into_json()),
        }
    }

    /// Each row becomes an object keyed by the line-type field names.
    fn read_rows(&self, table: &dyn RfcTable) -> Result<Vec<Value>, ReadError> {
        let columns: Vec<_> = table
            .line_type()
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.value_kind()))
            .collect();

        let mut rows = Vec::with_capacity(table.row_count());
        for index in 0..table.row_count() {
            if self.cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            let row = table.row(index)?;
            let mut record = Map::new();
            for (column, kind) in &columns {
                let value = row.get_value(column, *kind)?;
                record.insert(column.clone(), value.into_json());
            }
            rows.push(Value::Object(record));
        }
        Ok(rows)
    }
}

enum ReadError {
    Cancelled,
    Remote(RemoteError),
}

impl From<RemoteError> for ReadError {
    fn from(e: RemoteError) -> Self {
        ReadError::Remote(e)
    }
}
