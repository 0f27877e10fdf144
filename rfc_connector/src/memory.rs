//! In-memory RFC back-end.
//!
//! Function modules are registered with their metadata and a handler that
//! plays the remote implementation. Containers enforce the declared layout the
//! way a real back-end does: unknown names and values that do not fit a
//! numeric type are rejected. Every remote interaction is appended to a call
//! log so callers can check what reached the "server".
//!
//! Structure:
//! 1. MemoryRfcClient + call log
//! 2. MemoryConnection / MemoryRepository
//! 3. Containers (MemoryFunction, MemoryStructure, MemoryTable)

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};

use crate::{
    client::{
        AbapObjectMetadata, DataContainer, FieldMetadata, FunctionMetadata, RfcClient,
        RfcConnection, RfcFunction, RfcRepository, RfcTable, StructureMetadata, TableMetadata,
    },
    config::ConnectionParams,
    error::{RemoteError, RemoteResult},
    types::{RfcType, RfcValue, ValueKind},
};

// ============================================================================
// PART 1: MemoryRfcClient
// ============================================================================

/// Remote implementation of a registered function module.
pub type FunctionHandler = Arc<dyn Fn(&mut dyn RfcFunction) -> RemoteResult<()> + Send + Sync>;

/// One interaction with the in-memory back-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Open,
    BeginSession,
    EndSession,
    CreateFunction(String),
    Invoke(String),
    Close,
}

#[derive(Default)]
struct Registry {
    functions: HashMap<String, (FunctionMetadata, FunctionHandler)>,
    structures: HashMap<String, StructureMetadata>,
    tables: HashMap<String, TableMetadata>,
    abap_objects: HashMap<String, AbapObjectMetadata>,
    logon_error: Option<RemoteError>,
}

/// Names whose metadata has been fetched, per kind.
#[derive(Debug, Default)]
struct MetadataCache {
    functions: BTreeSet<String>,
    structures: BTreeSet<String>,
    tables: BTreeSet<String>,
    abap_objects: BTreeSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryRfcClient {
    registry: Arc<RwLock<Registry>>,
    cache: Arc<Mutex<MetadataCache>>,
    log: Arc<Mutex<Vec<CallEvent>>>,
}

impl MemoryRfcClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function<F>(&self, metadata: FunctionMetadata, handler: F)
    where
        F: Fn(&mut dyn RfcFunction) -> RemoteResult<()> + Send + Sync + 'static,
    {
        self.registry
            .write()
            .functions
            .insert(metadata.name.clone(), (metadata, Arc::new(handler)));
    }

    pub fn with_function<F>(self, metadata: FunctionMetadata, handler: F) -> Self
    where
        F: Fn(&mut dyn RfcFunction) -> RemoteResult<()> + Send + Sync + 'static,
    {
        self.register_function(metadata, handler);
        self
    }

    pub fn register_structure(&self, metadata: StructureMetadata) {
        self.registry
            .write()
            .structures
            .insert(metadata.name.clone(), metadata);
    }

    pub fn register_table(&self, metadata: TableMetadata) {
        self.registry
            .write()
            .tables
            .insert(metadata.name.clone(), metadata);
    }

    pub fn register_abap_object(&self, metadata: AbapObjectMetadata) {
        self.registry
            .write()
            .abap_objects
            .insert(metadata.name.clone(), metadata);
    }

    /// Make every later `open` fail with `error`.
    pub fn fail_logon(&self, error: RemoteError) {
        self.registry.write().logon_error = Some(error);
    }

    pub fn calls(&self) -> Vec<CallEvent> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().clear();
    }

    /// Function names currently held in the metadata cache.
    pub fn cached_functions(&self) -> Vec<String> {
        self.cache.lock().functions.iter().cloned().collect()
    }

    pub fn cached_tables(&self) -> Vec<String> {
        self.cache.lock().tables.iter().cloned().collect()
    }

    fn record(&self, event: CallEvent) {
        self.log.lock().push(event);
    }
}

impl std::fmt::Debug for MemoryRfcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("MemoryRfcClient")
            .field("functions", &registry.functions.len())
            .field("structures", &registry.structures.len())
            .field("tables", &registry.tables.len())
            .field("abap_objects", &registry.abap_objects.len())
            .finish()
    }
}

impl RfcClient for MemoryRfcClient {
    fn open(&self, _params: &ConnectionParams) -> RemoteResult<Box<dyn RfcConnection>> {
        if let Some(err) = self.registry.read().logon_error.clone() {
            return Err(err);
        }
        self.record(CallEvent::Open);
        Ok(Box::new(MemoryConnection {
            repository: MemoryRepository {
                client: self.clone(),
            },
            in_session: false,
        }))
    }
}

// ============================================================================
// PART 2: Connection + Repository
// ============================================================================

struct MemoryConnection {
    repository: MemoryRepository,
    in_session: bool,
}

impl RfcConnection for MemoryConnection {
    fn begin_session(&mut self) -> RemoteResult<()> {
        if self.in_session {
            return Err(RemoteError::System("session already started".to_string()));
        }
        self.in_session = true;
        self.repository.client.record(CallEvent::BeginSession);
        Ok(())
    }

    fn end_session(&mut self) -> RemoteResult<()> {
        self.in_session = false;
        self.repository.client.record(CallEvent::EndSession);
        Ok(())
    }

    fn repository(&mut self) -> &mut dyn RfcRepository {
        &mut self.repository
    }

    fn invoke(&mut self, function: &mut dyn RfcFunction) -> RemoteResult<()> {
        let name = function.name().to_string();
        let client = &self.repository.client;
        client.record(CallEvent::Invoke(name.clone()));

        let handler = client
            .registry
            .read()
            .functions
            .get(&name)
            .map(|(_, handler)| Arc::clone(handler))
            .ok_or_else(|| {
                RemoteError::NotFound(format!("Function module {name} does not exist"))
            })?;
        handler(function)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.repository.client.record(CallEvent::Close);
    }
}

struct MemoryRepository {
    client: MemoryRfcClient,
}

impl MemoryRepository {
    fn not_available(kind: &str, name: &str) -> RemoteError {
        RemoteError::NotFound(format!("metadata for {kind} {name} not available"))
    }
}

impl RfcRepository for MemoryRepository {
    fn create_function(&mut self, name: &str) -> RemoteResult<Box<dyn RfcFunction>> {
        self.client.record(CallEvent::CreateFunction(name.to_string()));
        let metadata = self.function_metadata(name)?;
        Ok(Box::new(MemoryFunction::new(metadata)))
    }

    fn function_metadata(&mut self, name: &str) -> RemoteResult<FunctionMetadata> {
        let metadata = self
            .client
            .registry
            .read()
            .functions
            .get(name)
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| {
                RemoteError::NotFound(format!(
                    "metadata for function {name} not available: FU_NOT_FOUND: Function module {name} does not exist"
                ))
            })?;
        self.client.cache.lock().functions.insert(name.to_string());
        Ok(metadata)
    }

    fn structure_metadata(&mut self, name: &str) -> RemoteResult<StructureMetadata> {
        let metadata = self
            .client
            .registry
            .read()
            .structures
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_available("structure", name))?;
        self.client.cache.lock().structures.insert(name.to_string());
        Ok(metadata)
    }

    fn table_metadata(&mut self, name: &str) -> RemoteResult<TableMetadata> {
        let metadata = self
            .client
            .registry
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_available("table", name))?;
        self.client.cache.lock().tables.insert(name.to_string());
        Ok(metadata)
    }

    fn abap_object_metadata(&mut self, name: &str) -> RemoteResult<AbapObjectMetadata> {
        let metadata = self
            .client
            .registry
            .read()
            .abap_objects
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_available("ABAP object", name))?;
        self.client.cache.lock().abap_objects.insert(name.to_string());
        Ok(metadata)
    }

    fn clear_all_metadata(&mut self) {
        *self.client.cache.lock() = MetadataCache::default();
    }

    fn clear_function_metadata(&mut self) {
        self.client.cache.lock().functions.clear();
    }

    fn clear_table_metadata(&mut self) {
        self.client.cache.lock().tables.clear();
    }

    fn clear_abap_object_metadata(&mut self) {
        self.client.cache.lock().abap_objects.clear();
    }

    fn remove_function_metadata(&mut self, name: &str) {
        self.client.cache.lock().functions.remove(name);
    }

    fn remove_structure_metadata(&mut self, name: &str) {
        self.client.cache.lock().structures.remove(name);
    }

    fn remove_table_metadata(&mut self, name: &str) {
        self.client.cache.lock().tables.remove(name);
    }

    fn remove_abap_object_metadata(&mut self, name: &str) {
        self.client.cache.lock().abap_objects.remove(name);
    }
}

// ============================================================================
// PART 3: Containers
// ============================================================================

enum MemoryValue {
    Scalar(String),
    Structure(MemoryStructure),
    Table(MemoryTable),
}

/// Values of one structure, function parameter list, or table row.
pub struct MemoryStructure {
    layout: StructureMetadata,
    values: HashMap<String, MemoryValue>,
}

impl MemoryStructure {
    pub fn new(layout: StructureMetadata) -> Self {
        let values = layout
            .fields
            .iter()
            .map(|field| (field.name.clone(), MemoryValue::initial(field)))
            .collect();
        Self { layout, values }
    }

    fn element(&self, name: &str) -> RemoteResult<&FieldMetadata> {
        self.layout
            .field(name)
            .ok_or_else(|| RemoteError::UnknownElement(name.to_string()))
    }
}

impl MemoryValue {
    fn initial(field: &FieldMetadata) -> Self {
        let layout = || {
            field
                .line_type
                .clone()
                .unwrap_or_else(|| StructureMetadata::new(field.name.clone(), Vec::new()))
        };
        match field.data_type {
            RfcType::Structure => MemoryValue::Structure(MemoryStructure::new(layout())),
            RfcType::Table => MemoryValue::Table(MemoryTable::new(layout())),
            _ => MemoryValue::Scalar(String::new()),
        }
    }
}

fn conversion(element: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::Conversion {
        element: element.to_string(),
        message: message.into(),
    }
}

// Accepts what the back-end would store for the declared type.
fn check_scalar(field: &FieldMetadata, value: &str) -> RemoteResult<()> {
    let text = value.trim();
    let numeric_ok = match field.data_type {
        RfcType::Int => text.parse::<i32>().is_ok(),
        RfcType::Int1 => text.parse::<u8>().is_ok(),
        RfcType::Int2 => text.parse::<i16>().is_ok(),
        RfcType::Int8 => text.parse::<i64>().is_ok(),
        RfcType::Float => text.parse::<f64>().is_ok(),
        RfcType::Num => text.chars().all(|c| c.is_ascii_digit()),
        _ => true,
    };
    if !numeric_ok && !text.is_empty() {
        return Err(conversion(
            &field.name,
            format!("'{value}' is not a valid {} value", field.data_type),
        ));
    }
    if field.data_type == RfcType::Num && field.length > 0 && text.len() > field.length {
        return Err(conversion(
            &field.name,
            format!("'{value}' exceeds {} digits", field.length),
        ));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr + Default>(element: &str, text: &str) -> RemoteResult<T> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(T::default());
    }
    text.parse::<T>()
        .map_err(|_| conversion(element, format!("'{text}' is not numeric")))
}

impl DataContainer for MemoryStructure {
    fn set_value(&mut self, name: &str, value: &str) -> RemoteResult<()> {
        let field = self.element(name)?;
        if field.data_type.is_container() {
            return Err(conversion(
                name,
                format!("cannot assign a scalar to a {} element", field.data_type),
            ));
        }
        check_scalar(field, value)?;
        self.values
            .insert(name.to_string(), MemoryValue::Scalar(value.to_string()));
        Ok(())
    }

    fn get_value(&self, name: &str, kind: ValueKind) -> RemoteResult<RfcValue> {
        self.element(name)?;
        let text = match self.values.get(name) {
            Some(MemoryValue::Scalar(text)) => text.as_str(),
            Some(_) => return Err(conversion(name, "element is not a scalar")),
            None => "",
        };
        Ok(match kind {
            ValueKind::Bytes => RfcValue::Bytes(text.as_bytes().to_vec()),
            ValueKind::Int32 => RfcValue::Int32(parse_number(name, text)?),
            ValueKind::UInt8 => RfcValue::UInt8(parse_number(name, text)?),
            ValueKind::Int16 => RfcValue::Int16(parse_number(name, text)?),
            ValueKind::Float64 => RfcValue::Float64(parse_number(name, text)?),
            ValueKind::Int64 => RfcValue::Int64(parse_number(name, text)?),
            ValueKind::String => RfcValue::String(text.to_string()),
        })
    }

    fn table(&mut self, name: &str) -> RemoteResult<&mut dyn RfcTable> {
        self.element(name)?;
        match self.values.get_mut(name) {
            Some(MemoryValue::Table(table)) => Ok(table),
            _ => Err(conversion(name, "element is not a table")),
        }
    }

    fn structure(&mut self, name: &str) -> RemoteResult<&mut dyn DataContainer> {
        self.element(name)?;
        match self.values.get_mut(name) {
            Some(MemoryValue::Structure(structure)) => Ok(structure),
            _ => Err(conversion(name, "element is not a structure")),
        }
    }
}

pub struct MemoryTable {
    line_type: StructureMetadata,
    rows: Vec<Box<dyn DataContainer>>,
}

impl MemoryTable {
    pub fn new(line_type: StructureMetadata) -> Self {
        Self {
            line_type,
            rows: Vec::new(),
        }
    }
}

impl RfcTable for MemoryTable {
    fn line_type(&self) -> &StructureMetadata {
        &self.line_type
    }

    fn new_row(&self) -> Box<dyn DataContainer> {
        Box::new(MemoryStructure::new(self.line_type.clone()))
    }

    fn append_row(&mut self, row: Box<dyn DataContainer>) -> RemoteResult<()> {
        self.rows.push(row);
        Ok(())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, index: usize) -> RemoteResult<&dyn DataContainer> {
        self.rows
            .get(index)
            .map(|row| row.as_ref())
            .ok_or_else(|| RemoteError::NotFound(format!("row {index} out of range")))
    }
}

/// Function handle backed by in-memory parameter values.
pub struct MemoryFunction {
    metadata: FunctionMetadata,
    parameters: MemoryStructure,
}

impl MemoryFunction {
    pub fn new(metadata: FunctionMetadata) -> Self {
        let layout = StructureMetadata::new(
            metadata.name.clone(),
            metadata.parameters.iter().map(|p| p.as_field()).collect(),
        );
        Self {
            parameters: MemoryStructure::new(layout),
            metadata,
        }
    }
}

impl DataContainer for MemoryFunction {
    fn set_value(&mut self, name: &str, value: &str) -> RemoteResult<()> {
        self.parameters.set_value(name, value)
    }

    fn get_value(&self, name: &str, kind: ValueKind) -> RemoteResult<RfcValue> {
        self.parameters.get_value(name, kind)
    }

    fn table(&mut self, name: &str) -> RemoteResult<&mut dyn RfcTable> {
        self.parameters.table(name)
    }

    fn structure(&mut self, name: &str) -> RemoteResult<&mut dyn DataContainer> {
        self.parameters.structure(name)
    }
}

impl RfcFunction for MemoryFunction {
    fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }
}

/// Append one row built from `(field, value)` pairs. Convenience for handlers.
pub fn push_row(table: &mut dyn RfcTable, values: &[(&str, &str)]) -> RemoteResult<()> {
    let mut row = table.new_row();
    for (name, value) in values {
        row.set_value(name, value)?;
    }
    table.append_row(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Direction, ParameterMetadata};

    fn material_row() -> StructureMetadata {
        StructureMetadata::new(
            "MATERIAL",
            vec![
                FieldMetadata::new("MATNR", RfcType::Char, 18),
                FieldMetadata::new("COUNT", RfcType::Num, 4),
                FieldMetadata::new("WEIGHT", RfcType::Float, 8),
            ],
        )
    }

    fn echo_metadata() -> FunctionMetadata {
        FunctionMetadata::new(
            "Z_ECHO",
            vec![
                ParameterMetadata::scalar("TEXT", Direction::Import, RfcType::Char, 20),
                ParameterMetadata::scalar("COUNT", Direction::Import, RfcType::Int, 4),
                ParameterMetadata::scalar("ECHO", Direction::Export, RfcType::Char, 20),
                ParameterMetadata::table("ITEMS", material_row()),
            ],
        )
    }

    fn connect(client: &MemoryRfcClient) -> Box<dyn RfcConnection> {
        client.open(&ConnectionParams::default()).unwrap()
    }

    #[test]
    fn unknown_elements_are_rejected() {
        let mut function = MemoryFunction::new(echo_metadata());
        let err = function.set_value("NOPE", "1").unwrap_err();
        assert_eq!(err, RemoteError::UnknownElement("NOPE".into()));
        assert!(function.table("NOPE").is_err());
        assert!(function.structure("ITEMS").is_err());
    }

    #[test]
    fn numeric_values_are_checked() {
        let mut function = MemoryFunction::new(echo_metadata());
        assert!(function.set_value("COUNT", "42").is_ok());
        assert!(matches!(
            function.set_value("COUNT", "many"),
            Err(RemoteError::Conversion { .. })
        ));
        assert_eq!(
            function.get_value("COUNT", ValueKind::Int32).unwrap(),
            RfcValue::Int32(42)
        );
    }

    #[test]
    fn rows_keep_their_layout_and_order() {
        let mut function = MemoryFunction::new(echo_metadata());
        let items = function.table("ITEMS").unwrap();
        push_row(items, &[("MATNR", "A"), ("COUNT", "0001")]).unwrap();
        push_row(items, &[("MATNR", "B"), ("COUNT", "0002")]).unwrap();
        assert!(push_row(items, &[("COUNT", "12345")]).is_err());

        assert_eq!(items.row_count(), 2);
        let second = items.row(1).unwrap();
        assert_eq!(second.get_string("MATNR").unwrap(), "B");
        assert_eq!(
            second.get_value("COUNT", ValueKind::Int32).unwrap(),
            RfcValue::Int32(2)
        );
        assert_eq!(
            second.get_value("WEIGHT", ValueKind::Float64).unwrap(),
            RfcValue::Float64(0.0)
        );
        assert!(items.row(2).is_err());
    }

    #[test]
    fn invoke_runs_registered_handler() {
        let client = MemoryRfcClient::new().with_function(echo_metadata(), |f| {
            let text = f.get_string("TEXT")?;
            f.set_value("ECHO", &text.to_uppercase())
        });

        let mut conn = connect(&client);
        let mut function = conn.create_function("Z_ECHO").unwrap();
        function.set_value("TEXT", "hello").unwrap();
        conn.invoke(function.as_mut()).unwrap();
        assert_eq!(function.get_string("ECHO").unwrap(), "HELLO");
        drop(conn);

        assert_eq!(
            client.calls(),
            vec![
                CallEvent::Open,
                CallEvent::CreateFunction("Z_ECHO".into()),
                CallEvent::Invoke("Z_ECHO".into()),
                CallEvent::Close,
            ]
        );
    }

    #[test]
    fn missing_function_reports_fu_not_found() {
        let client = MemoryRfcClient::new();
        let mut conn = connect(&client);
        let err = conn.create_function("DATE_GET_WEEKXD").err().unwrap();
        assert_eq!(
            err.to_string(),
            "metadata for function DATE_GET_WEEKXD not available: FU_NOT_FOUND: Function module DATE_GET_WEEKXD does not exist"
        );
    }

    #[test]
    fn logon_failure_is_reported_on_open() {
        let client = MemoryRfcClient::new();
        client.fail_logon(RemoteError::Logon("Name or password is incorrect".into()));
        assert!(client.open(&ConnectionParams::default()).is_err());
        assert!(client.calls().is_empty());
    }

    #[test]
    fn session_cannot_start_twice() {
        let client = MemoryRfcClient::new();
        let mut conn = connect(&client);
        conn.begin_session().unwrap();
        assert!(conn.begin_session().is_err());
        conn.end_session().unwrap();
        assert!(conn.begin_session().is_ok());
    }

    #[test]
    fn metadata_cache_tracks_lookups() {
        let client = MemoryRfcClient::new().with_function(echo_metadata(), |_| Ok(()));
        client.register_table(TableMetadata {
            name: "MARA".into(),
            line_type: material_row(),
        });

        let mut conn = connect(&client);
        let repo = conn.repository();
        repo.function_metadata("Z_ECHO").unwrap();
        repo.table_metadata("MARA").unwrap();
        assert_eq!(client.cached_functions(), vec!["Z_ECHO".to_string()]);
        assert_eq!(client.cached_tables(), vec!["MARA".to_string()]);

        repo.remove_function_metadata("Z_ECHO");
        assert!(client.cached_functions().is_empty());
        repo.clear_all_metadata();
        assert!(client.cached_tables().is_empty());
    }
}
