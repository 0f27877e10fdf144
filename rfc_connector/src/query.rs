//! Table reads through a generic table reader function (`RFC_READ_TABLE` and
//! functions with the same interface).
//!
//! The reader returns every requested column of a row packed into the single
//! `WA` column of its `DATA` table, separated by a caller chosen delimiter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    client::{DataContainer, RfcConnection, RfcTable},
    common::ensure_active,
    config::ReadTableFunction,
    error::{RemoteError, RemoteResult, RfcError, RfcResult},
    filter::filter_chunks,
    session::Session,
};

const QUERY_TABLE: &str = "QUERY_TABLE";
const DELIMITER: &str = "DELIMITER";
const ROWCOUNT: &str = "ROWCOUNT";
const ROWSKIPS: &str = "ROWSKIPS";
const FIELDS: &str = "FIELDS";
const FIELDNAME: &str = "FIELDNAME";
const OPTIONS: &str = "OPTIONS";
const TEXT: &str = "TEXT";
const DATA: &str = "DATA";
const WA: &str = "WA";

/// One decoded row: field name -> string value, in requested field order.
pub type TableQueryRecord = Map<String, Value>;

/// A table read request.
#[derive(Clone, Serialize, Deserialize)]
pub struct TableQuery {
    pub connection_string: String,
    pub table_name: String,
    /// Comma separated field names, e.g. `"MATNR, MTART"`.
    pub fields: String,
    /// Condition in the back-end's WHERE syntax. Empty selects every row.
    #[serde(default)]
    pub filter: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Maximum rows to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u32>,
    /// Rows to skip before the first returned row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_skips: Option<u32>,
}

fn default_delimiter() -> String {
    "~".to_string()
}

impl TableQuery {
    pub fn new(
        connection_string: impl Into<String>,
        table_name: impl Into<String>,
        fields: impl Into<String>,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            table_name: table_name.into(),
            fields: fields.into(),
            filter: String::new(),
            delimiter: default_delimiter(),
            row_count: None,
            row_skips: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_paging(mut self, row_count: Option<u32>, row_skips: Option<u32>) -> Self {
        self.row_count = row_count;
        self.row_skips = row_skips;
        self
    }

    /// Check everything that does not need the back-end and build the call
    /// plan. The delimiter is checked first.
    pub fn prepare(
        &self,
        reader: &ReadTableFunction,
        filter_max_len: usize,
    ) -> RfcResult<PreparedQuery> {
        let delimiter = parse_delimiter(&self.delimiter)?;

        let table_name = self.table_name.trim();
        if table_name.is_empty() {
            return Err(RfcError::InvalidInput("table_name is empty".to_string()));
        }

        let field_names: Vec<String> = self
            .fields
            .split(',')
            .map(|name| name.trim().to_string())
            .collect();
        if field_names.iter().any(String::is_empty) {
            return Err(RfcError::InvalidInput(format!(
                "fields contains an empty name: '{}'",
                self.fields
            )));
        }

        let reader = reader.function_name().trim();
        if reader.is_empty() {
            return Err(RfcError::InvalidInput(
                "table reader function name is empty".to_string(),
            ));
        }

        Ok(PreparedQuery {
            reader: reader.to_string(),
            table_name: table_name.to_string(),
            field_names,
            options: filter_chunks(&self.filter, filter_max_len)?,
            delimiter,
            row_count: self.row_count,
            row_skips: self.row_skips,
        })
    }
}

impl std::fmt::Debug for TableQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableQuery")
            .field("connection_string", &"<redacted>")
            .field("table_name", &self.table_name)
            .field("fields", &self.fields)
            .field("filter", &self.filter)
            .field("delimiter", &self.delimiter)
            .field("row_count", &self.row_count)
            .field("row_skips", &self.row_skips)
            .finish()
    }
}

/// Exactly one character.
pub fn parse_delimiter(delimiter: &str) -> RfcResult<char> {
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(RfcError::InvalidDelimiter(delimiter.to_string())),
    }
}

/// A validated query, ready to run against a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub reader: String,
    pub table_name: String,
    pub field_names: Vec<String>,
    /// Filter chunks, one OPTIONS row each.
    pub options: Vec<String>,
    pub delimiter: char,
    pub row_count: Option<u32>,
    pub row_skips: Option<u32>,
}

/// Split one packed `WA` line and pair the pieces with `field_names` by
/// position. Missing trailing pieces leave their fields absent; surplus pieces
/// are an error, since they cannot be attributed to a field.
pub fn decode_row(
    line: &str,
    delimiter: char,
    field_names: &[String],
) -> RemoteResult<TableQueryRecord> {
    let mut record = TableQueryRecord::new();
    for (index, piece) in line.split(delimiter).enumerate() {
        let Some(name) = field_names.get(index) else {
            return Err(RemoteError::Conversion {
                element: WA.to_string(),
                message: format!(
                    "row has more than {} values; a value may contain the delimiter '{}'",
                    field_names.len(),
                    delimiter
                ),
            });
        };
        record.insert(name.clone(), Value::String(piece.to_string()));
    }
    Ok(record)
}

pub struct TableQueryEngine {
    cancel: CancellationToken,
}

impl TableQueryEngine {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn execute(
        &self,
        connection: Box<dyn RfcConnection>,
        query: &PreparedQuery,
    ) -> RfcResult<Vec<TableQueryRecord>> {
        ensure_active(&self.cancel)?;
        info!(
            "Reading table '{}' with '{}' ({} field(s), {} option row(s))",
            query.table_name,
            query.reader,
            query.field_names.len(),
            query.options.len()
        );

        let mut session = Session::start(connection)?;
        let reader = query.reader.as_str();

        debug!("Creating function '{}'", reader);
        let mut function = session
            .connection()
            .create_function(reader)
            .map_err(|source| RfcError::FunctionResolution {
                function: reader.to_string(),
                source,
            })?;

        debug!("Populating input of '{}'", reader);
        populate(function.as_mut(), query).map_err(|source| RfcError::Population {
            function: reader.to_string(),
            source,
        })?;

        ensure_active(&self.cancel)?;
        debug!("Invoking '{}'", reader);
        session
            .connection()
            .invoke(function.as_mut())
            .map_err(|source| RfcError::Invocation {
                function: reader.to_string(),
                source,
            })?;

        let extraction = |source: RemoteError| RfcError::ResultExtraction {
            function: reader.to_string(),
            source,
        };
        let data = function.table(DATA).map_err(extraction)?;
        let mut records = Vec::with_capacity(data.row_count());
        for index in 0..data.row_count() {
            ensure_active(&self.cancel)?;
            let line = data
                .row(index)
                .and_then(|row| row.get_string(WA))
                .map_err(extraction)?;
            let record =
                decode_row(&line, query.delimiter, &query.field_names).map_err(extraction)?;
            records.push(record);
        }
        session.end();

        info!("Read {} row(s) from table '{}'", records.len(), query.table_name);
        Ok(records)
    }
}

fn populate<C>(function: &mut C, query: &PreparedQuery) -> RemoteResult<()>
where
    C: DataContainer + ?Sized,
{
    function.set_value(QUERY_TABLE, &query.table_name)?;
    function.set_value(DELIMITER, &query.delimiter.to_string())?;
    if let Some(count) = query.row_count {
        function.set_value(ROWCOUNT, &count.to_string())?;
    }
    if let Some(skips) = query.row_skips {
        function.set_value(ROWSKIPS, &skips.to_string())?;
    }

    append_rows(function.table(FIELDS)?, FIELDNAME, &query.field_names)?;
    append_rows(function.table(OPTIONS)?, TEXT, &query.options)
}

fn append_rows(table: &mut dyn RfcTable, column: &str, values: &[String]) -> RemoteResult<()> {
    for value in values {
        let mut row = table.new_row();
        row.set_value(column, value)?;
        table.append_row(row)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decodes_packed_row() {
        let record = decode_row("x~y", '~', &names(&["A", "B"])).unwrap();
        assert_eq!(record.get("A"), Some(&Value::from("x")));
        assert_eq!(record.get("B"), Some(&Value::from("y")));
        let keys: Vec<_> = record.keys().cloned().collect();
        assert_eq!(keys, names(&["A", "B"]));
    }

    #[test]
    fn short_row_leaves_fields_absent() {
        let record = decode_row("x", '~', &names(&["A", "B"])).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("A"), Some(&Value::from("x")));
        assert!(!record.contains_key("B"));
    }

    #[test]
    fn surplus_pieces_are_rejected() {
        let err = decode_row("x~y~z", '~', &names(&["A", "B"])).unwrap_err();
        assert!(matches!(err, RemoteError::Conversion { .. }));
    }

    #[test]
    fn empty_pieces_are_kept() {
        let record = decode_row("~y", '~', &names(&["A", "B"])).unwrap();
        assert_eq!(record.get("A"), Some(&Value::from("")));
    }

    #[test]
    fn delimiter_must_be_one_character() {
        assert_eq!(parse_delimiter("~").unwrap(), '~');
        assert_eq!(parse_delimiter("§").unwrap(), '§');
        assert!(matches!(parse_delimiter("~~"), Err(RfcError::InvalidDelimiter(_))));
        assert!(matches!(parse_delimiter(""), Err(RfcError::InvalidDelimiter(_))));
    }

    #[test]
    fn prepare_trims_field_names_and_chunks_filter() {
        let long = "MTART EQ 'HAWA' AND MATKL EQ '001' AND ERSDA GE '20180101' AND ERSDA LE '20181231'";
        let query = TableQuery::new("ASHOST=h", "MARA", " MATNR , MTART")
            .with_filter(long)
            .with_paging(Some(10), None);

        let prepared = query.prepare(&ReadTableFunction::RfcReadTable, 72).unwrap();
        assert_eq!(prepared.reader, "RFC_READ_TABLE");
        assert_eq!(prepared.field_names, names(&["MATNR", "MTART"]));
        assert_eq!(prepared.options.len(), 2);
        assert_eq!(prepared.options.join(" "), long);
        assert_eq!(prepared.row_count, Some(10));
    }

    #[test]
    fn prepare_checks_delimiter_before_anything_else() {
        let query = TableQuery::new("", "", "").with_delimiter("ab");
        let err = query.prepare(&ReadTableFunction::RfcReadTable, 72).unwrap_err();
        assert!(matches!(err, RfcError::InvalidDelimiter(_)));
    }

    #[test]
    fn prepare_rejects_empty_field_and_reader_names() {
        let query = TableQuery::new("", "MARA", "MATNR,,MTART");
        assert!(matches!(
            query.prepare(&ReadTableFunction::RfcReadTable, 72),
            Err(RfcError::InvalidInput(_))
        ));

        let query = TableQuery::new("", "MARA", "MATNR");
        assert!(matches!(
            query.prepare(&ReadTableFunction::Custom(" ".into()), 72),
            Err(RfcError::InvalidInput(_))
        ));
    }

    #[test]
    fn prepare_reports_unsplittable_filter() {
        let query = TableQuery::new("", "MARA", "MATNR").with_filter("X".repeat(80));
        assert!(matches!(
            query.prepare(&ReadTableFunction::RfcReadTable, 72),
            Err(RfcError::FilterTooLong { .. })
        ));
    }

    #[test]
    fn debug_hides_connection_string() {
        let query = TableQuery::new("PASSWD=secret", "MARA", "MATNR");
        assert!(!format!("{query:?}").contains("secret"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let query: TableQuery = serde_json::from_str(
            r#"{"connection_string": "ASHOST=h", "table_name": "MARA", "fields": "MATNR"}"#,
        )
        .unwrap();
        assert_eq!(query.delimiter, "~");
        assert_eq!(query.filter, "");
        assert_eq!(query.row_count, None);
    }
}
