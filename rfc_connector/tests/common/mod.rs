//! Shared fixtures: an in-memory back-end with a few function modules and a
//! table reader over a small material table.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use rfc_connector::{
    memory::push_row, Direction, FieldMetadata, FunctionMetadata,
    MemoryRfcClient, ParameterMetadata, RemoteError, RemoteResult, RfcConnector, RfcFunction,
    RfcType, StructureMetadata, TableMetadata,
};

pub const CONNECTION_STRING: &str =
    "ASHOST=sapserver01;SYSNR=00;CLIENT=000;LANG=EN;USER=SAPUSER;PASSWD=secret;IDLE_TIMEOUT=60;";

/// MATNR, MTART, MATKL
pub const MATERIALS: &[[&str; 3]] = &[
    ["M-01", "HAWA", "001"],
    ["M-02", "FERT", "001"],
    ["M-03", "HAWA", "002"],
    ["M-04", "HAWA", "001"],
    ["M-05", "ROH", "003"],
];

const MARA_FIELDS: [&str; 3] = ["MATNR", "MTART", "MATKL"];

pub struct Backend {
    pub client: Arc<MemoryRfcClient>,
    /// OPTIONS rows received by the table reader, per call.
    pub options: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Backend {
    pub fn connector(&self) -> RfcConnector {
        RfcConnector::new(self.client.clone())
    }
}

pub fn backend() -> Backend {
    let client = MemoryRfcClient::new();
    let options = Arc::new(Mutex::new(Vec::new()));

    client.register_function(f1_metadata(), |f| {
        let p = f.get_string("P")?;
        f.set_value("R", &format!("echo:{p}"))
    });
    client.register_function(date_get_week_metadata(), date_get_week);
    client.register_function(order_metadata(), create_order);

    let seen = Arc::clone(&options);
    client.register_function(reader_metadata("RFC_READ_TABLE"), move |f| {
        read_table(f, &seen)
    });
    let seen = Arc::clone(&options);
    client.register_function(reader_metadata("BBP_RFC_READ_TABLE"), move |f| {
        read_table(f, &seen)
    });

    client.register_table(TableMetadata {
        name: "MARA".into(),
        line_type: StructureMetadata::new(
            "MARA",
            MARA_FIELDS
                .iter()
                .map(|name| FieldMetadata::new(*name, RfcType::Char, 18))
                .collect(),
        ),
    });

    Backend {
        client: Arc::new(client),
        options,
    }
}

pub fn f1_metadata() -> FunctionMetadata {
    FunctionMetadata::new(
        "F1",
        vec![
            ParameterMetadata::scalar("P", Direction::Import, RfcType::Char, 10),
            ParameterMetadata::scalar("R", Direction::Export, RfcType::Char, 20),
        ],
    )
}

fn date_get_week_metadata() -> FunctionMetadata {
    FunctionMetadata::new(
        "DATE_GET_WEEK",
        vec![
            ParameterMetadata::scalar("DATE", Direction::Import, RfcType::Date, 8),
            ParameterMetadata::scalar("WEEK", Direction::Export, RfcType::Num, 6),
        ],
    )
}

fn date_get_week(f: &mut dyn RfcFunction) -> RemoteResult<()> {
    let week = match f.get_string("DATE")?.as_str() {
        "20180101" => "201801",
        "20180615" => "201824",
        "20181231" => "201901",
        _ => return Err(RemoteError::abap("DATE_INVALID")),
    };
    f.set_value("WEEK", week)
}

fn order_metadata() -> FunctionMetadata {
    let header = StructureMetadata::new(
        "ORDER_HEADER",
        vec![
            FieldMetadata::new("ORDER_ID", RfcType::Char, 10),
            FieldMetadata::new("CUSTOMER", RfcType::Char, 10),
        ],
    );
    let item = StructureMetadata::new(
        "ORDER_ITEM",
        vec![
            FieldMetadata::new("POSNR", RfcType::Num, 6),
            FieldMetadata::new("MATNR", RfcType::Char, 18),
            FieldMetadata::new("QUANTITY", RfcType::Int, 4),
            FieldMetadata::new("PRICE", RfcType::Float, 8),
        ],
    );
    FunctionMetadata::new(
        "Z_CREATE_ORDER",
        vec![
            ParameterMetadata::structure("HEADER", Direction::Import, header),
            ParameterMetadata::table("ITEMS", item),
            ParameterMetadata::scalar("ORDER_ID", Direction::Export, RfcType::Char, 10),
            ParameterMetadata::scalar("TOTAL_QUANTITY", Direction::Export, RfcType::Int, 4),
        ],
    )
}

// Echoes the order id and sums the item quantities.
fn create_order(f: &mut dyn RfcFunction) -> RemoteResult<()> {
    let order_id = f.structure("HEADER")?.get_string("ORDER_ID")?;
    let items = f.table("ITEMS")?;
    let mut total = 0i64;
    for index in 0..items.row_count() {
        let quantity = items.row(index)?.get_string("QUANTITY")?;
        total += quantity.trim().parse::<i64>().unwrap_or(0);
    }
    f.set_value("ORDER_ID", &order_id)?;
    f.set_value("TOTAL_QUANTITY", &total.to_string())
}

pub fn reader_metadata(name: &str) -> FunctionMetadata {
    FunctionMetadata::new(
        name,
        vec![
            ParameterMetadata::scalar("QUERY_TABLE", Direction::Import, RfcType::Char, 30),
            ParameterMetadata::scalar("DELIMITER", Direction::Import, RfcType::Char, 1)
                .optional(),
            ParameterMetadata::scalar("ROWCOUNT", Direction::Import, RfcType::Int, 4).optional(),
            ParameterMetadata::scalar("ROWSKIPS", Direction::Import, RfcType::Int, 4).optional(),
            ParameterMetadata::table(
                "OPTIONS",
                StructureMetadata::new(
                    "RFC_DB_OPT",
                    vec![FieldMetadata::new("TEXT", RfcType::Char, 72)],
                ),
            ),
            ParameterMetadata::table(
                "FIELDS",
                StructureMetadata::new(
                    "RFC_DB_FLD",
                    vec![
                        FieldMetadata::new("FIELDNAME", RfcType::Char, 30),
                        FieldMetadata::new("OFFSET", RfcType::Num, 6),
                        FieldMetadata::new("LENGTH", RfcType::Num, 6),
                    ],
                ),
            ),
            ParameterMetadata::table(
                "DATA",
                StructureMetadata::new(
                    "TAB512",
                    vec![FieldMetadata::new("WA", RfcType::Char, 512)],
                ),
            ),
        ],
    )
}

fn column_values(
    f: &mut dyn RfcFunction,
    table: &str,
    column: &str,
) -> RemoteResult<Vec<String>> {
    let table = f.table(table)?;
    (0..table.row_count())
        .map(|index| table.row(index)?.get_string(column))
        .collect()
}

// Understands conditions of the form `FIELD EQ 'VALUE' [AND ...]`.
fn matches(condition: &str, row: &[&str; 3]) -> bool {
    condition
        .split(" AND ")
        .filter(|term| !term.trim().is_empty())
        .all(|term| {
            let mut parts = term.trim().splitn(3, ' ');
            let (Some(field), Some("EQ"), Some(value)) = (parts.next(), parts.next(), parts.next())
            else {
                return false;
            };
            let value = value.trim_matches('\'');
            MARA_FIELDS
                .iter()
                .position(|name| *name == field)
                .is_some_and(|i| row[i] == value)
        })
}

pub fn read_table(f: &mut dyn RfcFunction, seen: &Mutex<Vec<Vec<String>>>) -> RemoteResult<()> {
    if f.get_string("QUERY_TABLE")? != "MARA" {
        return Err(RemoteError::abap("TABLE_NOT_AVAILABLE"));
    }
    let delimiter = f.get_string("DELIMITER")?;
    let skips = f.get_string("ROWSKIPS")?.parse::<usize>().unwrap_or(0);
    let count = f.get_string("ROWCOUNT")?.parse::<usize>().unwrap_or(0);

    let mut columns = Vec::new();
    for name in column_values(f, "FIELDS", "FIELDNAME")? {
        let index = MARA_FIELDS
            .iter()
            .position(|field| *field == name)
            .ok_or_else(|| RemoteError::abap("FIELD_NOT_VALID"))?;
        columns.push(index);
    }

    let options = column_values(f, "OPTIONS", "TEXT")?;
    let condition = options.join(" ");
    seen.lock().push(options);

    let data = f.table("DATA")?;
    let selected = MATERIALS
        .iter()
        .filter(|row| matches(&condition, row))
        .skip(skips)
        .take(if count == 0 { usize::MAX } else { count });
    for row in selected {
        let line = columns
            .iter()
            .map(|i| row[*i])
            .collect::<Vec<_>>()
            .join(&delimiter);
        push_row(data, &[("WA", line.as_str())])?;
    }
    Ok(())
}

/// Values of `MATNR` in a query result.
pub fn matnrs(records: &[serde_json::Map<String, serde_json::Value>]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("MATNR").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

pub fn structure_row(fields: &[(&str, &str)]) -> rfc_connector::Structure {
    fields
        .iter()
        .fold(rfc_connector::Structure::default(), |row, (name, value)| {
            row.with_field(*name, *value)
        })
}

