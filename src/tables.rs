// applepay_gateway/src/tables.rs
// Table schema description and the in-memory row store checkout reads and marks paid

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};

pub type Row = serde_json::Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Bool,
    Key,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::String)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Referenced table, for `Key` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl FieldSchema {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            references: None,
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    pub fn new(name: &str, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.to_string(),
            primary_key: default_primary_key(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Result<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                GatewayError::Schema(format!("table {} has no field {}", self.name, name))
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: HashMap<String, TableSchema>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| GatewayError::Schema(format!("unknown table {}", name)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROW IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// String form of a primary key value. Only strings and numbers qualify.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Row identifier as sent by the browser: a JSON string or number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        key_of(&value)
            .map(RowId)
            .ok_or_else(|| de::Error::custom("row id must be a non-empty string or a number"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TABLE STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct TableDefinition {
    #[serde(flatten)]
    pub schema: TableSchema,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct TablesFile {
    tables: Vec<TableDefinition>,
}

#[derive(Clone)]
pub struct TableStore {
    schema: Arc<Schema>,
    rows: Arc<RwLock<HashMap<String, HashMap<String, Row>>>>,
}

impl TableStore {
    pub fn new(definitions: Vec<TableDefinition>) -> Result<Self> {
        let mut schema = Schema::default();
        let mut rows = HashMap::new();

        for TableDefinition { schema: table, rows: seed } in definitions {
            let mut indexed = HashMap::with_capacity(seed.len());
            for row in seed {
                let key = row.get(&table.primary_key).and_then(key_of).ok_or_else(|| {
                    GatewayError::Schema(format!(
                        "row in table {} has no usable {}",
                        table.name, table.primary_key
                    ))
                })?;
                indexed.insert(key, row);
            }
            rows.insert(table.name.clone(), indexed);
            schema.tables.insert(table.name.clone(), table);
        }

        Ok(Self {
            schema: Arc::new(schema),
            rows: Arc::new(RwLock::new(rows)),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: TablesFile = serde_json::from_str(&raw)?;
        Self::new(file.tables)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub async fn get(&self, table: &str, id: &str) -> Result<Row> {
        let store = self.rows.read().await;
        store
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
            .ok_or_else(|| GatewayError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn set_field(&self, table: &str, id: &str, field: &str, value: Value) -> Result<()> {
        self.schema.table(table)?.field(field)?;

        let mut store = self.rows.write().await;
        let row = store
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| GatewayError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        row.insert(field.to_string(), value);
        Ok(())
    }
}
