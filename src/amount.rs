// applepay_gateway/src/amount.rs
// Resolves the payable amount for a row: direct field, foreign-key lookup or formula

use serde_json::Value;
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::money::Amount;
use crate::tables::{key_of, FieldKind, Row, Schema, TableSchema, TableStore};

/// Selector value that switches resolution to the configured formula.
pub const FORMULA_SELECTOR: &str = "Formula";

// ═══════════════════════════════════════════════════════════════════════════════
// FORMULA EVALUATION (injected)
// ═══════════════════════════════════════════════════════════════════════════════

/// Expression language supplied by the embedding application.
pub trait FormulaEvaluator: Send + Sync {
    /// Names the expression reads. Dotted names (`product.price`) are joined
    /// in from the referenced table before evaluation.
    fn free_variables(&self, expression: &str) -> Vec<String>;

    fn evaluate(&self, expression: &str, context: &Row) -> Result<f64>;
}

/// Installed when no expression language is wired in; every formula fails.
pub struct NoFormulas;

impl FormulaEvaluator for NoFormulas {
    fn free_variables(&self, _expression: &str) -> Vec<String> {
        Vec::new()
    }

    fn evaluate(&self, expression: &str, _context: &Row) -> Result<f64> {
        Err(GatewayError::Formula(format!(
            "no formula evaluator configured for {:?}",
            expression
        )))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// One hop across a `Key` field: `via` on the row points at `table`, read `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub name: String,
    pub via: String,
    pub table: String,
    pub target: String,
}

impl Join {
    fn resolve(table: &TableSchema, schema: &Schema, dotted: &str) -> Result<Self> {
        let (via, target) = dotted
            .split_once('.')
            .ok_or_else(|| GatewayError::Schema(format!("{} is not a dotted reference", dotted)))?;

        let key = table.field(via)?;
        let referenced = match (key.kind, key.references.as_deref()) {
            (FieldKind::Key, Some(name)) => schema.table(name)?,
            _ => {
                return Err(GatewayError::Schema(format!(
                    "{}.{} is not a key field",
                    table.name, via
                )))
            }
        };
        referenced.field(target)?;

        Ok(Self {
            name: dotted.to_string(),
            via: via.to_string(),
            table: referenced.name.clone(),
            target: target.to_string(),
        })
    }

    async fn fetch(&self, store: &TableStore, row: &Row) -> Result<Value> {
        let id = row.get(&self.via).and_then(key_of).ok_or_else(|| {
            GatewayError::UnresolvedAmount(format!("row has no {} reference", self.via))
        })?;
        let referenced = store.get(&self.table, &id).await?;
        Ok(referenced.get(&self.target).cloned().unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountSource {
    Field(String),
    Reference(Join),
    Formula { expression: String, joins: Vec<Join> },
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AmountResolver {
    table: String,
    source: AmountSource,
    evaluator: Arc<dyn FormulaEvaluator>,
}

impl AmountResolver {
    /// Checks the selector against the schema once, up front.
    pub fn new(
        schema: &Schema,
        table: &str,
        selector: &str,
        formula: Option<&str>,
        evaluator: Arc<dyn FormulaEvaluator>,
    ) -> Result<Self> {
        let table_schema = schema.table(table)?;

        let source = if selector == FORMULA_SELECTOR {
            let expression = formula
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| {
                    GatewayError::Config("amount selector is Formula but no formula is set".into())
                })?
                .to_string();
            let joins = evaluator
                .free_variables(&expression)
                .iter()
                .filter(|name| name.contains('.'))
                .map(|name| Join::resolve(table_schema, schema, name))
                .collect::<Result<Vec<_>>>()?;
            AmountSource::Formula { expression, joins }
        } else if selector.contains('.') {
            AmountSource::Reference(Join::resolve(table_schema, schema, selector)?)
        } else {
            let field = table_schema.field(selector)?;
            if !field.kind.is_numeric() {
                return Err(GatewayError::Schema(format!(
                    "{}.{} cannot hold an amount",
                    table, selector
                )));
            }
            AmountSource::Field(selector.to_string())
        };

        Ok(Self {
            table: table.to_string(),
            source,
            evaluator,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn source(&self) -> &AmountSource {
        &self.source
    }

    pub async fn resolve(&self, store: &TableStore, row: &Row) -> Result<Amount> {
        match &self.source {
            AmountSource::Field(field) => {
                to_amount(field, row.get(field).cloned().unwrap_or(Value::Null))
            }
            AmountSource::Reference(join) => to_amount(&join.name, join.fetch(store, row).await?),
            AmountSource::Formula { expression, joins } => {
                let mut context = row.clone();
                for join in joins {
                    context.insert(join.name.clone(), join.fetch(store, row).await?);
                }
                let value = self.evaluator.evaluate(expression, &context)?;
                Amount::from_f64(value)
                    .map_err(|e| GatewayError::UnresolvedAmount(format!("{}: {}", expression, e)))
            }
        }
    }

    /// Loads the row by id from the checkout table, then resolves.
    pub async fn resolve_row(&self, store: &TableStore, id: &str) -> Result<Amount> {
        let row = store.get(&self.table, id).await?;
        self.resolve(store, &row).await
    }
}

fn to_amount(name: &str, value: Value) -> Result<Amount> {
    Amount::from_value(&value).map_err(|e| GatewayError::UnresolvedAmount(format!("{}: {}", name, e)))
}
