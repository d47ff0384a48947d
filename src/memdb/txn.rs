use super::{TableRows, Tables};
use crate::catalog::types::{Datum, Row};
use crate::catalog::{Schema, TableSchema};
use crate::commit::ops::{Mutation, Mutator, Operation, OperationResult};
use std::collections::{BTreeSet, HashMap};

pub(crate) struct OpFailure {
    pub error: &'static str,
    pub details: String,
}

impl OpFailure {
    fn new(error: &'static str, details: impl Into<String>) -> Self {
        Self {
            error,
            details: details.into(),
        }
    }
}

/// Working copy of the tables for one transaction. Dropping it discards
/// every change.
pub(crate) struct Txn<'s> {
    schema: &'s Schema,
    tables: Tables,
    named: HashMap<String, String>,
}

impl<'s> Txn<'s> {
    pub fn new(schema: &'s Schema, tables: Tables) -> Self {
        Self {
            schema,
            tables,
            named: HashMap::new(),
        }
    }

    pub fn into_tables(self) -> Tables {
        self.tables
    }

    pub fn apply(&mut self, op: &Operation) -> Result<OperationResult, OpFailure> {
        match op {
            Operation::Insert {
                table,
                uuid_name,
                row,
            } => self.insert(table, uuid_name, row),
            Operation::Update { table, uuid, row } => self.update(table, uuid, row),
            Operation::Mutate {
                table,
                uuid,
                mutations,
            } => self.mutate(table, uuid, mutations),
            Operation::Delete { table, uuid } => self.delete(table, uuid),
        }
    }

    fn insert(
        &mut self,
        table: &str,
        uuid_name: &str,
        row: &Row,
    ) -> Result<OperationResult, OpFailure> {
        let schema = self.table_schema(table)?;
        if self.named.contains_key(uuid_name) {
            return Err(OpFailure::new(
                "duplicate uuid-name",
                format!("uuid-name '{uuid_name}' used twice"),
            ));
        }
        let mut stored = Row::new();
        for column in &schema.columns {
            stored.insert(column.name, Datum::default_for(column.kind));
        }
        for (column, value) in row.iter() {
            validate_column(schema, column, value)?;
            stored.insert(column.clone(), self.resolve_datum(value));
        }
        let uuid = uuid::Uuid::new_v4().to_string();
        self.named.insert(uuid_name.to_string(), uuid.clone());
        self.rows_mut(table)?.insert(uuid.clone(), stored);
        Ok(OperationResult::inserted(uuid))
    }

    fn update(&mut self, table: &str, uuid: &str, row: &Row) -> Result<OperationResult, OpFailure> {
        let schema = self.table_schema(table)?;
        for (column, value) in row.iter() {
            validate_column(schema, column, value)?;
        }
        let resolved: Vec<(String, Datum)> = row
            .iter()
            .map(|(c, v)| (c.clone(), self.resolve_datum(v)))
            .collect();
        let uuid = self.resolve_uuid(uuid);
        let Some(existing) = self.rows_mut(table)?.get_mut(&uuid) else {
            return Ok(OperationResult::affected(0));
        };
        for (column, value) in resolved {
            existing.insert(column, value);
        }
        Ok(OperationResult::affected(1))
    }

    fn mutate(
        &mut self,
        table: &str,
        uuid: &str,
        mutations: &[Mutation],
    ) -> Result<OperationResult, OpFailure> {
        let schema = self.table_schema(table)?;
        for mutation in mutations {
            validate_column(schema, &mutation.column, &mutation.value)?;
            if !matches!(mutation.value, Datum::UuidSet(_) | Datum::Map(_)) {
                return Err(OpFailure::new(
                    "constraint violation",
                    format!("column '{}' cannot be mutated", mutation.column),
                ));
            }
        }
        let resolved: Vec<Mutation> = mutations
            .iter()
            .map(|m| Mutation {
                value: self.resolve_datum(&m.value),
                ..m.clone()
            })
            .collect();
        let uuid = self.resolve_uuid(uuid);
        let Some(existing) = self.rows_mut(table)?.get_mut(&uuid) else {
            return Ok(OperationResult::affected(0));
        };
        for mutation in resolved {
            apply_mutation(existing, mutation);
        }
        Ok(OperationResult::affected(1))
    }

    fn delete(&mut self, table: &str, uuid: &str) -> Result<OperationResult, OpFailure> {
        self.table_schema(table)?;
        let uuid = self.resolve_uuid(uuid);
        let removed = self.rows_mut(table)?.remove(&uuid).is_some();
        Ok(OperationResult::affected(usize::from(removed)))
    }

    /// Every reference column must point at existing rows.
    pub fn check_references(&self) -> Result<(), OpFailure> {
        for (table, column, target) in self.schema.references() {
            let Some(rows) = self.tables.get(table) else {
                continue;
            };
            let targets = self.tables.get(target);
            for (uuid, row) in rows.iter() {
                let Some(Datum::UuidSet(refs)) = row.get(column) else {
                    continue;
                };
                if let Some(missing) = refs
                    .iter()
                    .find(|r| !targets.is_some_and(|t| t.contains_key(*r)))
                {
                    return Err(OpFailure::new(
                        "referential integrity violation",
                        format!(
                            "row {uuid} of table {table} column {column} references \
                             missing row {missing} of table {target}"
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn collect_garbage(&mut self) {
        let references = self.schema.references();
        let weak: Vec<&'static str> = self
            .schema
            .tables()
            .filter(|t| !t.is_root)
            .map(|t| t.name)
            .collect();
        for table in weak {
            let mut referenced = BTreeSet::new();
            for (source, column, _) in references.iter().filter(|(_, _, t)| *t == table) {
                if let Some(rows) = self.tables.get(*source) {
                    for row in rows.values() {
                        if let Some(Datum::UuidSet(refs)) = row.get(column) {
                            referenced.extend(refs.iter().cloned());
                        }
                    }
                }
            }
            if let Some(rows) = self.tables.get_mut(table) {
                let stale: Vec<String> = rows
                    .keys()
                    .filter(|uuid| !referenced.contains(*uuid))
                    .cloned()
                    .collect();
                for uuid in stale {
                    rows.remove(&uuid);
                }
            }
        }
    }

    fn table_schema(&self, table: &str) -> Result<&'s TableSchema, OpFailure> {
        self.schema
            .table(table)
            .ok_or_else(|| OpFailure::new("unknown table", format!("no table '{table}'")))
    }

    fn rows_mut(&mut self, table: &str) -> Result<&mut TableRows, OpFailure> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| OpFailure::new("unknown table", format!("no table '{table}'")))
    }

    fn resolve_uuid(&self, id: &str) -> String {
        self.named.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn resolve_datum(&self, value: &Datum) -> Datum {
        match value {
            Datum::UuidSet(ids) => Datum::UuidSet(ids.iter().map(|id| self.resolve_uuid(id)).collect()),
            other => other.clone(),
        }
    }
}

fn validate_column(schema: &TableSchema, column: &str, value: &Datum) -> Result<(), OpFailure> {
    let Some(def) = schema.column(column) else {
        return Err(OpFailure::new(
            "constraint violation",
            format!("table {} has no column '{column}'", schema.name),
        ));
    };
    if def.kind != value.kind() {
        return Err(OpFailure::new(
            "constraint violation",
            format!(
                "column '{column}' expects {}, got {}",
                def.kind.as_str(),
                value.kind().as_str()
            ),
        ));
    }
    Ok(())
}

fn apply_mutation(row: &mut Row, mutation: Mutation) {
    let current = row
        .columns
        .remove(&mutation.column)
        .unwrap_or_else(|| Datum::default_for(mutation.value.kind()));
    let next = match (current, mutation.value, mutation.mutator) {
        (Datum::UuidSet(mut set), Datum::UuidSet(values), Mutator::Insert) => {
            set.extend(values);
            Datum::UuidSet(set)
        }
        (Datum::UuidSet(mut set), Datum::UuidSet(values), Mutator::Delete) => {
            set.retain(|id| !values.contains(id));
            Datum::UuidSet(set)
        }
        (Datum::Map(mut map), Datum::Map(values), Mutator::Insert) => {
            for (k, v) in values {
                map.entry(k).or_insert(v);
            }
            Datum::Map(map)
        }
        (Datum::Map(mut map), Datum::Map(values), Mutator::Delete) => {
            map.retain(|k, _| !values.contains_key(k));
            Datum::Map(map)
        }
        (current, _, _) => current,
    };
    row.insert(mutation.column, next);
}
