use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

/// Parsed command from SQL input.
///
/// Instants stay as text: the engine owns instant parsing so that a bad
/// timestamp is reported by the admission pipeline, in pipeline order.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertReservation {
        room_id: String,
        start: String,
        end: String,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectReservations {
        room_id: Option<String>,
        start: Option<String>,
        end: Option<String>,
    },
    SelectRooms,
}

const INSERT_COLUMNS: [&str; 3] = ["room_id", "start", "end"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    match stmts.as_slice() {
        [] => Err(SqlError::Empty),
        [stmt] => match stmt {
            Statement::Insert(insert) => parse_insert(insert),
            Statement::Delete(delete) => parse_delete(delete),
            Statement::Query(query) => parse_select(query),
            other => Err(SqlError::Unsupported(format!("{other}"))),
        },
        _ => Err(SqlError::Unsupported("multiple statements".into())),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_values(insert)?;

    // Without a column list, values are positional: room_id, start, end.
    let columns: Vec<String> = if insert.columns.is_empty() {
        INSERT_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("reservations", columns.len(), values.len()));
    }

    let (mut room_id, mut start, mut end) = (None, None, None);
    for (column, value) in columns.iter().zip(values) {
        let slot = match column.as_str() {
            "room_id" => &mut room_id,
            "start" => &mut start,
            "end" => &mut end,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        };
        if slot.replace(value_text(value)?).is_some() {
            return Err(SqlError::Parse(format!("column {column} given twice")));
        }
    }

    Ok(Command::InsertReservation {
        room_id: room_id.ok_or(SqlError::MissingColumn("room_id"))?,
        start: start.ok_or(SqlError::MissingColumn("start"))?,
        end: end.ok_or(SqlError::MissingColumn("end"))?,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "reservations" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(&delete.selection)?;
    Ok(Command::DeleteReservation { id })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    match table.as_str() {
        "rooms" => {
            if select.selection.is_some() {
                return Err(SqlError::Unsupported("WHERE on rooms".into()));
            }
            Ok(Command::SelectRooms)
        }
        "reservations" => {
            let mut filters = ReservationFilters::default();
            if let Some(selection) = &select.selection {
                filters.collect(selection)?;
            }
            Ok(Command::SelectReservations {
                room_id: filters.room_id,
                start: filters.start,
                end: filters.end,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct ReservationFilters {
    room_id: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

impl ReservationFilters {
    /// Accepts a conjunction of `room_id = x` and window bounds.
    ///
    /// The window keeps reservations that overlap it, not ones it contains:
    /// `start >= x` and `"end" > x` both set the window start, while
    /// `"end" <= x` and `start < x` both set the window end. So
    /// `"end" <= '11:00'` still returns a reservation running 10:00 to 12:00.
    /// The `"end" > x AND start < y` spelling reads as the overlap it is.
    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        let Expr::BinaryOp { left, op, right } = expr else {
            return Err(SqlError::Unsupported(format!("filter {expr}")));
        };
        let slot = match (op, expr_column_name(left).as_deref()) {
            (ast::BinaryOperator::And, _) => {
                self.collect(left)?;
                return self.collect(right);
            }
            (ast::BinaryOperator::Eq, Some("room_id")) => &mut self.room_id,
            (ast::BinaryOperator::GtEq, Some("start"))
            | (ast::BinaryOperator::Gt, Some("end")) => &mut self.start,
            (ast::BinaryOperator::LtEq, Some("end"))
            | (ast::BinaryOperator::Lt, Some("start")) => &mut self.end,
            _ => return Err(SqlError::Unsupported(format!("filter {expr}"))),
        };
        *slot = Some(value_text(right)?);
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => {
            let text = value_text(right)?;
            Ulid::from_string(&text).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// A literal as text. Strings pass through; numbers keep their digits.
fn value_text(expr: &Expr) -> Result<String, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(format!("-{}", value_text(expr)?));
    }
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string or number, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
