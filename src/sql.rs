use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertVehicle {
        draft: VehicleDraft,
    },
    SetVehicleAvailability {
        id: Ulid,
        available: bool,
    },
    /// `SET available = NOT available`
    ToggleVehicleAvailability {
        id: Ulid,
    },
    DeleteVehicle {
        id: Ulid,
    },
    SelectVehicles,
    SelectOwnerVehicles,
    SelectAvailability {
        location: String,
        range: DateRange,
    },
    SelectVehicleAvailability {
        vehicle_id: Ulid,
        range: DateRange,
    },
    InsertBooking {
        id: Ulid,
        vehicle_id: Ulid,
        range: DateRange,
    },
    UpdateBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    SelectBookings,
    SelectBooking {
        id: Ulid,
    },
    SelectOwnerBookings,
    SelectDashboard,
    InsertPasswordReset {
        user_id: Ulid,
    },
    DeletePasswordReset {
        code: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlError::Empty);
    }
    if trimmed
        .split_whitespace()
        .next()
        .is_some_and(|head| head.eq_ignore_ascii_case("UPDATE"))
    {
        return parse_update(trimmed);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_all_insert_rows(insert)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported(format!("{table}: multi-row INSERT")));
    }
    let values = &rows[0];

    match table.as_str() {
        "vehicles" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("vehicles", 3, values.len()));
            }
            let opt = |i: usize| values.get(i);
            let draft = VehicleDraft {
                id: parse_ulid_or_null(&values[0])?,
                location: parse_string(&values[1])?,
                price_per_day: parse_decimal(&values[2])?,
                brand: opt(3).map(parse_string_or_null).transpose()?.flatten().unwrap_or_default(),
                model: opt(4).map(parse_string_or_null).transpose()?.flatten().unwrap_or_default(),
                year: opt(5).map(parse_u16_or_null).transpose()?.flatten(),
                category: opt(6).map(parse_string_or_null).transpose()?.flatten(),
                transmission: opt(7).map(parse_string_or_null).transpose()?.flatten(),
                fuel_type: opt(8).map(parse_string_or_null).transpose()?.flatten(),
                seating_capacity: opt(9).map(parse_u16_or_null).transpose()?.flatten(),
                description: opt(10).map(parse_string_or_null).transpose()?.flatten(),
                image: opt(11).map(parse_string_or_null).transpose()?.flatten(),
            };
            Ok(Command::InsertVehicle { draft })
        }
        "bookings" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("bookings", 4, values.len()));
            }
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                vehicle_id: parse_ulid(&values[1])?,
                range: DateRange::new(parse_date_expr(&values[2])?, parse_date_expr(&values[3])?),
            })
        }
        "password_resets" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("password_resets", 1, 0));
            }
            Ok(Command::InsertPasswordReset {
                user_id: parse_ulid(&values[0])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "vehicles" => Ok(Command::DeleteVehicle {
            id: extract_where_id(&delete.selection)?,
        }),
        "password_resets" => {
            let code = match &delete.selection {
                Some(Expr::BinaryOp {
                    left,
                    op: ast::BinaryOperator::Eq,
                    right,
                }) if expr_column_name(left).as_deref() == Some("code") => parse_string(right)?,
                _ => return Err(SqlError::MissingFilter("code")),
            };
            Ok(Command::DeletePasswordReset { code })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "vehicles" => Ok(Command::SelectVehicles),
        "owner_vehicles" => Ok(Command::SelectOwnerVehicles),
        "bookings" => match &select.selection {
            None => Ok(Command::SelectBookings),
            selection => Ok(Command::SelectBooking {
                id: extract_where_id(selection)?,
            }),
        },
        "owner_bookings" => Ok(Command::SelectOwnerBookings),
        "dashboard" => Ok(Command::SelectDashboard),
        "availability" => {
            let mut filters = AvailabilityFilters::default();
            if let Some(selection) = &select.selection {
                extract_availability_filters(selection, &mut filters)?;
            }
            let range = DateRange::new(
                filters.pickup.ok_or(SqlError::MissingFilter("pickup"))?,
                filters.return_at.ok_or(SqlError::MissingFilter("return"))?,
            );
            match (filters.vehicle_id, filters.location) {
                (Some(vehicle_id), _) => Ok(Command::SelectVehicleAvailability { vehicle_id, range }),
                (None, Some(location)) => Ok(Command::SelectAvailability { location, range }),
                (None, None) => Err(SqlError::MissingFilter("location")),
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct AvailabilityFilters {
    location: Option<String>,
    vehicle_id: Option<Ulid>,
    pickup: Option<Ms>,
    return_at: Option<Ms>,
}

fn extract_availability_filters(expr: &Expr, filters: &mut AvailabilityFilters) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_availability_filters(left, filters)?;
                extract_availability_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq | ast::BinaryOperator::GtEq | ast::BinaryOperator::LtEq => {
                match expr_column_name(left).as_deref() {
                    Some("location") => filters.location = Some(parse_string(right)?),
                    Some("vehicle_id") => filters.vehicle_id = Some(parse_ulid(right)?),
                    Some("pickup") => filters.pickup = Some(parse_date_expr(right)?),
                    Some("return" | "return_at") => filters.return_at = Some(parse_date_expr(right)?),
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── UPDATE ────────────────────────────────────────────────────

/// `UPDATE <table> SET <col> = <expr>[, ...] WHERE id = '<ulid>'`.
/// Each assignment is read as an equality expression.
fn parse_update(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(sql)
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    let perr = |e: sqlparser::parser::ParserError| SqlError::Parse(e.to_string());

    parser.expect_keyword(Keyword::UPDATE).map_err(perr)?;
    let name = parser.parse_object_name(false).map_err(perr)?;
    let table = object_name_last(&name).ok_or_else(|| SqlError::Parse("empty table name".into()))?;
    parser.expect_keyword(Keyword::SET).map_err(perr)?;
    let assignments = parser.parse_comma_separated(Parser::parse_expr).map_err(perr)?;
    let selection = if parser.parse_keyword(Keyword::WHERE) {
        Some(parser.parse_expr().map_err(perr)?)
    } else {
        None
    };
    let _ = parser.consume_token(&Token::SemiColon);
    if parser.peek_token().token != Token::EOF {
        return Err(SqlError::Parse(format!("unexpected trailing input: {}", parser.peek_token().token)));
    }

    let id = extract_where_id(&selection)?;
    let (column, value) = match assignments.as_slice() {
        [Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }] => (
            expr_column_name(left).ok_or_else(|| SqlError::Parse("bad SET target".into()))?,
            right.as_ref(),
        ),
        [_] => return Err(SqlError::Parse("expected SET <column> = <value>".into())),
        _ => return Err(SqlError::Unsupported("multiple assignments".into())),
    };

    match (table.as_str(), column.as_str()) {
        ("vehicles", "available") => match value {
            Expr::UnaryOp {
                op: ast::UnaryOperator::Not,
                expr,
            } if expr_column_name(expr).as_deref() == Some("available") => {
                Ok(Command::ToggleVehicleAvailability { id })
            }
            _ => Ok(Command::SetVehicleAvailability {
                id,
                available: parse_bool(value)?,
            }),
        },
        ("bookings", "status") => {
            let raw = parse_string(value)?;
            let status = BookingStatus::parse(&raw).ok_or(SqlError::BadValue("status", raw))?;
            Ok(Command::UpdateBookingStatus { id, status })
        }
        ("vehicles" | "bookings", _) => Err(SqlError::Unsupported(format!("SET {column} on {table}"))),
        _ => Err(SqlError::UnknownTable(table)),
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
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
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

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
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

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if is_null(expr) { Ok(None) } else { parse_ulid(expr).map(Some) }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) { Ok(None) } else { parse_string(expr).map(Some) }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u16_or_null(expr: &Expr) -> Result<Option<u16>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    let v = parse_i64_expr(expr)?;
    u16::try_from(v)
        .map(Some)
        .map_err(|_| SqlError::Parse(format!("{v} out of u16 range")))
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    let raw = parse_string(expr)?;
    Decimal::from_str(raw.trim()).map_err(|_| SqlError::BadValue("decimal", raw))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// A date literal: integer Unix ms, `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_date(raw: &str) -> Option<Ms> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn parse_date_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => {
            parse_date(s).ok_or_else(|| SqlError::BadValue("date", s.clone()))
        }
        _ => parse_i64_expr(expr),
    }
}

/// Render Unix ms as RFC 3339 with millisecond precision.
pub fn format_ms(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    BadValue(&'static str, String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::BadValue(what, raw) => write!(f, "bad {what}: {raw}"),
        }
    }
}

impl std::error::Error for SqlError {}
