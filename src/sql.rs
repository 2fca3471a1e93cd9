use std::collections::BTreeMap;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::limits::MAX_SCHEDULE_JSON_LEN;
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertProvider {
        name: String,
        profile: ProviderProfile,
    },
    InsertStaff {
        provider_id: Ulid,
        staff: StaffRef,
    },
    InsertService {
        provider_id: Ulid,
        spec: ServiceSpec,
    },
    UpdateService {
        provider_id: Ulid,
        service_id: Ulid,
        spec: ServiceSpec,
    },
    SetServiceActive {
        provider_id: Ulid,
        service_id: Ulid,
        active: bool,
    },
    DeleteService {
        provider_id: Ulid,
        service_id: Ulid,
    },
    InsertBooking {
        service_id: Ulid,
        day: Day,
        slot: TimeSlot,
        customer: Customer,
    },
    SelectProviders {
        id: Option<Ulid>,
        name: Option<String>,
    },
    SelectServices {
        provider_id: Option<Ulid>,
        service_id: Option<Ulid>,
        active_only: bool,
    },
    SelectBookings {
        provider_id: Ulid,
    },
    SelectSlots {
        service_id: Ulid,
        day: Day,
    },
    SelectAvailableDays {
        service_id: Ulid,
    },
    SelectAvailability {
        service_id: Ulid,
        day: Day,
        slot: TimeSlot,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "providers" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("providers", 1, 0));
            }
            let text = |i: usize| -> Result<String, SqlError> {
                values.get(i).map(parse_text_or_null).unwrap_or(Ok(String::new()))
            };
            Ok(Command::InsertProvider {
                name: parse_text(&values[0])?,
                profile: ProviderProfile {
                    owner_name: text(1)?,
                    business_type: text(2)?,
                    phone: text(3)?,
                    email: text(4)?,
                    website: text(5)?,
                    hours: text(6)?,
                    off_days: text(7)?,
                    address: text(8)?,
                },
            })
        }
        "staff" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("staff", 4, values.len()));
            }
            Ok(Command::InsertStaff {
                provider_id: parse_ulid(&values[0])?,
                staff: StaffRef {
                    first_name: parse_text(&values[1])?,
                    last_name: parse_text(&values[2])?,
                    role: parse_text(&values[3])?,
                },
            })
        }
        "services" => {
            if values.len() < 8 {
                return Err(SqlError::WrongArity("services", 8, values.len()));
            }
            Ok(Command::InsertService {
                provider_id: parse_ulid(&values[0])?,
                spec: ServiceSpec {
                    name: parse_text(&values[1])?,
                    capacity: parse_u32(&values[2])?,
                    staff: StaffRef {
                        first_name: parse_text(&values[3])?,
                        last_name: parse_text(&values[4])?,
                        role: parse_text(&values[5])?,
                    },
                    description: parse_text(&values[6])?,
                    schedule: parse_schedule_json(&parse_text(&values[7])?)?,
                },
            })
        }
        "bookings" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("bookings", 4, values.len()));
            }
            let text = |i: usize| -> Result<String, SqlError> {
                values.get(i).map(parse_text_or_null).unwrap_or(Ok(String::new()))
            };
            Ok(Command::InsertBooking {
                service_id: parse_ulid(&values[0])?,
                day: parse_day(&values[1])?,
                slot: parse_slot(&values[2])?,
                customer: Customer {
                    name: parse_text(&values[3])?,
                    phone: text(4)?,
                    email: text(5)?,
                    notes: text(6)?,
                },
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `UPDATE services SET active = <bool> WHERE ...` flips the flag. Any other
/// UPDATE must set every editable column and replaces the service.
fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "services" {
        return Err(SqlError::UnknownTable(name));
    }
    let filters = collect_filters(selection)?;
    let service_id = parse_ulid(require_filter(&filters, "id")?)?;
    let provider_id = parse_ulid(require_filter(&filters, "provider_id")?)?;

    let mut set: BTreeMap<String, &Expr> = BTreeMap::new();
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.insert(column, &assignment.value);
    }

    if set.len() == 1
        && let Some(active) = set.get("active")
    {
        return Ok(Command::SetServiceActive {
            provider_id,
            service_id,
            active: parse_bool(active)?,
        });
    }

    let column = |col: &'static str| -> Result<&Expr, SqlError> {
        set.get(col).copied().ok_or(SqlError::MissingColumn(col))
    };
    Ok(Command::UpdateService {
        provider_id,
        service_id,
        spec: ServiceSpec {
            name: parse_text(column("name")?)?,
            capacity: parse_u32(column("capacity")?)?,
            staff: StaffRef {
                first_name: parse_text(column("first_name")?)?,
                last_name: parse_text(column("last_name")?)?,
                role: parse_text(column("role")?)?,
            },
            description: parse_text(column("description")?)?,
            schedule: parse_schedule_json(&parse_text(column("schedule")?)?)?,
        },
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "services" {
        return Err(SqlError::UnknownTable(table));
    }
    let filters = collect_filters(&delete.selection)?;
    Ok(Command::DeleteService {
        service_id: parse_ulid(require_filter(&filters, "id")?)?,
        provider_id: parse_ulid(require_filter(&filters, "provider_id")?)?,
    })
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
    let filters = collect_filters(&select.selection)?;
    let ulid_filter = |col: &'static str| -> Result<Option<Ulid>, SqlError> {
        filters.get(col).map(|e| parse_ulid(e)).transpose()
    };

    match table.as_str() {
        "providers" => {
            let id = ulid_filter("id")?;
            let name = filters.get("name").map(|e| parse_text(e)).transpose()?;
            if id.is_none() && name.is_none() {
                return Err(SqlError::MissingFilter("id or name"));
            }
            Ok(Command::SelectProviders { id, name })
        }
        "services" => {
            let provider_id = ulid_filter("provider_id")?;
            let service_id = ulid_filter("id")?;
            if provider_id.is_none() && service_id.is_none() {
                return Err(SqlError::MissingFilter("provider_id or id"));
            }
            let active_only = filters.get("active").map(|e| parse_bool(e)).transpose()?;
            if active_only == Some(false) {
                return Err(SqlError::Unsupported("active = false filter".into()));
            }
            Ok(Command::SelectServices {
                provider_id,
                service_id,
                active_only: active_only.unwrap_or(false),
            })
        }
        "bookings" => Ok(Command::SelectBookings {
            provider_id: parse_ulid(require_filter(&filters, "provider_id")?)?,
        }),
        "slots" => Ok(Command::SelectSlots {
            service_id: parse_ulid(require_filter(&filters, "service_id")?)?,
            day: parse_day(require_filter(&filters, "day")?)?,
        }),
        "available_days" => Ok(Command::SelectAvailableDays {
            service_id: parse_ulid(require_filter(&filters, "service_id")?)?,
        }),
        "availability" => Ok(Command::SelectAvailability {
            service_id: parse_ulid(require_filter(&filters, "service_id")?)?,
            day: parse_day(require_filter(&filters, "day")?)?,
            slot: parse_slot(require_filter(&filters, "slot")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Gather `column = value` terms joined by AND. Anything else is rejected so
/// a filter is never silently ignored.
fn collect_filters(selection: &Option<Expr>) -> Result<BTreeMap<String, &Expr>, SqlError> {
    fn walk<'a>(expr: &'a Expr, out: &mut BTreeMap<String, &'a Expr>) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => walk(inner, out),
            Expr::BinaryOp { left, op, right } => match op {
                ast::BinaryOperator::And => {
                    walk(left, out)?;
                    walk(right, out)
                }
                ast::BinaryOperator::Eq => {
                    let col = expr_column_name(left)
                        .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                    out.insert(col, right.as_ref());
                    Ok(())
                }
                _ => Err(SqlError::Unsupported(format!("operator {op}"))),
            },
            _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
        }
    }

    let mut out = BTreeMap::new();
    if let Some(expr) = selection {
        walk(expr, &mut out)?;
    }
    Ok(out)
}

fn require_filter<'a>(filters: &BTreeMap<String, &'a Expr>, col: &'static str) -> Result<&'a Expr, SqlError> {
    filters.get(col).copied().ok_or(SqlError::MissingFilter(col))
}

// ── Schedule JSON ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum SlotInput {
    Pair(String, String),
    Label(String),
}

/// Day entries in document order. Repeated keys are kept so schedule
/// validation can reject them instead of the last one silently winning.
struct DayEntries(Vec<(String, Vec<SlotInput>)>);

impl<'de> Deserialize<'de> for DayEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = DayEntries;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an object of day -> slot list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DayEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(DayEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Parse `{"mon": [["09:00", "10:00"], "11:00 - 12:00"], ...}` into raw slots.
/// Empty strings are kept as placeholders; validation drops them later.
pub fn parse_schedule_json(json: &str) -> Result<RawSchedule, SqlError> {
    if json.len() > MAX_SCHEDULE_JSON_LEN {
        return Err(SqlError::Parse("schedule JSON too large".into()));
    }
    let DayEntries(days) =
        serde_json::from_str(json).map_err(|e| SqlError::Parse(format!("bad schedule JSON: {e}")))?;
    days.into_iter()
        .map(|(day, slots)| {
            let slots = slots
                .into_iter()
                .map(|slot| match slot {
                    SlotInput::Pair(start, end) => Ok(RawSlot::new(start, end)),
                    SlotInput::Label(label) => label
                        .split_once('-')
                        .map(|(start, end)| RawSlot::new(start.trim(), end.trim()))
                        .ok_or_else(|| SqlError::Parse(format!("bad slot label: {label:?}"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((day, slots))
        })
        .collect()
}

/// Render a schedule in the same JSON shape `parse_schedule_json` accepts.
pub fn schedule_json(schedule: &Schedule) -> String {
    let map: BTreeMap<&str, Vec<[String; 2]>> = schedule
        .iter()
        .map(|(day, slots)| {
            (
                day.abbr(),
                slots.iter().map(|s| [s.start.to_string(), s.end.to_string()]).collect(),
            )
        })
        .collect();
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".into())
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

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
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

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text_or_null(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(String::new()),
        _ => parse_text(expr),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_text(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_day(expr: &Expr) -> Result<Day, SqlError> {
    let s = parse_text(expr)?;
    Day::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad day: {s:?}")))
}

fn parse_slot(expr: &Expr) -> Result<TimeSlot, SqlError> {
    let s = parse_text(expr)?;
    TimeSlot::parse_label(&s).ok_or_else(|| SqlError::Parse(format!("bad slot: {s:?}")))
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
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
            _ => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
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
    MissingColumn(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing SET column: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const P: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const S: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn slot(label: &str) -> TimeSlot {
        TimeSlot::parse_label(label).unwrap()
    }

    #[test]
    fn parse_insert_provider_minimal() {
        let cmd = parse_sql("INSERT INTO providers (name) VALUES ('Sharp Cuts')").unwrap();
        assert_eq!(
            cmd,
            Command::InsertProvider {
                name: "Sharp Cuts".into(),
                profile: ProviderProfile::default(),
            }
        );
    }

    #[test]
    fn parse_insert_provider_with_profile() {
        let sql = "INSERT INTO providers (name, owner_name, business_type, phone, email, website, hours, off_days, address) \
                   VALUES ('Sharp Cuts', 'Ana Ruiz', 'Barbershop', '555-0100', NULL, '', '9-5', 'sun', '1 Main St')";
        match parse_sql(sql).unwrap() {
            Command::InsertProvider { name, profile } => {
                assert_eq!(name, "Sharp Cuts");
                assert_eq!(profile.owner_name, "Ana Ruiz");
                assert_eq!(profile.email, "");
                assert_eq!(profile.address, "1 Main St");
            }
            cmd => panic!("expected InsertProvider, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_service() {
        let sql = format!(
            r#"INSERT INTO services (provider_id, name, capacity, first_name, last_name, role, description, schedule)
               VALUES ('{P}', 'Haircut', 2, 'Ana', 'Ruiz', 'Barber', 'Wash and cut',
                       '{{"mon": [["09:00", "10:00"], ["", ""]], "tue": ["13:00 - 14:00"]}}')"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertService { provider_id, spec } => {
                assert_eq!(provider_id.to_string(), P);
                assert_eq!(spec.name, "Haircut");
                assert_eq!(spec.capacity, 2);
                assert_eq!(spec.staff, StaffRef::new("Ana", "Ruiz", "Barber"));
                assert_eq!(
                    spec.schedule,
                    vec![
                        ("mon".to_string(), vec![RawSlot::new("09:00", "10:00"), RawSlot::default()]),
                        ("tue".to_string(), vec![RawSlot::new("13:00", "14:00")]),
                    ]
                );
            }
            cmd => panic!("expected InsertService, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_service_wrong_arity() {
        let sql = format!("INSERT INTO services (provider_id, name) VALUES ('{P}', 'Haircut')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("services", 8, 2))));
    }

    #[test]
    fn parse_update_service_full() {
        let sql = format!(
            r#"UPDATE services SET name = 'Trim', capacity = 3, first_name = 'Ben', last_name = 'Cole',
               role = 'Barber', description = 'Quick trim', schedule = '{{"fri": [["15:00", "16:00"]]}}'
               WHERE id = '{S}' AND provider_id = '{P}'"#
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateService { provider_id, service_id, spec } => {
                assert_eq!(provider_id.to_string(), P);
                assert_eq!(service_id.to_string(), S);
                assert_eq!(spec.capacity, 3);
                assert_eq!(spec.schedule, vec![("fri".to_string(), vec![RawSlot::new("15:00", "16:00")])]);
            }
            cmd => panic!("expected UpdateService, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_active_flag() {
        let sql = format!("UPDATE services SET active = false WHERE provider_id = '{P}' AND id = '{S}'");
        match parse_sql(&sql).unwrap() {
            Command::SetServiceActive { active, .. } => assert!(!active),
            cmd => panic!("expected SetServiceActive, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_partial_is_rejected() {
        let sql = format!("UPDATE services SET name = 'Trim' WHERE id = '{S}' AND provider_id = '{P}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn(_))));

        let sql = format!("UPDATE services SET active = true WHERE id = '{S}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("provider_id"))));
    }

    #[test]
    fn parse_delete_service_requires_owner() {
        let sql = format!("DELETE FROM services WHERE id = '{S}' AND provider_id = '{P}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::DeleteService { .. }));

        let sql = format!("DELETE FROM services WHERE id = '{S}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("provider_id"))));
    }

    #[test]
    fn parse_insert_booking() {
        let sql = format!(
            "INSERT INTO bookings (service_id, day, slot, customer_name, phone) VALUES ('{S}', 'Mon', '09:00 - 10:00', 'Ann', '555-0100')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertBooking {
                service_id: Ulid::from_string(S).unwrap(),
                day: Day::Mon,
                slot: slot("09:00 - 10:00"),
                customer: Customer {
                    name: "Ann".into(),
                    phone: "555-0100".into(),
                    ..Customer::default()
                },
            }
        );
    }

    #[test]
    fn parse_insert_booking_bad_day() {
        let sql = format!("INSERT INTO bookings (service_id, day, slot, customer_name) VALUES ('{S}', 'Funday', '09:00 - 10:00', 'Ann')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_services_active() {
        let sql = format!("SELECT * FROM services WHERE provider_id = '{P}' AND active = true");
        match parse_sql(&sql).unwrap() {
            Command::SelectServices { provider_id, service_id, active_only } => {
                assert_eq!(provider_id.unwrap().to_string(), P);
                assert_eq!(service_id, None);
                assert!(active_only);
            }
            cmd => panic!("expected SelectServices, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_services_needs_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM services"),
            Err(SqlError::MissingFilter(_))
        ));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!("SELECT * FROM availability WHERE service_id = '{S}' AND day = 'mon' AND slot = '09:00 - 10:00'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability {
                service_id: Ulid::from_string(S).unwrap(),
                day: Day::Mon,
                slot: slot("09:00 - 10:00"),
            }
        );
    }

    #[test]
    fn parse_select_slots_and_days() {
        let sql = format!("SELECT * FROM slots WHERE service_id = '{S}' AND day = 'wed'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::SelectSlots { day: Day::Wed, .. }));
        let sql = format!("SELECT * FROM available_days WHERE service_id = '{S}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::SelectAvailableDays { .. }));
    }

    #[test]
    fn parse_select_provider_by_name() {
        let cmd = parse_sql("SELECT * FROM providers WHERE name = 'Sharp Cuts'").unwrap();
        assert_eq!(
            cmd,
            Command::SelectProviders {
                id: None,
                name: Some("Sharp Cuts".into()),
            }
        );
    }

    #[test]
    fn non_equality_filters_rejected() {
        let sql = format!("SELECT * FROM bookings WHERE provider_id = '{P}' OR 1 = 1");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = "INSERT INTO foobar (id) VALUES ('x')";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }

    #[test]
    fn schedule_json_roundtrip() {
        let mut schedule = Schedule::new();
        schedule.insert(Day::Tue, vec![slot("09:00 - 10:00"), slot("08:00 - 08:30")]);
        let json = schedule_json(&schedule);
        assert_eq!(json, r#"{"tue":[["09:00","10:00"],["08:00","08:30"]]}"#);
        let raw = parse_schedule_json(&json).unwrap();
        assert_eq!(crate::engine::validate_schedule(&raw).unwrap(), schedule);
    }

    #[test]
    fn schedule_json_rejects_garbage() {
        assert!(parse_schedule_json("[1, 2]").is_err());
        assert!(parse_schedule_json(r#"{"mon": "09:00 - 10:00"}"#).is_err());
        assert!(parse_schedule_json(r#"{"mon": ["0900"]}"#).is_err());
    }

    #[test]
    fn schedule_json_keeps_repeated_days_in_order() {
        let raw = parse_schedule_json(
            r#"{"wed": ["14:00 - 15:00"], "mon": [["09:00", "10:00"]], "mon": [["11:00", "12:00"]]}"#,
        )
        .unwrap();
        let days: Vec<&str> = raw.iter().map(|(day, _)| day.as_str()).collect();
        assert_eq!(days, vec!["wed", "mon", "mon"]);
        assert!(matches!(
            crate::engine::validate_schedule(&raw),
            Err(crate::engine::EngineError::Validation(_))
        ));
    }
}
