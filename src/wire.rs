use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::SlotwiseAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, schedule_json, Command};

pub struct SlotwiseHandler {
    engine: Arc<Engine>,
    query_parser: Arc<SlotwiseQueryParser>,
}

impl SlotwiseHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(SlotwiseQueryParser),
        }
    }

    async fn run(&self, query: &str, format: &Format) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertProvider { name, profile } => {
                let provider = engine.register_provider(&name, profile).await.map_err(engine_err)?;
                Ok(vec![id_response(&provider.id.to_string(), format)?])
            }
            Command::InsertStaff { provider_id, staff } => {
                let id = engine.resolve_staff(provider_id, staff).await.map_err(engine_err)?;
                Ok(vec![id_response(&id.to_string(), format)?])
            }
            Command::InsertService { provider_id, spec } => {
                let id = engine.create_service(provider_id, spec).await.map_err(engine_err)?;
                Ok(vec![id_response(&id.to_string(), format)?])
            }
            Command::UpdateService {
                provider_id,
                service_id,
                spec,
            } => {
                engine
                    .update_service(provider_id, service_id, spec)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SetServiceActive {
                provider_id,
                service_id,
                active,
            } => {
                let result = if active {
                    engine.reactivate_service(provider_id, service_id).await
                } else {
                    engine.disable_service(provider_id, service_id).await
                };
                result.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteService {
                provider_id,
                service_id,
            } => {
                engine
                    .delete_service(provider_id, service_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking {
                service_id,
                day,
                slot,
                customer,
            } => {
                let booking = engine
                    .admit_booking(service_id, day, slot, customer)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![booking_response(vec![booking], format)?])
            }
            Command::SelectProviders { id, name } => {
                let by_id = match id {
                    Some(id) => match engine.get_provider(id).await {
                        Ok(p) => Some(p),
                        Err(EngineError::NotFound(_)) => None,
                        Err(e) => return Err(engine_err(e)),
                    },
                    None => None,
                };
                let found = match (by_id, name) {
                    (Some(p), Some(name)) => (p.name == name.trim()).then_some(p),
                    (Some(p), None) => Some(p),
                    (None, Some(name)) if id.is_none() => engine.resolve_provider(&name).await,
                    (None, _) => None,
                };
                Ok(vec![provider_response(found.into_iter().collect(), format)?])
            }
            Command::SelectServices {
                provider_id,
                service_id,
                active_only,
            } => {
                let mut views = match (provider_id, service_id) {
                    (Some(pid), _) if active_only => {
                        engine.list_active_services(pid).await.map_err(engine_err)?
                    }
                    (Some(pid), _) => engine.list_services(pid).await.map_err(engine_err)?,
                    (None, Some(sid)) => match engine.get_service(sid).await {
                        Ok(v) => vec![v],
                        Err(EngineError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(engine_err(e)),
                    },
                    (None, None) => Vec::new(),
                };
                if let Some(sid) = service_id {
                    views.retain(|v| v.id == sid);
                }
                if active_only {
                    views.retain(|v| v.active);
                }
                Ok(vec![service_response(views, format)?])
            }
            Command::SelectBookings { provider_id } => {
                Ok(vec![booking_response(engine.list_bookings(provider_id), format)?])
            }
            Command::SelectSlots { service_id, day } => {
                let slots = engine.list_slots(service_id, day).await.map_err(engine_err)?;
                Ok(vec![slots_response(slots, format)?])
            }
            Command::SelectAvailableDays { service_id } => {
                let days = engine.available_days_for_service(service_id).await;
                Ok(vec![available_days_response(days, format)?])
            }
            Command::SelectAvailability {
                service_id,
                day,
                slot,
            } => {
                let available = engine.is_available(service_id, day, slot).await;
                let schema = fields_for(AVAILABILITY_COLUMNS, format);
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&service_id.to_string())?;
                encoder.encode_field(&day.abbr())?;
                encoder.encode_field(&slot.label())?;
                encoder.encode_field(&available)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

const ID_COLUMNS: &[(&str, Type)] = &[("id", Type::VARCHAR)];

const PROVIDER_COLUMNS: &[(&str, Type)] = &[
    ("id", Type::VARCHAR),
    ("name", Type::VARCHAR),
    ("owner_name", Type::VARCHAR),
    ("business_type", Type::VARCHAR),
    ("phone", Type::VARCHAR),
    ("email", Type::VARCHAR),
    ("website", Type::VARCHAR),
    ("hours", Type::VARCHAR),
    ("off_days", Type::VARCHAR),
    ("address", Type::VARCHAR),
];

const SERVICE_COLUMNS: &[(&str, Type)] = &[
    ("id", Type::VARCHAR),
    ("provider_id", Type::VARCHAR),
    ("name", Type::VARCHAR),
    ("description", Type::VARCHAR),
    ("capacity", Type::INT4),
    ("active", Type::BOOL),
    ("staff_id", Type::VARCHAR),
    ("staff_name", Type::VARCHAR),
    ("staff_role", Type::VARCHAR),
    ("schedule", Type::VARCHAR),
];

const BOOKING_COLUMNS: &[(&str, Type)] = &[
    ("id", Type::VARCHAR),
    ("service_id", Type::VARCHAR),
    ("service_name", Type::VARCHAR),
    ("day", Type::VARCHAR),
    ("slot", Type::VARCHAR),
    ("customer_name", Type::VARCHAR),
    ("phone", Type::VARCHAR),
    ("email", Type::VARCHAR),
    ("notes", Type::VARCHAR),
    ("created_at", Type::INT8),
];

const SLOT_COLUMNS: &[(&str, Type)] = &[
    ("slot", Type::VARCHAR),
    ("booked", Type::INT4),
    ("capacity", Type::INT4),
    ("available", Type::BOOL),
];

const AVAILABLE_DAY_COLUMNS: &[(&str, Type)] = &[("day", Type::VARCHAR)];

const AVAILABILITY_COLUMNS: &[(&str, Type)] = &[
    ("service_id", Type::VARCHAR),
    ("day", Type::VARCHAR),
    ("slot", Type::VARCHAR),
    ("available", Type::BOOL),
];

/// Field descriptions in the wire format the client asked for.
fn fields_for(columns: &[(&str, Type)], format: &Format) -> Arc<Vec<FieldInfo>> {
    Arc::new(
        columns
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
            })
            .collect(),
    )
}

fn id_response(id: &str, format: &Format) -> PgWireResult<Response> {
    let schema = fields_for(ID_COLUMNS, format);
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&id)?;
    let rows = vec![Ok(encoder.take_row())];
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn provider_response(providers: Vec<Provider>, format: &Format) -> PgWireResult<Response> {
    let schema = fields_for(PROVIDER_COLUMNS, format);
    let rows: Vec<PgWireResult<_>> = providers
        .into_iter()
        .map(|p| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&p.id.to_string())?;
            encoder.encode_field(&p.name)?;
            let profile = &p.profile;
            for field in [
                &profile.owner_name,
                &profile.business_type,
                &profile.phone,
                &profile.email,
                &profile.website,
                &profile.hours,
                &profile.off_days,
                &profile.address,
            ] {
                encoder.encode_field(field)?;
            }
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn service_response(views: Vec<ServiceView>, format: &Format) -> PgWireResult<Response> {
    let schema = fields_for(SERVICE_COLUMNS, format);
    let rows: Vec<PgWireResult<_>> = views
        .into_iter()
        .map(|v| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&v.id.to_string())?;
            encoder.encode_field(&v.provider_id.to_string())?;
            encoder.encode_field(&v.name)?;
            encoder.encode_field(&v.description)?;
            encoder.encode_field(&(v.capacity as i32))?;
            encoder.encode_field(&v.active)?;
            encoder.encode_field(&v.staff.id.to_string())?;
            encoder.encode_field(&v.staff_name())?;
            encoder.encode_field(&v.staff.role)?;
            encoder.encode_field(&schedule_json(&v.schedule))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn booking_response(bookings: Vec<Booking>, format: &Format) -> PgWireResult<Response> {
    let schema = fields_for(BOOKING_COLUMNS, format);
    let rows: Vec<PgWireResult<_>> = bookings
        .into_iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.service_id.to_string())?;
            encoder.encode_field(&b.service_name)?;
            encoder.encode_field(&b.day.abbr())?;
            encoder.encode_field(&b.slot.label())?;
            encoder.encode_field(&b.customer.name)?;
            encoder.encode_field(&b.customer.phone)?;
            encoder.encode_field(&b.customer.email)?;
            encoder.encode_field(&b.customer.notes)?;
            encoder.encode_field(&b.created_at)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn slots_response(slots: Vec<SlotInfo>, format: &Format) -> PgWireResult<Response> {
    let schema = fields_for(SLOT_COLUMNS, format);
    let rows: Vec<PgWireResult<_>> = slots
        .into_iter()
        .map(|info| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&info.slot.label())?;
            encoder.encode_field(&(info.booked as i32))?;
            encoder.encode_field(&(info.capacity as i32))?;
            encoder.encode_field(&info.available())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn available_days_response(days: impl IntoIterator<Item = Day>, format: &Format) -> PgWireResult<Response> {
    let schema = fields_for(AVAILABLE_DAY_COLUMNS, format);
    let rows: Vec<PgWireResult<_>> = days
        .into_iter()
        .map(|day| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&day.abbr())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

/// Result columns for a statement, decided from its verb and table without
/// binding parameters.
fn result_columns(sql: &str) -> &'static [(&'static str, Type)] {
    let lower = sql.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|t| !t.is_empty())
        .collect();
    let table_after = |keyword: &str| {
        tokens
            .iter()
            .position(|t| *t == keyword)
            .and_then(|i| tokens.get(i + 1))
            .map(|t| t.trim_matches('"'))
    };
    match tokens.first().copied() {
        Some("select") => match table_after("from") {
            Some("providers") => PROVIDER_COLUMNS,
            Some("services") => SERVICE_COLUMNS,
            Some("bookings") => BOOKING_COLUMNS,
            Some("slots") => SLOT_COLUMNS,
            Some("available_days") => AVAILABLE_DAY_COLUMNS,
            Some("availability") => AVAILABILITY_COLUMNS,
            _ => &[],
        },
        Some("insert") => match table_after("into") {
            Some("providers") | Some("services") | Some("staff") => ID_COLUMNS,
            Some("bookings") => BOOKING_COLUMNS,
            _ => &[],
        },
        _ => &[],
    }
}

fn result_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    fields_for(result_columns(sql), format).to_vec()
}

#[async_trait]
impl SimpleQueryHandler for SlotwiseHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotwiseQueryParser;

#[async_trait]
impl QueryParser for SlotwiseQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt, column_format.unwrap_or(&Format::UnifiedText)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotwiseHandler {
    type Statement = String;
    type QueryParser = SlotwiseQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql, &portal.result_column_format).await?;
        if responses.is_empty() {
            return Ok(Response::EmptyQuery);
        }
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let literals: Vec<String> = portal
        .parameters
        .iter()
        .map(|param| match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        })
        .collect();
    bind_literals(&portal.statement.statement, &literals)
}

/// Single left-to-right pass over `sql`. Each `$N` outside a quoted literal or
/// identifier becomes `literals[N - 1]`; emitted values are never rescanned.
/// A placeholder with no bound value is left as written.
fn bind_literals(sql: &str, literals: &[String]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;
    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = j + 1;
                    chars.next();
                }
                let bound = sql[start..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| literals.get(idx));
                match bound {
                    Some(literal) => out.push_str(literal),
                    None => out.push_str(&sql[i..end]),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotwiseFactory {
    handler: Arc<SlotwiseHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<SlotwiseAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotwiseFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = SlotwiseAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SlotwiseHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotwiseFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<SlotwiseFactory>,
    tls_acceptor: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, tls_acceptor, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "22023",
        EngineError::NotFoundOrUnauthorized(_) | EngineError::NotFound(_) => "42704",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::CapacityExceeded { .. } => "53400",
        EngineError::Constraint(_) => "23503",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if e.is_persistence_failure() {
        tracing::error!("persistence failure: {e}");
    } else {
        tracing::debug!("request rejected: {e}");
    }
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn sqlstates_follow_error_kind() {
        assert_eq!(sqlstate(&EngineError::validation("x")), "22023");
        assert_eq!(sqlstate(&EngineError::NotFoundOrUnauthorized(Ulid::new())), "42704");
        assert_eq!(sqlstate(&EngineError::CapacityExceeded { capacity: 2 }), "53400");
        assert_eq!(sqlstate(&EngineError::Constraint("fk")), "23503");
        assert_eq!(sqlstate(&EngineError::WalError("disk".into())), "58030");
    }

    #[test]
    fn result_schema_by_table() {
        assert_eq!(result_columns("SELECT * FROM slots WHERE service_id = $1 AND day = $2").len(), 4);
        assert_eq!(result_columns("select * from \"bookings\" where provider_id = $1").len(), 10);
        assert_eq!(result_columns("INSERT INTO services (provider_id) VALUES ($1)").len(), 1);
        assert_eq!(result_columns("INSERT INTO bookings(service_id) VALUES ($1)").len(), 10);
        assert!(result_columns("DELETE FROM services WHERE id = $1").is_empty());
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let literals = vec!["'bring $2 voucher'".to_string(), "'x'".to_string()];
        assert_eq!(
            bind_literals("VALUES ($1, $2)", &literals),
            "VALUES ('bring $2 voucher', 'x')"
        );
    }

    #[test]
    fn placeholders_inside_quotes_kept() {
        let literals = vec!["'a'".to_string()];
        assert_eq!(
            bind_literals("SELECT '$1' FROM \"t$1\" WHERE x = $1", &literals),
            "SELECT '$1' FROM \"t$1\" WHERE x = 'a'"
        );
        // Doubled quote inside a literal closes and reopens it.
        assert_eq!(bind_literals("'it''s $1' $1", &literals), "'it''s $1' 'a'");
    }

    #[test]
    fn tenth_placeholder_is_not_first() {
        let literals: Vec<String> = (1..=10).map(|n| format!("'v{n}'")).collect();
        assert_eq!(bind_literals("$1,$10", &literals), "'v1','v10'");
        assert_eq!(bind_literals("$11 $ $0", &literals), "$11 $ $0");
    }

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM slots WHERE service_id = $1 AND day = $2"), 2);
        assert_eq!(count_params("VALUES ($10, $2)"), 10);
        assert_eq!(count_params("SELECT 1"), 0);
    }
}
