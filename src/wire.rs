use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type, METADATA_USER};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::{FleetAuthSource, IdentityProvider, LoginNameIdentity};
use crate::engine::{Engine, EngineError, ErrorKind};
use crate::model::*;
use crate::observability;
use crate::sql::{self, format_ms, Command};

pub struct FleetHandler {
    engine: Arc<Engine>,
    identity: Arc<dyn IdentityProvider>,
    request_timeout: Duration,
    query_parser: Arc<FleetQueryParser>,
}

impl FleetHandler {
    pub fn new(engine: Arc<Engine>, identity: Arc<dyn IdentityProvider>, request_timeout: Duration) -> Self {
        Self {
            engine,
            identity,
            request_timeout,
            query_parser: Arc::new(FleetQueryParser),
        }
    }

    fn resolve_requester<C: ClientInfo>(&self, client: &C) -> PgWireResult<Requester> {
        let login = client
            .metadata()
            .get(METADATA_USER)
            .cloned()
            .unwrap_or_default();
        self.identity
            .resolve(&login)
            .map_err(|e| user_error("28000", format!("cannot identify caller: {e}")))
    }

    /// Execute one statement under the request timeout and record RED metrics.
    async fn run(&self, requester: Requester, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        debug!("{} as {}:{}", label, requester.role.as_str(), requester.user_id);

        let start = Instant::now();
        let result = match tokio::time::timeout(self.request_timeout, self.execute_command(requester, cmd)).await {
            Ok(result) => result,
            Err(_) => Err(engine_err(EngineError::Timeout)),
        };
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, requester: Requester, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        let me = requester.user_id;
        match cmd {
            Command::InsertVehicle { draft } => {
                require_owner(&requester)?;
                let vehicle = engine.list_vehicle(me, draft).await.map_err(engine_err)?;
                vehicle_rows(vec![vehicle])
            }
            Command::SetVehicleAvailability { id, available } => {
                let vehicle = engine
                    .set_vehicle_availability(me, id, available)
                    .await
                    .map_err(engine_err)?;
                vehicle_rows(vec![vehicle])
            }
            Command::ToggleVehicleAvailability { id } => {
                let vehicle = engine
                    .toggle_vehicle_availability(me, id)
                    .await
                    .map_err(engine_err)?;
                vehicle_rows(vec![vehicle])
            }
            Command::DeleteVehicle { id } => {
                engine.remove_vehicle(me, id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectVehicles => vehicle_rows(engine.list_catalog().await),
            Command::SelectOwnerVehicles => {
                require_owner(&requester)?;
                vehicle_rows(engine.owner_vehicles(me).await)
            }
            Command::SelectAvailability { location, range } => {
                let found = engine
                    .list_available_vehicles(&location, range)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let rows: Vec<PgWireResult<_>> = found
                    .iter()
                    .map(|item| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encode_vehicle(&mut encoder, &item.vehicle)?;
                        encoder.encode_field(&item.is_available)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectVehicleAvailability { vehicle_id, range } => {
                let free = engine.is_available(vehicle_id, range).await.map_err(engine_err)?;
                let schema = Arc::new(vehicle_availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&vehicle_id.to_string())?;
                encoder.encode_field(&format_ms(range.pickup))?;
                encoder.encode_field(&format_ms(range.return_at))?;
                encoder.encode_field(&free)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertBooking { id, vehicle_id, range } => {
                let booking = engine
                    .create_booking(id, me, vehicle_id, range)
                    .await
                    .map_err(engine_err)?;
                let vehicle = engine.find_vehicle(vehicle_id).await;
                booking_rows(vec![BookingView { booking, vehicle }])
            }
            Command::UpdateBookingStatus { id, status } => {
                engine.change_status(me, id, status).await.map_err(engine_err)?;
                let view = engine
                    .get_booking(id)
                    .await
                    .ok_or_else(|| engine_err(EngineError::BookingNotFound(id)))?;
                booking_rows(vec![view])
            }
            Command::SelectBookings => booking_rows(engine.bookings_for_user(me).await),
            Command::SelectBooking { id } => {
                // Visible to the renter and to the vehicle's owner only.
                let views = engine
                    .get_booking(id)
                    .await
                    .filter(|v| v.booking.renter_id == me || v.booking.owner_id == me)
                    .into_iter()
                    .collect();
                booking_rows(views)
            }
            Command::SelectOwnerBookings => {
                require_owner(&requester)?;
                booking_rows(engine.bookings_for_owner(me).await)
            }
            Command::SelectDashboard => {
                require_owner(&requester)?;
                let summary = engine.owner_dashboard(me).await;
                let recent = serde_json::to_string(&summary.recent_bookings)
                    .map_err(|e| user_error("XX000", format!("cannot encode recent bookings: {e}")))?;
                let schema = Arc::new(dashboard_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(summary.total_vehicles as i64))?;
                encoder.encode_field(&(summary.total_bookings as i64))?;
                encoder.encode_field(&(summary.pending_bookings as i64))?;
                encoder.encode_field(&(summary.completed_bookings as i64))?;
                encoder.encode_field(&summary.monthly_revenue.to_string())?;
                encoder.encode_field(&recent)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertPasswordReset { user_id } => {
                // The code itself goes out through the notification sinks.
                let reset = engine.issue_reset_code(user_id).await.map_err(engine_err)?;
                let schema = Arc::new(reset_issued_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&reset.user_id.to_string())?;
                encoder.encode_field(&format_ms(reset.expires_at))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::DeletePasswordReset { code } => {
                let user_id = engine.redeem_reset_code(&code).await.map_err(engine_err)?;
                let schema = Arc::new(reset_redeemed_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&user_id.to_string())?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

fn require_owner(requester: &Requester) -> PgWireResult<()> {
    match requester.role {
        Role::Owner => Ok(()),
        Role::User => Err(user_error("42501", "owner role required".to_string())),
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn vehicle_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("owner_id", Type::VARCHAR),
        field("location", Type::VARCHAR),
        field("price_per_day", Type::VARCHAR),
        field("available", Type::BOOL),
        field("brand", Type::VARCHAR),
        field("model", Type::VARCHAR),
        field("year", Type::INT4),
        field("category", Type::VARCHAR),
        field("transmission", Type::VARCHAR),
        field("fuel_type", Type::VARCHAR),
        field("seating_capacity", Type::INT4),
        field("description", Type::VARCHAR),
        field("image", Type::VARCHAR),
        field("created_at", Type::VARCHAR),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    let mut fields = vehicle_schema();
    fields.push(field("is_available", Type::BOOL));
    fields
}

fn vehicle_availability_schema() -> Vec<FieldInfo> {
    vec![
        field("vehicle_id", Type::VARCHAR),
        field("pickup", Type::VARCHAR),
        field("return", Type::VARCHAR),
        field("is_available", Type::BOOL),
    ]
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("vehicle_id", Type::VARCHAR),
        field("owner_id", Type::VARCHAR),
        field("renter_id", Type::VARCHAR),
        field("pickup", Type::VARCHAR),
        field("return", Type::VARCHAR),
        field("price", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("created_at", Type::VARCHAR),
        // Joined vehicle columns; NULL once the vehicle is removed.
        field("brand", Type::VARCHAR),
        field("model", Type::VARCHAR),
        field("location", Type::VARCHAR),
        field("image", Type::VARCHAR),
    ]
}

fn dashboard_schema() -> Vec<FieldInfo> {
    vec![
        field("total_vehicles", Type::INT8),
        field("total_bookings", Type::INT8),
        field("pending_bookings", Type::INT8),
        field("completed_bookings", Type::INT8),
        field("monthly_revenue", Type::VARCHAR),
        field("recent_bookings", Type::VARCHAR),
    ]
}

fn reset_issued_schema() -> Vec<FieldInfo> {
    vec![field("user_id", Type::VARCHAR), field("expires_at", Type::VARCHAR)]
}

fn reset_redeemed_schema() -> Vec<FieldInfo> {
    vec![field("user_id", Type::VARCHAR)]
}

/// Result columns for a statement, without executing it. Used to answer
/// Describe in the extended protocol, where `$n` placeholders are unbound.
fn statement_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();
    let verb = words.first().copied().unwrap_or("");
    let table = words
        .windows(2)
        .find(|w| matches!(w[0], "from" | "into" | "update"))
        .map(|w| w[1])
        .unwrap_or("");

    match (verb, table) {
        ("select", "vehicles" | "owner_vehicles") | ("insert" | "update", "vehicles") => vehicle_schema(),
        ("select", "availability") if lower.contains("vehicle_id") => vehicle_availability_schema(),
        ("select", "availability") => availability_schema(),
        ("select", "bookings" | "owner_bookings") | ("insert" | "update", "bookings") => booking_schema(),
        ("select", "dashboard") => dashboard_schema(),
        ("insert", "password_resets") => reset_issued_schema(),
        ("delete", "password_resets") => reset_redeemed_schema(),
        _ => vec![],
    }
}

// ── Row encoding ─────────────────────────────────────────────────

fn encode_vehicle(encoder: &mut DataRowEncoder, v: &Vehicle) -> PgWireResult<()> {
    encoder.encode_field(&v.id.to_string())?;
    encoder.encode_field(&v.owner_id.to_string())?;
    encoder.encode_field(&v.location)?;
    encoder.encode_field(&v.price_per_day.to_string())?;
    encoder.encode_field(&v.available)?;
    encoder.encode_field(&v.brand)?;
    encoder.encode_field(&v.model)?;
    encoder.encode_field(&v.year.map(i32::from))?;
    encoder.encode_field(&v.category)?;
    encoder.encode_field(&v.transmission)?;
    encoder.encode_field(&v.fuel_type)?;
    encoder.encode_field(&v.seating_capacity.map(i32::from))?;
    encoder.encode_field(&v.description)?;
    encoder.encode_field(&v.image)?;
    encoder.encode_field(&format_ms(v.created_at))?;
    Ok(())
}

fn vehicle_rows(vehicles: Vec<Vehicle>) -> PgWireResult<Response> {
    let schema = Arc::new(vehicle_schema());
    let rows: Vec<PgWireResult<_>> = vehicles
        .iter()
        .map(|v| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode_vehicle(&mut encoder, v)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn booking_rows(views: Vec<BookingView>) -> PgWireResult<Response> {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<_>> = views
        .iter()
        .map(|view| {
            let b = &view.booking;
            let v = view.vehicle.as_ref();
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.vehicle_id.to_string())?;
            encoder.encode_field(&b.owner_id.to_string())?;
            encoder.encode_field(&b.renter_id.to_string())?;
            encoder.encode_field(&format_ms(b.range.pickup))?;
            encoder.encode_field(&format_ms(b.range.return_at))?;
            encoder.encode_field(&b.price.to_string())?;
            encoder.encode_field(&b.status.as_str().to_string())?;
            encoder.encode_field(&format_ms(b.created_at))?;
            encoder.encode_field(&v.map(|v| v.brand.clone()))?;
            encoder.encode_field(&v.map(|v| v.model.clone()))?;
            encoder.encode_field(&v.map(|v| v.location.clone()))?;
            encoder.encode_field(&v.and_then(|v| v.image.clone()))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

#[async_trait]
impl SimpleQueryHandler for FleetHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let requester = self.resolve_requester(client)?;
        Ok(vec![self.run(requester, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct FleetQueryParser;

#[async_trait]
impl QueryParser for FleetQueryParser {
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
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for FleetHandler {
    type Statement = String;
    type QueryParser = FleetQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let requester = self.resolve_requester(client)?;
        let sql = substitute_params(portal);
        self.run(requester, &sql).await
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
            statement_schema(&target.statement),
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
        Ok(DescribePortalResponse::new(statement_schema(
            &target.statement.statement,
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
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute_text_params(&portal.statement.statement, &params)
}

fn substitute_text_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = sql.to_string();
    // Highest index first so $1 doesn't clobber the prefix of $10.
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(text) => format!("'{}'", text.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct FleetFactory {
    handler: Arc<FleetHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<FleetAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl FleetFactory {
    pub fn new(
        engine: Arc<Engine>,
        identity: Arc<dyn IdentityProvider>,
        password: String,
        request_timeout: Duration,
    ) -> Self {
        let auth_source = FleetAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(FleetHandler::new(engine, identity, request_timeout)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for FleetFactory {
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

/// Serve one client connection until it closes. Identity comes from the
/// login name.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    request_timeout: Duration,
) -> std::io::Result<()> {
    let factory = Arc::new(FleetFactory::new(
        engine,
        Arc::new(LoginNameIdentity),
        password,
        request_timeout,
    ));
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// Retryable failures map to `40001` when resending the same statement is
/// safe, `58030` when storage itself failed.
fn sqlstate(e: &EngineError) -> &'static str {
    let kind = e.kind();
    if kind.is_retryable() {
        return match e {
            EngineError::Timeout => "40001",
            _ => "58030",
        };
    }
    match kind {
        ErrorKind::NotFound => "P0002",
        ErrorKind::Unavailable => "23P01",
        ErrorKind::Forbidden => "42501",
        ErrorKind::InvalidInput => "22023",
        ErrorKind::Transient => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if e.kind().is_retryable() {
        tracing::warn!("retryable failure: {e}");
    }
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn sqlstate_per_kind() {
        let id = Ulid::new();
        assert_eq!(sqlstate(&EngineError::VehicleNotFound(id)), "P0002");
        assert_eq!(
            sqlstate(&EngineError::Conflict {
                vehicle_id: id,
                booking_id: id
            }),
            "23P01"
        );
        assert_eq!(sqlstate(&EngineError::VehicleUnavailable(id)), "23P01");
        assert_eq!(
            sqlstate(&EngineError::Forbidden {
                requester: id,
                owner: id
            }),
            "42501"
        );
        assert_eq!(sqlstate(&EngineError::InvalidRange("x")), "22023");
        assert_eq!(sqlstate(&EngineError::Timeout), "40001");
        assert_eq!(sqlstate(&EngineError::WalError("disk".into())), "58030");
    }

    #[test]
    fn schema_follows_table_and_verb() {
        assert_eq!(statement_schema("SELECT * FROM vehicles").len(), 15);
        assert_eq!(statement_schema("select * from availability where location = $1").len(), 16);
        assert_eq!(
            statement_schema("SELECT * FROM availability WHERE vehicle_id = $1").len(),
            4
        );
        assert_eq!(
            statement_schema("INSERT INTO bookings (id, vehicle_id, pickup, return) VALUES ($1, $2, $3, $4)").len(),
            13
        );
        assert_eq!(statement_schema("UPDATE bookings SET status = $1 WHERE id = $2").len(), 13);
        assert_eq!(statement_schema("SELECT * FROM dashboard").len(), 6);
        assert!(statement_schema("DELETE FROM vehicles WHERE id = $1").is_empty());
    }

    #[test]
    fn params_are_counted_and_quoted() {
        assert_eq!(count_params("SELECT * FROM bookings WHERE id = $12"), 12);
        assert_eq!(count_params("SELECT * FROM vehicles"), 0);
        let sql = substitute_text_params(
            "INSERT INTO vehicles (id, location, price_per_day, brand) VALUES ($1, $2, $3, $4)",
            &[None, Some("O'Hare".into()), Some("50".into()), Some("VW".into())],
        );
        assert_eq!(
            sql,
            "INSERT INTO vehicles (id, location, price_per_day, brand) VALUES (NULL, 'O''Hare', '50', 'VW')"
        );
    }

    #[test]
    fn only_owners_pass_the_role_gate() {
        let owner = Requester {
            user_id: Ulid::new(),
            role: Role::Owner,
        };
        let user = Requester {
            user_id: Ulid::new(),
            role: Role::User,
        };
        assert!(require_owner(&owner).is_ok());
        assert!(require_owner(&user).is_err());
    }
}
