use postgres::Client;
use postgres::types::private::BytesMut;
use postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use unidb_core::{
    BufferedCursor, ColumnDesc, DbError, DriverFailure, Params, Result, Statement, Value,
};

/// Positional parameter wrapper bridging [`Value`] to the driver.
///
/// `accepts` admits every type; `to_sql` coerces to the width the server
/// inferred for the placeholder, so an `Int` binds cleanly against `int2`,
/// `int4`, `int8`, floats, and text alike.
pub(crate) struct PgParam<'a>(pub(crate) &'a Value);

impl std::fmt::Debug for PgParam<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PgParam({})", self.0)
    }
}

type ToSqlResult = std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>>;

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => {
                if *ty == Type::INT2 {
                    (*i as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*i as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*i as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    i.to_string().to_sql(ty, out)
                } else {
                    i.to_sql(&Type::INT8, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(&Type::FLOAT8, out)
                }
            }
            Value::Text(s) | Value::Decimal(s) | Value::Json(s) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    json_to_sql(s, ty, out)
                } else {
                    s.to_sql(&Type::TEXT, out)
                }
            }
            Value::Bytes(b) => b.as_slice().to_sql(&Type::BYTEA, out),
            Value::DateTime(dt) => {
                if *ty == Type::TIMESTAMP {
                    dt.naive_utc().to_sql(ty, out)
                } else {
                    dt.to_sql(&Type::TIMESTAMPTZ, out)
                }
            }
            Value::Date(d) => d.to_sql(&Type::DATE, out),
            Value::Time(t) => t.to_sql(&Type::TIME, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn json_to_sql(payload: &str, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
    let parsed: serde_json::Value = serde_json::from_str(payload)?;
    parsed.to_sql(ty, out)
}

pub(crate) fn postgres_value_to_value(row: &postgres::Row, idx: usize) -> Value {
    let col_type = row.columns()[idx].type_();

    match col_type.name() {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),
        "float8" | "numeric" => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Json(v.to_string()))
            .unwrap_or(Value::Null),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::DateTime(v.and_utc()))
            .unwrap_or(Value::Null),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(Value::Time)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

pub(crate) fn describe(columns: &[postgres::Column]) -> Vec<ColumnDesc> {
    columns
        .iter()
        .map(|c| ColumnDesc::new(c.name(), Some(c.type_().name().to_ascii_uppercase())))
        .collect()
}

pub(crate) fn positional(params: &Params) -> Result<&[Value]> {
    match params {
        Params::None => Ok(&[]),
        Params::Positional(values) => Ok(values),
        Params::Named(_) => Err(DbError::bad_argument(
            "the networked engine takes positional parameters only",
        )),
    }
}

/// Run a statement that may or may not produce rows on a client.
pub(crate) fn client_query(client: &mut Client, sql: &str, params: &Params) -> Result<BufferedCursor> {
    let values = positional(params)?;
    let prepared = client
        .prepare(sql)
        .map_err(|e| map_pg_error(e, sql, values))?;

    let description = describe(prepared.columns());
    let wrapped: Vec<PgParam> = values.iter().map(PgParam).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    if description.is_empty() {
        let affected = client
            .execute(&prepared, &refs)
            .map_err(|e| map_pg_error(e, sql, values))?;
        return Ok(BufferedCursor::new(Vec::new(), Vec::new()).with_rowcount(affected));
    }

    let rows = client
        .query(&prepared, &refs)
        .map_err(|e| map_pg_error(e, sql, values))?;

    let converted: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            (0..description.len())
                .map(|i| postgres_value_to_value(row, i))
                .collect()
        })
        .collect();

    Ok(BufferedCursor::new(description, converted))
}

pub(crate) fn client_execute(client: &mut Client, sql: &str, params: &Params) -> Result<u64> {
    let values = positional(params)?;
    let wrapped: Vec<PgParam> = values.iter().map(PgParam).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    client
        .execute(sql, &refs)
        .map_err(|e| map_pg_error(e, sql, values))
}

pub(crate) fn client_insert(client: &mut Client, stmt: &Statement) -> Result<Option<Value>> {
    let wrapped: Vec<PgParam> = stmt.params.iter().map(PgParam).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    if stmt.returning {
        let rows = client
            .query(stmt.sql.as_str(), &refs)
            .map_err(|e| map_pg_error(e, &stmt.sql, &stmt.params))?;
        Ok(rows.first().map(|row| postgres_value_to_value(row, 0)))
    } else {
        client
            .execute(stmt.sql.as_str(), &refs)
            .map_err(|e| map_pg_error(e, &stmt.sql, &stmt.params))?;
        Ok(None)
    }
}

pub(crate) fn map_pg_error(e: postgres::Error, sql: &str, params: &[Value]) -> DbError {
    let (message, code, integrity) = match e.as_db_error() {
        Some(db_error) => {
            let code = db_error.code().code().to_string();
            // SQLSTATE class 23 covers every integrity constraint violation.
            let integrity = code.starts_with("23");
            (db_error.message().to_string(), Some(code), integrity)
        }
        None => (e.to_string(), None, false),
    };

    let mut failure = DriverFailure::new(message).with_statement(sql, params);
    if let Some(code) = code {
        failure = failure.with_code(code);
    }
    log::error!("postgres statement failed: {failure}");

    if integrity {
        DbError::Integrity(failure)
    } else {
        DbError::Driver(failure)
    }
}

/// Inline parameters as literals, for statements the extended protocol
/// cannot bind (server-side cursor declarations). Placeholders are replaced
/// highest-first so `$1` never clips `$12`.
pub(crate) fn inline_params(
    dialect: &dyn unidb_core::Dialect,
    sql: &str,
    params: &[Value],
) -> String {
    let mut inlined = sql.to_string();
    for (i, value) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        inlined = inlined.replace(&placeholder, &dialect.value_literal(value));
    }
    inlined
}
