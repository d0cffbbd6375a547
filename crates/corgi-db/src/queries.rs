//! Database query functions organized by table.
//!
//! Functions take `&Connection` so they compose inside a caller's
//! `rusqlite::Transaction` (which derefs to `Connection`).

pub mod bank;
pub mod buddies;
pub mod pending_rewards;
pub mod sightings;
pub mod transactions;
pub mod users;
pub mod wishes;

use std::str::FromStr;

use corgi_types::{TokenAmount, ValidationError};
use rusqlite::types::Type;
use rusqlite::Row;

/// Read a TEXT column into a string enum.
pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ValidationError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read an INTEGER base-unit column.
pub(crate) fn amount_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<TokenAmount> {
    let raw: i64 = row.get(idx)?;
    TokenAmount::from_sql(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(|v| v as u64))
}
