use sqlx::sqlite::SqliteRow;

use notifhub::prelude::*;

pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

/// Map a fetched row through a converter, normalizing sqlx errors into the
/// taxonomy.
pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> NhResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::Internal("database error".into())),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::Internal("database error".into()))
		}
	}
}

/// Map an execute error, surfacing unique-constraint violations as
/// conflicts.
pub(crate) fn map_exec_err(err: sqlx::Error) -> Error {
	if let sqlx::Error::Database(db_err) = &err {
		if db_err.is_unique_violation() {
			return Error::Conflict("unique constraint violated".into());
		}
	}
	inspect(&err);
	Error::Internal("database error".into())
}

pub(crate) fn collect_rows<T, F>(rows: Vec<SqliteRow>, f: F) -> NhResult<Vec<T>>
where
	F: Fn(SqliteRow) -> Result<T, sqlx::Error>,
{
	let mut items = Vec::with_capacity(rows.len());
	for row in rows {
		items.push(f(row).inspect_err(inspect).map_err(|_| Error::Internal("database error".into()))?);
	}
	Ok(items)
}

/// Topics are stored as a comma-separated list.
pub(crate) fn parse_str_list(s: &str) -> Box<[Box<str>]> {
	s.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(|s| s.to_owned().into_boxed_str())
		.collect::<Vec<_>>()
		.into_boxed_slice()
}

pub(crate) fn join_str_list(items: &[Box<str>]) -> String {
	items.join(",")
}

// vim: ts=4
