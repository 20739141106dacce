use sqlx::Sqlite;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::sqlite::SqliteArguments;

/// Collects dynamic WHERE conditions and their positional bindings
#[derive(Debug, Default)]
pub struct QueryBuilder {
    conditions: Vec<String>,
    bindings: Vec<QueryValue>,
}

#[derive(Debug, Clone)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field = ?` when `value` is present and not blank
    pub fn eq_text(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.conditions.push(format!("{field} = ?"));
            self.bindings.push(QueryValue::Text(v.to_string()));
        }
        self
    }

    /// `field >= ?`
    pub fn min_i64(&mut self, field: &str, value: Option<i64>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{field} >= ?"));
            self.bindings.push(QueryValue::Integer(v));
        }
        self
    }

    /// `field < ?`
    pub fn before_i64(&mut self, field: &str, value: Option<i64>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(format!("{field} < ?"));
            self.bindings.push(QueryValue::Integer(v));
        }
        self
    }

    /// Build WHERE clause (empty if no conditions)
    pub fn build_where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Apply bindings to a `query_as`
    pub fn apply_bindings<'q, O>(
        &'q self,
        mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        for binding in &self.bindings {
            query = match binding {
                QueryValue::Text(s) => query.bind(s.as_str()),
                QueryValue::Integer(i) => query.bind(*i),
            };
        }
        query
    }

    /// Apply bindings to a `query_scalar`
    pub fn apply_bindings_scalar<'q, O>(
        &'q self,
        mut query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        for binding in &self.bindings {
            query = match binding {
                QueryValue::Text(s) => query.bind(s.as_str()),
                QueryValue::Integer(i) => query.bind(*i),
            };
        }
        query
    }
}
