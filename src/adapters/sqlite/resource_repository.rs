//! SQLite implementation of the generic ResourceRepository.
//!
//! Rows keep the serialized resource in `spec`; filters on fields other than
//! the common columns go through `json_extract`.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::adapters::sqlite::format_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Resource;
use crate::domain::ports::{ResourceFilter, ResourceRepository};

const COLUMNS: [&str; 4] = ["id", "name", "status", "project_id"];

pub struct SqliteResourceRepository<T> {
    pool: SqlitePool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteResourceRepository<T> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for SqliteResourceRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Text(String),
    Int(i64),
    Real(f64),
}

fn field_expr(field: &str) -> DomainResult<String> {
    if field.is_empty()
        || !field
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(DomainError::Validation(format!("invalid filter field {field:?}")));
    }
    if COLUMNS.contains(&field) {
        Ok(field.to_string())
    } else {
        Ok(format!("json_extract(spec, '$.{field}')"))
    }
}

fn value_binding(value: &Value) -> Option<Binding> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(Binding::Int(i64::from(*b))),
        Value::Number(n) => Some(
            n.as_i64()
                .map_or_else(|| Binding::Real(n.as_f64().unwrap_or_default()), Binding::Int),
        ),
        Value::String(s) => Some(Binding::Text(s.clone())),
        other => Some(Binding::Text(other.to_string())),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Build the WHERE clause (with leading ` WHERE` when non-empty) and its bindings.
fn build_where(filter: &ResourceFilter) -> DomainResult<(String, Vec<Binding>)> {
    let mut clauses = Vec::new();
    let mut bindings = Vec::new();

    for (field, value) in &filter.equals {
        let expr = field_expr(field)?;
        match value_binding(value) {
            Some(binding) => {
                clauses.push(format!("{expr} = ?"));
                bindings.push(binding);
            }
            None => clauses.push(format!("{expr} IS NULL")),
        }
    }

    for (field, values) in &filter.in_values {
        let expr = field_expr(field)?;
        if values.is_empty() {
            clauses.push("0".to_string());
            continue;
        }
        clauses.push(format!("{expr} IN ({})", placeholders(values.len())));
        bindings.extend(values.iter().cloned().map(Binding::Text));
    }

    if !filter.statuses.is_empty() {
        clauses.push(format!("status IN ({})", placeholders(filter.statuses.len())));
        bindings.extend(filter.statuses.iter().cloned().map(Binding::Text));
    }

    if let Some(name) = &filter.name {
        clauses.push("name = ?".to_string());
        bindings.push(Binding::Text(name.clone()));
    }

    if let Some(part) = &filter.name_contains {
        clauses.push("name LIKE ?".to_string());
        bindings.push(Binding::Text(format!("%{part}%")));
    }

    if clauses.is_empty() {
        Ok((String::new(), bindings))
    } else {
        Ok((format!(" WHERE {}", clauses.join(" AND ")), bindings))
    }
}

macro_rules! bind_all {
    ($query:expr, $bindings:expr) => {{
        let mut query = $query;
        for binding in $bindings {
            query = match binding {
                Binding::Text(s) => query.bind(s),
                Binding::Int(i) => query.bind(i),
                Binding::Real(f) => query.bind(f),
            };
        }
        query
    }};
}

#[async_trait]
impl<T: Resource> ResourceRepository<T> for SqliteResourceRepository<T> {
    async fn insert(&self, item: &T) -> DomainResult<()> {
        let spec = serde_json::to_string(item)?;
        let base = item.base();
        let sql = format!(
            "INSERT INTO {} (id, name, status, project_id, spec, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            T::TABLE
        );
        sqlx::query(&sql)
            .bind(&base.id)
            .bind(&base.name)
            .bind(&base.status)
            .bind(&base.project_id)
            .bind(&spec)
            .bind(format_datetime(&base.created_at))
            .bind(format_datetime(&base.updated_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<T>> {
        let sql = format!("SELECT spec FROM {} WHERE id = ?", T::TABLE);
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(spec,)| serde_json::from_str(&spec).map_err(DomainError::from))
            .transpose()
    }

    async fn update(&self, item: &T) -> DomainResult<()> {
        let spec = serde_json::to_string(item)?;
        let base = item.base();
        let sql = format!(
            "UPDATE {} SET name = ?, status = ?, project_id = ?, spec = ?, updated_at = ? WHERE id = ?",
            T::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(&base.name)
            .bind(&base.status)
            .bind(&base.project_id)
            .bind(&spec)
            .bind(format_datetime(&base.updated_at))
            .bind(&base.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(T::KEYWORD, &base.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", T::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(T::KEYWORD, id));
        }
        Ok(())
    }

    async fn list(&self, filter: &ResourceFilter) -> DomainResult<Vec<T>> {
        let (where_clause, bindings) = build_where(filter)?;
        let order = if filter.order_desc_created { "DESC" } else { "ASC" };
        let mut sql = format!(
            "SELECT spec FROM {}{where_clause} ORDER BY created_at {order}, rowid {order}",
            T::TABLE
        );
        match (filter.limit, filter.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        let query = bind_all!(sqlx::query_as::<_, (String,)>(&sql), bindings);
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(spec,)| serde_json::from_str(&spec).map_err(DomainError::from))
            .collect()
    }

    async fn count(&self, filter: &ResourceFilter) -> DomainResult<i64> {
        let (where_clause, bindings) = build_where(filter)?;
        let sql = format!("SELECT COUNT(*) FROM {}{where_clause}", T::TABLE);
        let query = bind_all!(sqlx::query_as::<_, (i64,)>(&sql), bindings);
        let (count,) = query.fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{InstantModel, LlmContainerType, LlmImage, ResourceBase};

    async fn setup() -> SqliteResourceRepository<LlmImage> {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteResourceRepository::new(pool)
    }

    fn image(name: &str) -> LlmImage {
        LlmImage {
            base: ResourceBase::new(name, "ready"),
            image_name: format!("registry.local/{name}"),
            image_label: "latest".into(),
            credential_id: String::new(),
            llm_type: LlmContainerType::Ollama,
        }
    }

    #[tokio::test]
    async fn test_insert_get_update_delete() {
        let repo = setup().await;
        let mut img = image("ollama");
        repo.insert(&img).await.unwrap();

        let fetched = repo.get(&img.base.id).await.unwrap().unwrap();
        assert_eq!(fetched, img);

        img.image_label = "0.5.7".into();
        img.set_status("disabled");
        repo.update(&img).await.unwrap();
        let fetched = repo.fetch(&img.base.id).await.unwrap();
        assert_eq!(fetched.image_label, "0.5.7");
        assert_eq!(fetched.base.status, "disabled");

        repo.delete(&img.base.id).await.unwrap();
        assert!(repo.get(&img.base.id).await.unwrap().is_none());
        assert!(repo.delete(&img.base.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = setup().await;
        let err = repo.update(&image("ghost")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_by_id_or_name() {
        let repo = setup().await;
        let img = image("ollama");
        repo.insert(&img).await.unwrap();

        assert_eq!(repo.fetch_by_id_or_name(&img.base.id).await.unwrap().base.id, img.base.id);
        assert_eq!(repo.fetch_by_id_or_name("ollama").await.unwrap().base.id, img.base.id);
        assert!(repo.fetch_by_id_or_name("missing").await.unwrap_err().is_not_found());

        repo.insert(&image("ollama")).await.unwrap();
        let err = repo.fetch_by_id_or_name("ollama").await.unwrap_err();
        assert_eq!(err.http_status(), 409);
    }

    #[tokio::test]
    async fn test_list_filters_and_paging() {
        let repo = setup().await;
        for name in ["a", "b", "c"] {
            repo.insert(&image(name)).await.unwrap();
        }
        let mut dify = image("d");
        dify.llm_type = LlmContainerType::Dify;
        dify.base.status = "disabled".into();
        repo.insert(&dify).await.unwrap();

        let ollama = repo
            .list(&ResourceFilter::new().eq("llm_type", "ollama"))
            .await
            .unwrap();
        assert_eq!(ollama.len(), 3);

        let disabled = repo.list(&ResourceFilter::new().status("disabled")).await.unwrap();
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].base.name, "d");

        let some = repo
            .list(&ResourceFilter::new().in_values("name", vec!["a".into(), "c".into()]))
            .await
            .unwrap();
        assert_eq!(some.len(), 2);

        let none = repo
            .list(&ResourceFilter::new().in_values("name", vec![]))
            .await
            .unwrap();
        assert!(none.is_empty());

        let page = repo
            .list(&ResourceFilter::new().newest_first().page(Some(2), Some(1)))
            .await
            .unwrap();
        assert_eq!(page.iter().map(|i| i.base.name.as_str()).collect::<Vec<_>>(), vec!["c", "b"]);

        assert_eq!(repo.count(&ResourceFilter::new().page(Some(1), None)).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_bool_filter() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo: SqliteResourceRepository<InstantModel> = SqliteResourceRepository::new(pool);
        let mut model = InstantModel {
            base: ResourceBase::new("qwen2", "active"),
            llm_type: LlmContainerType::Ollama,
            model_id: "m1".into(),
            model_name: "qwen2".into(),
            model_tag: "7b".into(),
            image_id: "img".into(),
            mounts: vec![],
            size: 0,
            actual_size_mb: 0,
            enabled: true,
            auto_cache: false,
        };
        repo.insert(&model).await.unwrap();
        model.base = ResourceBase::new("qwen2-old", "active");
        model.enabled = false;
        repo.insert(&model).await.unwrap();

        let enabled = repo.list(&ResourceFilter::new().eq("enabled", true)).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].base.name, "qwen2");
    }

    #[test]
    fn test_rejects_bad_field_names() {
        let filter = ResourceFilter::new().eq("name'; DROP TABLE x; --", "x");
        assert!(build_where(&filter).is_err());
    }
}
