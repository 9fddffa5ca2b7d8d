//! PostgreSQL-backed `StyleCatalog` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{StyleCatalog, StyleCatalogError};
use crate::domain::{Style, StyleId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::StyleRow;
use super::pool::DbPool;
use super::schema::styles;

/// Diesel-backed implementation of the `StyleCatalog` port.
#[derive(Clone)]
pub struct DieselStyleCatalog {
    pool: DbPool,
}

impl DieselStyleCatalog {
    /// Create a new catalogue with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StyleCatalog for DieselStyleCatalog {
    async fn find_style(&self, style_id: StyleId) -> Result<Option<Style>, StyleCatalogError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|error| map_basic_pool_error(error, StyleCatalogError::connection))?;
        let row: Option<StyleRow> = styles::table
            .find(style_id.as_i64())
            .select(StyleRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|error| {
                map_basic_diesel_error(error, StyleCatalogError::query, StyleCatalogError::connection)
            })?;
        Ok(row.map(Style::from))
    }
}
