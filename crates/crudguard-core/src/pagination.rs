//! Page arithmetic with server defaults and clamps

use serde_json::Value;

use crate::errors::{CrudError, Result};
use crate::joins::AllowedJoinSet;
use crate::query::OrderBy;

pub const DEFAULT_PAGE_SIZE: u64 = 25;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Validated per-entity pagination settings
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationConfig {
    default_page_size: u64,
    max_page_size: u64,
    default_order_by: OrderBy,
}

impl PaginationConfig {
    /// # Errors
    ///
    /// `InvalidPaginationConfig` when either size is zero or the default
    /// exceeds the maximum.
    pub fn new(default_page_size: u64, max_page_size: u64, default_order_by: OrderBy) -> Result<Self> {
        if default_page_size == 0 || max_page_size == 0 {
            return Err(CrudError::InvalidPaginationConfig {
                reason: "page sizes must be at least 1".to_string(),
            }
            .into());
        }
        if default_page_size > max_page_size {
            return Err(CrudError::InvalidPaginationConfig {
                reason: format!(
                    "defaultPageSize {} exceeds maxPageSize {}",
                    default_page_size, max_page_size
                ),
            }
            .into());
        }
        Ok(Self {
            default_page_size,
            max_page_size,
            default_order_by,
        })
    }

    /// 25 per page, at most 100, ascending by `id_field`
    pub fn with_defaults(id_field: &str) -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            default_order_by: OrderBy::ascending(id_field),
        }
    }

    pub fn default_page_size(&self) -> u64 {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> u64 {
        self.max_page_size
    }

    pub fn default_order_by(&self) -> &OrderBy {
        &self.default_order_by
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub skip: u64,
    pub take: u64,
    pub page: u64,
    pub page_size: u64,
    pub order_by: OrderBy,
}

/// Read a client-supplied page number or size
///
/// Positive integers, whole positive floats and numeric strings count;
/// anything else is treated as "not supplied".
pub fn positive_integer(value: Option<&Value>) -> Option<u64> {
    let parsed = match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= 1.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.filter(|n| *n > 0)
}

/// Derive skip/take/page/pageSize/orderBy for a request
///
/// `page` falls back to 1, `pageSize` to the configured default and is then
/// clamped to the configured maximum. A sort that is not a list falls back
/// to the configured default; a list is validated against the allowlist.
///
/// # Errors
///
/// Sort validation failures (`MalformedOrderBy`, `InvalidSortDirection`,
/// `RelationNotAllowed`).
pub fn compute(
    page: Option<&Value>,
    page_size: Option<&Value>,
    order_by: Option<&Value>,
    config: &PaginationConfig,
    allowed: &AllowedJoinSet,
) -> Result<Pagination> {
    let page = positive_integer(page).unwrap_or(1);
    let page_size = positive_integer(page_size)
        .unwrap_or(config.default_page_size)
        .min(config.max_page_size);

    let order_by = match order_by {
        Some(value @ Value::Array(_)) => OrderBy::parse_validated(value, allowed)?,
        _ => config.default_order_by.clone(),
    };

    Ok(Pagination {
        skip: (page - 1).saturating_mul(page_size),
        take: page_size,
        page,
        page_size,
        order_by,
    })
}

/// `ceil(total / page_size)`, and 0 when there is nothing to page
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if total == 0 || page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}
