use std::str::FromStr;

use courier_core::error::{CourierError, Result};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// 允许排序的字段（白名单）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Status,
    Sender,
    Receiver,
}

impl SortField {
    /// 对应的数据库列名
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Status => "status",
            SortField::Sender => "sender",
            SortField::Receiver => "receiver",
        }
    }
}

impl FromStr for SortField {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createdAt" => Ok(SortField::CreatedAt),
            "updatedAt" => Ok(SortField::UpdatedAt),
            "status" => Ok(SortField::Status),
            "sender" => Ok(SortField::Sender),
            "receiver" => Ok(SortField::Receiver),
            other => Err(CourierError::validation(format!(
                "unsupported sortBy field: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Err(CourierError::validation(format!(
                "unsupported sortOrder: {s}"
            )))
        }
    }
}

/// 分页列表查询（已校验）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageListQuery {
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: u32,
    pub offset: u64,
}

impl Default for MessageListQuery {
    fn default() -> Self {
        Self {
            sort_by: SortField::CreatedAt,
            sort_order: SortOrder::Desc,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl MessageListQuery {
    /// 由原始分页参数构建：页码从 1 开始，limit 限制在 1..=100
    pub fn from_params(
        page: Option<u32>,
        limit: Option<u32>,
        sort_by: Option<&str>,
        sort_order: Option<&str>,
    ) -> Result<Self> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let sort_by = match sort_by {
            Some(field) => field.parse()?,
            None => SortField::CreatedAt,
        };
        let sort_order = match sort_order {
            Some(order) => order.parse()?,
            None => SortOrder::Desc,
        };

        Ok(Self {
            sort_by,
            sort_order,
            limit,
            offset: u64::from(page - 1) * u64::from(limit),
        })
    }
}
