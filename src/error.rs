//! Courier Core 错误模块
//!
//! - 统一的错误分类 `ErrorCode`（校验 / 存储冲突 / Broker / 未找到 / 内部）
//! - `CourierError` + `ErrorBuilder`，供领域层返回已分类的错误
//! - 基础设施错误（sqlx、rdkafka、serde_json）到业务错误的转换工具

use std::fmt;

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// 统一结果类型
pub type Result<T, E = CourierError> = std::result::Result<T, E>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 输入不合法，不会进入分发协调器
    Validation,
    /// 存储引擎拒绝写入或存储访问失败
    ConflictOrStorage,
    /// 发布 / 提交 / 中止失败，包括超出重试预算与事务超时
    Broker,
    /// 查询未命中
    NotFound,
    /// 未分类错误
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION_FAILURE",
            ErrorCode::ConflictOrStorage => "CONFLICT_OR_STORAGE_FAILURE",
            ErrorCode::Broker => "BROKER_FAILURE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Internal => "INTERNAL_FAILURE",
        }
    }

    /// HTTP 边界上的固定状态码
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Validation => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::ConflictOrStorage => 409,
            ErrorCode::Internal => 500,
            ErrorCode::Broker => 503,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已分类的业务错误
#[derive(Debug, Error)]
#[error("[{code}] {reason}")]
pub struct CourierError {
    code: ErrorCode,
    reason: String,
    details: Option<String>,
    #[source]
    source: Option<BoxedSource>,
}

impl CourierError {
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// 对外可见的消息，内部错误不泄露细节
    pub fn public_message(&self) -> &str {
        match self.code {
            ErrorCode::Internal => "Internal Server Error",
            _ => &self.reason,
        }
    }

    /// 保留错误码，替换描述并把原描述并入 details
    pub fn with_context(self, reason: impl Into<String>) -> Self {
        let details = match self.details {
            Some(details) => format!("{}: {}", self.reason, details),
            None => self.reason,
        };
        Self {
            code: self.code,
            reason: reason.into(),
            details: Some(details),
            source: self.source,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        ErrorBuilder::new(ErrorCode::Validation, reason).build_error()
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        ErrorBuilder::new(ErrorCode::NotFound, reason).build_error()
    }

    pub fn broker(reason: impl Into<String>) -> Self {
        ErrorBuilder::new(ErrorCode::Broker, reason).build_error()
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        ErrorBuilder::new(ErrorCode::ConflictOrStorage, reason).build_error()
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        ErrorBuilder::new(ErrorCode::Internal, reason).build_error()
    }
}

/// 错误构建器
pub struct ErrorBuilder {
    code: ErrorCode,
    reason: String,
    details: Option<String>,
    source: Option<BoxedSource>,
}

impl ErrorBuilder {
    pub fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            details: None,
            source: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn build_error(self) -> CourierError {
        CourierError {
            code: self.code,
            reason: self.reason,
            details: self.details,
            source: self.source,
        }
    }
}

/// 将 sqlx 错误归类
///
/// 未命中行归为 NotFound，其余（约束冲突、连接、超时等）均归为存储失败
pub fn map_sqlx_error(err: sqlx::Error, reason: &str) -> CourierError {
    let code = match &err {
        sqlx::Error::RowNotFound => ErrorCode::NotFound,
        _ => ErrorCode::ConflictOrStorage,
    };
    let details = match &err {
        sqlx::Error::Database(db) => match db.code() {
            Some(sql_state) => format!("{} (sqlstate {})", db.message(), sql_state),
            None => db.message().to_string(),
        },
        other => other.to_string(),
    };
    ErrorBuilder::new(code, reason)
        .details(details)
        .source(err)
        .build_error()
}

/// 将 rdkafka 错误归类为 Broker 错误
pub fn map_kafka_error(err: KafkaError, reason: &str) -> CourierError {
    let details = match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) => {
            format!("{err} (delivery retry budget exhausted)")
        }
        _ => err.to_string(),
    };
    ErrorBuilder::new(ErrorCode::Broker, reason)
        .details(details)
        .source(err)
        .build_error()
}

/// 基础设施结果转换扩展
pub trait InfraResultExt<T> {
    /// 转换为指定错误码的业务错误
    fn into_courier(self, code: ErrorCode, reason: &str) -> Result<T>;
}

impl<T, E> InfraResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_courier(self, code: ErrorCode, reason: &str) -> Result<T> {
        self.map_err(|err| {
            ErrorBuilder::new(code, reason)
                .details(err.to_string())
                .source(err)
                .build_error()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::Validation.http_status(), 400);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::ConflictOrStorage.http_status(), 409);
        assert_eq!(ErrorCode::Broker.http_status(), 503);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let err = ErrorBuilder::new(ErrorCode::Internal, "pool exhausted at 10.0.0.3")
            .details("connection refused")
            .build_error();
        assert_eq!(err.public_message(), "Internal Server Error");

        let err = CourierError::validation("content is required");
        assert_eq!(err.public_message(), "content is required");
    }

    #[test]
    fn test_with_context_keeps_code_and_original_reason() {
        let err = CourierError::broker("send failed")
            .with_context("dispatch failed");
        assert_eq!(err.code(), ErrorCode::Broker);
        assert_eq!(err.reason(), "dispatch failed");
        assert_eq!(err.details(), Some("send failed"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound, "lookup failed");
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = map_sqlx_error(sqlx::Error::PoolTimedOut, "insert failed");
        assert_eq!(err.code(), ErrorCode::ConflictOrStorage);
    }

    #[test]
    fn test_kafka_errors_map_to_broker() {
        let err = map_kafka_error(
            KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut),
            "publish failed",
        );
        assert_eq!(err.code(), ErrorCode::Broker);
        assert!(err.details().unwrap().contains("retry budget"));
    }

    #[test]
    fn test_into_courier_wraps_source() {
        let parsed: std::result::Result<u32, _> = "x".parse::<u32>();
        let err = parsed
            .into_courier(ErrorCode::Validation, "bad number")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(std::error::Error::source(&err).is_some());
    }
}
