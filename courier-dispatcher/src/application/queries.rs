//! 查询定义

use serde::Deserialize;

/// 分页列表查询参数（未校验）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// 按 ID 查询单条消息
#[derive(Debug, Clone, Deserialize)]
pub struct GetMessageQuery {
    pub id: String,
}
