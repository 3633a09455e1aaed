use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// 从 Broker 记录中解出的投递事件
///
/// 记录是创建时的消息快照，这里只信任其中的 `id`，状态以存储中的当前值为准。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub message_id: Uuid,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record has no payload")]
    Empty,
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a JSON object or an array of objects")]
    UnexpectedShape,
    #[error("payload array is empty")]
    EmptyArray,
    #[error("event has no id")]
    MissingId,
    #[error("event id is not a valid UUID: {0}")]
    InvalidId(String),
}

/// 解码一条记录：对象得到一个事件，数组按单条事件列表解码
pub fn decode_events(payload: Option<&[u8]>) -> Result<Vec<DeliveryEvent>, DecodeError> {
    let payload = match payload {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(DecodeError::Empty),
    };

    match serde_json::from_slice::<Value>(payload)? {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(DecodeError::EmptyArray);
            }
            items.iter().map(decode_event).collect()
        }
        value @ Value::Object(_) => Ok(vec![decode_event(&value)?]),
        _ => Err(DecodeError::UnexpectedShape),
    }
}

fn decode_event(value: &Value) -> Result<DeliveryEvent, DecodeError> {
    let object = value.as_object().ok_or(DecodeError::UnexpectedShape)?;
    let raw = match object.get("id") {
        Some(Value::String(raw)) => raw,
        Some(other) => return Err(DecodeError::InvalidId(other.to_string())),
        None => return Err(DecodeError::MissingId),
    };
    let message_id = Uuid::parse_str(raw).map_err(|_| DecodeError::InvalidId(raw.clone()))?;
    Ok(DeliveryEvent { message_id })
}
