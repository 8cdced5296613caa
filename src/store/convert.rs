//! Field conversions at the store boundary

use super::SqlValue;
use crate::error::{Error, Result};
use crate::models::DocumentMetadata;
use url::Url;

/// Metadata as a JSONB parameter
pub fn metadata_to_value(metadata: &DocumentMetadata) -> Result<SqlValue> {
    Ok(SqlValue::Json(serde_json::to_value(metadata)?))
}

/// Metadata from a JSON/JSONB or text column.
///
/// A missing column, NULL, JSON null, or blank text decodes to the empty
/// metadata value.
pub fn metadata_from_value(value: Option<&SqlValue>) -> Result<DocumentMetadata> {
    match value {
        None | Some(SqlValue::Null) => Ok(DocumentMetadata::default()),
        Some(SqlValue::Json(serde_json::Value::Null)) => Ok(DocumentMetadata::default()),
        Some(SqlValue::Json(json)) => Ok(serde_json::from_value(json.clone())?),
        Some(SqlValue::Text(text)) if text.trim().is_empty() => Ok(DocumentMetadata::default()),
        Some(SqlValue::Text(text)) => Ok(serde_json::from_str(text)?),
        Some(other) => Err(Error::Database(sqlx::Error::Decode(
            format!("metadata: unexpected value {:?}", other).into(),
        ))),
    }
}

/// Optional URI as a text parameter
pub fn uri_to_value(uri: Option<&Url>) -> SqlValue {
    uri.map(|u| SqlValue::Text(u.to_string()))
        .unwrap_or(SqlValue::Null)
}

/// Optional URI from a text column; blank text is treated as absent
pub fn uri_from_value(value: Option<&SqlValue>) -> Result<Option<Url>> {
    match value {
        None | Some(SqlValue::Null) => Ok(None),
        Some(SqlValue::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(SqlValue::Text(text)) => Ok(Some(Url::parse(text.trim())?)),
        Some(other) => Err(Error::Database(sqlx::Error::Decode(
            format!("uri: unexpected value {:?}", other).into(),
        ))),
    }
}
