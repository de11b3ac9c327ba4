use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// 引擎使用的帶型別變數：`{"value": ..., "type": "String", "valueInfo": {}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedValue {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_info: Option<serde_json::Map<String, serde_json::Value>>,
}

impl TypedValue {
    /// Infers the engine type name from a plain JSON value.
    pub fn from_json(value: serde_json::Value) -> Self {
        let value_type = match &value {
            serde_json::Value::Null => "Null",
            serde_json::Value::Bool(_) => "Boolean",
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => {
                let fits_integer = n
                    .as_i64()
                    .map(|v| v >= i32::MIN as i64 && v <= i32::MAX as i64)
                    .unwrap_or(false);
                if fits_integer {
                    "Integer"
                } else {
                    "Long"
                }
            }
            serde_json::Value::Number(_) => "Double",
            serde_json::Value::String(_) => "String",
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => "Json",
        };

        // Json 型別在引擎端以字串保存
        let value = match (value_type, value) {
            ("Json", v) => serde_json::Value::String(v.to_string()),
            (_, v) => v,
        };

        Self {
            value,
            value_type: Some(value_type.to_string()),
            value_info: None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }
}

pub type VariableMap = HashMap<String, TypedValue>;

/// Converts plain JSON values into typed engine variables.
pub fn variables_from_json<I, K>(entries: I) -> VariableMap
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), TypedValue::from_json(v)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LockedExternalTask {
    pub id: String,
    pub topic_name: String,
    pub worker_id: Option<String>,
    pub lock_expiration_time: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub priority: i64,
    pub retries: Option<i32>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub business_key: Option<String>,
    pub process_instance_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub process_definition_key: Option<String>,
    pub process_definition_version_tag: Option<String>,
    pub activity_id: Option<String>,
    pub activity_instance_id: Option<String>,
    pub execution_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub variables: VariableMap,
    #[serde(deserialize_with = "null_as_default")]
    pub extension_properties: HashMap<String, String>,
}

/// 引擎可能回傳 `null` 而非省略欄位
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LockedExternalTask {
    pub fn variable(&self, name: &str) -> Option<&TypedValue> {
        self.variables.get(name)
    }

    /// 解析引擎回傳的鎖定到期時間，格式不符時回傳 None
    pub fn lock_expires_at(&self, date_format: &str) -> Option<DateTime<Utc>> {
        let raw = self.lock_expiration_time.as_deref()?;
        parse_engine_date(raw, date_format)
    }
}

pub fn parse_engine_date(raw: &str, date_format: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_str(raw, date_format) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // 沒有時區資訊時視為 UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FetchTopic {
    pub topic_name: String,
    pub lock_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_variables: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_definition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_definition_id_in: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_definition_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_definition_key_in: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_definition_version_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub without_tenant_id: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id_in: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_extension_properties: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAndLockRequest {
    pub worker_id: String,
    pub max_tasks: u32,
    pub use_priority: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_response_timeout: Option<u64>,
    pub topics: Vec<FetchTopic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub worker_id: String,
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub variables: VariableMap,
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub local_variables: VariableMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRequest {
    pub worker_id: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    pub retries: i32,
    pub retry_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmnErrorRequest {
    pub worker_id: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub variables: VariableMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLockRequest {
    pub worker_id: String,
    pub new_duration: u64,
}

/// 引擎錯誤回應本文
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineErrorBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locked_task_deserializes_engine_payload() {
        let payload = json!({
            "activityId": "anActivityId",
            "activityInstanceId": "anActivityInstanceId",
            "errorMessage": null,
            "executionId": "anExecutionId",
            "id": "anExternalTaskId",
            "lockExpirationTime": "2015-10-06T16:34:42.000+0200",
            "processDefinitionId": "aProcessDefinitionId",
            "processDefinitionKey": "aProcessDefinitionKey",
            "processInstanceId": "aProcessInstanceId",
            "retries": 3,
            "topicName": "createOrder",
            "workerId": "aWorkerId",
            "priority": 4,
            "businessKey": "order-42",
            "variables": {
                "orderId": {"type": "String", "value": "1234", "valueInfo": {}}
            }
        });

        let task: LockedExternalTask = serde_json::from_value(payload).unwrap();
        assert_eq!(task.id, "anExternalTaskId");
        assert_eq!(task.priority, 4);
        assert_eq!(task.retries, Some(3));
        assert_eq!(task.variable("orderId").and_then(|v| v.as_str()), Some("1234"));
        assert!(task.extension_properties.is_empty());

        let expires = task.lock_expires_at("%Y-%m-%dT%H:%M:%S%.3f%z").unwrap();
        assert_eq!(expires.to_rfc3339(), "2015-10-06T14:34:42+00:00");
    }

    #[test]
    fn test_null_collections_do_not_break_the_batch() {
        let payload = json!([
            {"id": "ok", "topicName": "invoice", "priority": 3, "variables": {}},
            {
                "id": "sparse",
                "topicName": "invoice",
                "priority": null,
                "variables": null,
                "extensionProperties": null
            }
        ]);

        let tasks: Vec<LockedExternalTask> = serde_json::from_value(payload).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].priority, 3);
        assert_eq!(tasks[1].id, "sparse");
        assert_eq!(tasks[1].priority, 0);
        assert!(tasks[1].variables.is_empty());
        assert!(tasks[1].extension_properties.is_empty());
    }

    #[test]
    fn test_typed_value_inference() {
        assert_eq!(
            TypedValue::from_json(json!("x")).value_type.as_deref(),
            Some("String")
        );
        assert_eq!(
            TypedValue::from_json(json!(42)).value_type.as_deref(),
            Some("Integer")
        );
        assert_eq!(
            TypedValue::from_json(json!(9_000_000_000i64)).value_type.as_deref(),
            Some("Long")
        );
        assert_eq!(
            TypedValue::from_json(json!(1.5)).value_type.as_deref(),
            Some("Double")
        );

        let object = TypedValue::from_json(json!({"a": 1}));
        assert_eq!(object.value_type.as_deref(), Some("Json"));
        assert_eq!(object.value, json!("{\"a\":1}"));
    }

    #[test]
    fn test_fetch_request_omits_unset_filters() {
        let request = FetchAndLockRequest {
            worker_id: "w".to_string(),
            max_tasks: 5,
            use_priority: false,
            async_response_timeout: None,
            topics: vec![FetchTopic {
                topic_name: "t".to_string(),
                lock_duration: 1000,
                ..Default::default()
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "workerId": "w",
                "maxTasks": 5,
                "usePriority": false,
                "topics": [{"topicName": "t", "lockDuration": 1000}]
            })
        );
    }
}
