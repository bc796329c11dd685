use crate::errors::MonitorError;
use crate::runtime::SessionApi;
use crate::types::Credentials;
use serde_json::Value;

pub fn login(api: &dyn SessionApi, credentials: &Credentials) -> Result<(), MonitorError> {
    let reply = api.login(credentials)?;
    if !reply.is_success() {
        return Err(MonitorError::LoginFailed {
            status: reply.status,
        });
    }
    Ok(())
}

pub fn has_active_session(api: &dyn SessionApi) -> Result<bool, MonitorError> {
    let reply = api.running_sessions()?;
    if !reply.is_success() {
        return Err(MonitorError::Http(format!(
            "running simulations query returned status {}",
            reply.status
        )));
    }
    let value: Value =
        serde_json::from_str(&reply.body).map_err(|e| MonitorError::Decode(e.to_string()))?;
    Ok(is_truthy(&value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
