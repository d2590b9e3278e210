//! Store operations exposed by the gateway.
//!
//! Every operation renders one command, runs it on its own connection and
//! maps the decoded reply onto a domain value. Nothing is shared between
//! calls except the immutable transport settings.

use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::resp::{self, Reply};
use crate::transport::Transport;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Direction of a counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    Incr,
    Decr,
}

impl CounterAction {
    fn command(self) -> &'static str {
        match self {
            CounterAction::Incr => "INCR",
            CounterAction::Decr => "DECR",
        }
    }
}

impl FromStr for CounterAction {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incr" => Ok(CounterAction::Incr),
            "decr" => Ok(CounterAction::Decr),
            _ => Err(GatewayError::BadRequest(
                "Invalid action for counter.".to_string(),
            )),
        }
    }
}

/// A decoded reply together with the raw text it came from.
struct Response {
    reply: Reply,
    raw: String,
}

impl Response {
    fn store_error(&self) -> GatewayError {
        GatewayError::Store(self.raw.trim().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    transport: Transport,
}

impl StoreClient {
    pub fn new(config: &Config) -> Self {
        StoreClient {
            transport: Transport::new(config),
        }
    }

    async fn call(&self, command: &str, args: &[&str]) -> GatewayResult<Response> {
        let raw = self.transport.execute(&resp::encode(command, args)).await?;
        let reply = resp::decode(&raw);
        debug!("{command} -> {reply:?}");
        Ok(Response {
            reply,
            raw: String::from_utf8_lossy(&raw).into_owned(),
        })
    }

    async fn call_integer(&self, command: &str, args: &[&str]) -> GatewayResult<i64> {
        let response = self.call(command, args).await?;
        match response.reply {
            Reply::Integer(n) => Ok(n),
            _ => Err(response.store_error()),
        }
    }

    async fn call_bulk(&self, command: &str, args: &[&str]) -> GatewayResult<Option<String>> {
        let response = self.call(command, args).await?;
        match response.reply {
            Reply::BulkString(value) => Ok(value),
            _ => Ok(None),
        }
    }

    /// `SET key value`. Succeeds only on a status reply containing `OK`.
    pub async fn set_string(&self, key: &str, value: &str) -> GatewayResult<()> {
        let response = self.call("SET", &[key, value]).await?;
        match &response.reply {
            Reply::Status(s) if s.contains("OK") => Ok(()),
            _ => Err(response.store_error()),
        }
    }

    /// `GET key`. A missing key, or any non bulk reply, is `None`.
    pub async fn get_string(&self, key: &str) -> GatewayResult<Option<String>> {
        self.call_bulk("GET", &[key]).await
    }

    pub async fn increment_counter(&self, key: &str) -> GatewayResult<i64> {
        self.update_counter(key, CounterAction::Incr).await
    }

    pub async fn decrement_counter(&self, key: &str) -> GatewayResult<i64> {
        self.update_counter(key, CounterAction::Decr).await
    }

    pub async fn update_counter(&self, key: &str, action: CounterAction) -> GatewayResult<i64> {
        self.call_integer(action.command(), &[key]).await
    }

    /// `KEYS`. Takes every odd-indexed line of the array's element lines,
    /// which for bulk string elements is each payload after its length line.
    /// A non-array reply yields no keys.
    pub async fn list_keys(&self) -> GatewayResult<Vec<String>> {
        let response = self.call("KEYS", &[]).await?;
        if !matches!(response.reply, Reply::Array(_)) {
            return Ok(Vec::new());
        }
        Ok(response
            .reply
            .element_lines()
            .into_iter()
            .skip(1)
            .step_by(2)
            .collect())
    }

    /// `HSET key field value`. Returns whether the field was newly created.
    pub async fn set_hash_field(&self, key: &str, field: &str, value: &str) -> GatewayResult<bool> {
        Ok(self.call_integer("HSET", &[key, field, value]).await? != 0)
    }

    pub async fn get_hash_field(&self, key: &str, field: &str) -> GatewayResult<Option<String>> {
        self.call_bulk("HGET", &[key, field]).await
    }

    /// `HGETALL key`. Elements pair up as field, value; a trailing unpaired
    /// field is dropped. A non-array reply yields an empty mapping.
    pub async fn get_all_hash_fields(&self, key: &str) -> GatewayResult<BTreeMap<String, String>> {
        let response = self.call("HGETALL", &[key]).await?;
        let items = match response.reply {
            Reply::Array(Some(items)) => items,
            _ => return Ok(BTreeMap::new()),
        };

        let mut fields = BTreeMap::new();
        for pair in items.chunks_exact(2) {
            if let (Some(field), Some(value)) = (bulk_text(&pair[0]), bulk_text(&pair[1])) {
                fields.insert(field, value);
            }
        }
        Ok(fields)
    }

    /// `HDEL key field`. Returns whether the field existed.
    pub async fn delete_hash_field(&self, key: &str, field: &str) -> GatewayResult<bool> {
        Ok(self.call_integer("HDEL", &[key, field]).await? != 0)
    }

    /// Send a raw command line and return the reply text, trimmed.
    pub async fn raw_command(&self, line: &str) -> GatewayResult<String> {
        let raw = self.transport.execute(&resp::encode_raw(line)).await?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }
}

fn bulk_text(reply: &Reply) -> Option<String> {
    match reply {
        Reply::BulkString(Some(s)) | Reply::Status(s) => Some(s.clone()),
        Reply::Integer(n) => Some(n.to_string()),
        _ => None,
    }
}
