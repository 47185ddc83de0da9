pub mod api;
pub mod appresult;
pub mod chat;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod server;

use serde_json::Value;

pub use api::{ChatApi, HttpChatApi};
pub use appresult::{AppError, AppResult, Validation};
pub use chat::{ChatEvent, Messenger, PollState};
pub use config::{ChatConfig, ServerConfig};

pub trait GetField {
    fn get_bool_field(&self, field: &str) -> AppResult<bool>;
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn take_field(&mut self, field: &str) -> AppResult<Value>;
}

impl GetField for serde_json::Value {
    fn get_bool_field(&self, field: &str) -> AppResult<bool> {
        self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_bool()
            .ok_or(format!("expected {field} in {self} to be bool").into())
    }

    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn take_field(&mut self, field: &str) -> AppResult<Value> {
        match self.get_mut(field) {
            Some(value) => Ok(value.take()),
            None => Err(format!("expected {field} in response").into()),
        }
    }
}
