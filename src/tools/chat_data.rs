//! chat_data 工具：结构化存储对 LLM 的唯一入口
//!
//! 参数在注册表边界反序列化为 ChatDataArgs，再按 action 做必填项、路径与数量校验，
//! 校验失败返回 ToolError::Validation，不触碰存储。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::store::{AddOutcome, ChatStore, RemoveOutcome, StorePath, StoreValue};
use crate::tools::{FunctionTool, ToolContext, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatDataAction {
    Get,
    Set,
    Add,
    Remove,
    Delete,
    Show,
}

impl ChatDataAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Delete => "delete",
            Self::Show => "show",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChatDataArgs {
    /// The action to perform: get, set, add, remove, delete or show
    pub action: ChatDataAction,

    /// Access path in subject.property form, e.g. Hel.hp or Hel.inventory. Use just the subject (e.g. Hel) with delete to remove a character and all its properties. Not needed for show
    #[serde(default)]
    pub path: Option<String>,

    /// The value to set, or the item name to add or remove
    #[serde(default)]
    pub value: Option<String>,

    /// Quantity for add or remove, defaults to 1
    #[serde(default, deserialize_with = "lenient_quantity")]
    #[schemars(with = "Option<i64>")]
    pub quantity: Option<i64>,
}

/// 接受整数、整数值的浮点（2.0）与数字字符串
fn lenient_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("quantity must be an integer, got {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("quantity must be an integer, got {s:?}"))),
        Some(other) => Err(D::Error::custom(format!("quantity must be an integer, got {other}"))),
    }
}

pub struct ChatDataTool {
    store: Arc<ChatStore>,
}

impl ChatDataTool {
    pub fn new(store: Arc<ChatStore>) -> Self {
        Self { store }
    }
}

fn present<'a>(field: &str, value: Option<&'a str>, action: ChatDataAction) -> Result<&'a str, ToolError> {
    value.ok_or_else(|| ToolError::Validation(format!("{field} is required for action {}", action.as_str())))
}

fn required<'a>(field: &str, value: Option<&'a str>, action: ChatDataAction) -> Result<&'a str, ToolError> {
    present(field, value.filter(|v| !v.is_empty()), action)
}

fn quantity(raw: Option<i64>) -> Result<u32, ToolError> {
    let q = raw.unwrap_or(1);
    if q < 1 {
        return Err(ToolError::Validation(format!("quantity must be at least 1, got {q}")));
    }
    u32::try_from(q).map_err(|_| ToolError::Validation(format!("quantity {q} is too large")))
}

impl ChatDataArgs {
    fn raw_path(&self) -> Result<&str, ToolError> {
        required("path", self.path.as_deref(), self.action)
    }

    fn property_path(&self) -> Result<StorePath, ToolError> {
        StorePath::parse_property(self.raw_path()?).map_err(|e| ToolError::Validation(e.to_string()))
    }

    /// delete 允许只给 subject
    fn any_path(&self) -> Result<StorePath, ToolError> {
        StorePath::parse(self.raw_path()?).map_err(|e| ToolError::Validation(e.to_string()))
    }

    /// set 的值可以是空字符串
    fn scalar_value(&self) -> Result<&str, ToolError> {
        present("value", self.value.as_deref(), self.action)
    }

    fn item_name(&self) -> Result<&str, ToolError> {
        required("value", self.value.as_deref(), self.action)
    }
}

#[async_trait]
impl FunctionTool for ChatDataTool {
    type Args = ChatDataArgs;

    const NAME: &'static str = "chat_data";
    const DESCRIPTION: &'static str = "Read and modify persistent data for this chat: character stats, \
        inventories and other facts. Paths use subject.property form (e.g. Hel.hp). \
        Use set/get for single values, add/remove with quantity for inventories, \
        delete to drop a property or a whole character, and show to list everything.";

    async fn call(&self, ctx: &ToolContext, args: ChatDataArgs) -> Result<String, ToolError> {
        let id = ctx.conversation_id;
        let action = args.action;
        tracing::debug!(
            conversation_id = id,
            action = action.as_str(),
            path = args.path.as_deref().unwrap_or(""),
            "chat_data"
        );

        match action {
            ChatDataAction::Show => Ok(self
                .store
                .show(id)
                .await?
                .unwrap_or_else(|| "No chat data available".to_string())),
            ChatDataAction::Get => {
                let path = args.property_path()?;
                let out = match self.store.get(id, &path).await? {
                    Some(StoreValue::Scalar(s)) => s,
                    Some(StoreValue::InventoryList(items)) => serde_json::to_string(&items)
                        .map_err(|e| ToolError::Execution(e.to_string()))?,
                    None => String::new(),
                };
                Ok(out)
            }
            ChatDataAction::Set => {
                let path = args.property_path()?;
                let value = args.scalar_value()?;
                self.store.set(id, &path, value).await?;
                Ok(format!("Set {path} to {value}"))
            }
            ChatDataAction::Add => {
                let path = args.property_path()?;
                let item = args.item_name()?;
                let q = quantity(args.quantity)?;
                let out = match self.store.add(id, &path, item, q).await? {
                    AddOutcome::Added { quantity } => {
                        format!("Added {item} to {path} with quantity {quantity}")
                    }
                    AddOutcome::Incremented { total } => {
                        format!("Incremented quantity of {item} to {total} in {path}")
                    }
                };
                Ok(out)
            }
            ChatDataAction::Remove => {
                let path = args.property_path()?;
                let item = args.item_name()?;
                let q = quantity(args.quantity)?;
                let out = match self.store.remove(id, &path, item, q).await? {
                    RemoveOutcome::PathEmpty => format!("{path} is empty"),
                    RemoveOutcome::NotFound => format!("{item} not found in {path}"),
                    RemoveOutcome::Decremented { removed, total } => {
                        format!("Decremented {removed} of {item} in {path}. New total is {total}")
                    }
                    RemoveOutcome::Removed => format!("Removed {item} from {path}"),
                };
                Ok(out)
            }
            ChatDataAction::Delete => {
                let path = args.any_path()?;
                let deleted = self.store.delete(id, &path).await?;
                let out = if deleted.is_empty() {
                    format!("{path} does not exist")
                } else if path.property().is_none() {
                    format!("Deleted character {path} and all its properties")
                } else {
                    format!("Deleted {path}")
                };
                Ok(out)
            }
        }
    }
}
