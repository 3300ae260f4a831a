//! 结构化存储的数据模型：标量 / 物品清单的显式标签联合，以及单会话的数据表

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::StoreError;

/// 会话 ID（对应聊天平台的 chat id）
pub type ConversationId = i64;

/// 清单中的一个物品；落盘字段名沿用 `value`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(rename = "value")]
    pub name: String,
    pub quantity: u32,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// 路径上的值。JSON 类型本身就是判别式：字符串 => Scalar，数组 => InventoryList
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Scalar(String),
    InventoryList(Vec<InventoryItem>),
}

/// 旧数据把清单编码成字符串存放（"[{\"value\":...}]"）；仅在 add / remove 触达时尝试还原
fn parse_legacy_list(raw: &str) -> Option<Vec<InventoryItem>> {
    if !raw.trim_start().starts_with('[') {
        return None;
    }
    serde_json::from_str(raw).ok()
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Scalar(s) => f.write_str(s),
            StoreValue::InventoryList(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} (x{})", item.name, item.quantity)?;
                }
                Ok(())
            }
        }
    }
}

/// add 的结果：新建物品或在已有物品上累加
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { quantity: u32 },
    Incremented { total: u32 },
}

/// remove 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// 路径不存在，未做任何修改
    PathEmpty,
    /// 清单中没有该物品，未做任何修改
    NotFound,
    Decremented { removed: u32, total: u32 },
    Removed,
}

impl RemoveOutcome {
    pub fn mutated(&self) -> bool {
        matches!(self, Self::Decremented { .. } | Self::Removed)
    }
}

/// 单个会话的全部数据：Path -> StoreValue，按路径排序
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatData {
    entries: BTreeMap<String, StoreValue>,
}

impl ChatData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&StoreValue> {
        self.entries.get(path)
    }

    pub fn set(&mut self, path: &str, value: impl Into<String>) {
        self.entries
            .insert(path.to_string(), StoreValue::Scalar(value.into()));
    }

    /// 标量内容能解析为清单时就地升级；升级出的空清单连同路径一起删除
    fn inventory_mut(&mut self, path: &str) -> Result<Option<&mut Vec<InventoryItem>>, StoreError> {
        let Some(value) = self.entries.get_mut(path) else {
            return Ok(None);
        };
        let upgraded = match value {
            StoreValue::InventoryList(_) => None,
            StoreValue::Scalar(found) => match parse_legacy_list(found) {
                Some(items) => Some(items),
                None => {
                    return Err(StoreError::NotAnInventory {
                        path: path.to_string(),
                        found: found.clone(),
                    })
                }
            },
        };
        if let Some(items) = upgraded {
            tracing::debug!(path, items = items.len(), "upgraded string-encoded list");
            if items.is_empty() {
                self.entries.remove(path);
                return Ok(None);
            }
            *value = StoreValue::InventoryList(items);
        }
        match self.entries.get_mut(path) {
            Some(StoreValue::InventoryList(items)) => Ok(Some(items)),
            _ => Ok(None),
        }
    }

    pub fn add(&mut self, path: &str, name: &str, quantity: u32) -> Result<AddOutcome, StoreError> {
        let Some(items) = self.inventory_mut(path)? else {
            self.entries.insert(
                path.to_string(),
                StoreValue::InventoryList(vec![InventoryItem::new(name, quantity)]),
            );
            return Ok(AddOutcome::Added { quantity });
        };
        if let Some(item) = items.iter_mut().find(|i| i.name == name) {
            item.quantity = item.quantity.saturating_add(quantity);
            return Ok(AddOutcome::Incremented {
                total: item.quantity,
            });
        }
        items.push(InventoryItem::new(name, quantity));
        Ok(AddOutcome::Added { quantity })
    }

    /// 数量不足或恰好相等时整项移除；清单被移空时连同路径一起删除
    pub fn remove(&mut self, path: &str, name: &str, quantity: u32) -> Result<RemoveOutcome, StoreError> {
        let Some(items) = self.inventory_mut(path)? else {
            return Ok(RemoveOutcome::PathEmpty);
        };
        let Some(idx) = items.iter().position(|i| i.name == name) else {
            return Ok(RemoveOutcome::NotFound);
        };
        if items[idx].quantity > quantity {
            items[idx].quantity -= quantity;
            return Ok(RemoveOutcome::Decremented {
                removed: quantity,
                total: items[idx].quantity,
            });
        }
        items.remove(idx);
        if items.is_empty() {
            self.entries.remove(path);
        }
        Ok(RemoveOutcome::Removed)
    }

    /// 删除 path 本身以及所有以 `path.` 开头的键，返回被删除的键
    pub fn delete(&mut self, path: &str) -> Vec<String> {
        let prefix = format!("{path}.");
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.as_str() == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed
    }

    /// 渲染全部数据；为空时返回 None
    pub fn render(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let mut out = String::from("Current chat data:\n");
        for (path, value) in &self.entries {
            out.push_str(&format!("- {path}: {value}\n"));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_format_is_string_or_array() {
        let mut data = ChatData::new();
        data.set("Hel.hp", "25");
        data.add("Hel.inventory", "Sword", 2).unwrap();

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Hel.hp": "25",
                "Hel.inventory": [{"value": "Sword", "quantity": 2}]
            })
        );

        let back: ChatData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_string_encoded_list_is_upgraded_only_by_list_actions() {
        let mut data: ChatData = serde_json::from_value(serde_json::json!({
            "Hel.inventory": "[{\"value\":\"Rope\",\"quantity\":3}]",
            "Hel.note": "[not json",
        }))
        .unwrap();

        assert_eq!(
            data.get("Hel.inventory"),
            Some(&StoreValue::Scalar("[{\"value\":\"Rope\",\"quantity\":3}]".to_string()))
        );
        assert_eq!(
            data.add("Hel.inventory", "Rope", 1).unwrap(),
            AddOutcome::Incremented { total: 4 }
        );
        assert_eq!(
            data.get("Hel.inventory"),
            Some(&StoreValue::InventoryList(vec![InventoryItem::new("Rope", 4)]))
        );
        assert!(matches!(
            data.add("Hel.note", "Rope", 1).unwrap_err(),
            StoreError::NotAnInventory { .. }
        ));
    }

    #[test]
    fn test_string_encoded_empty_list_counts_as_absent() {
        let mut data: ChatData =
            serde_json::from_value(serde_json::json!({ "Hel.inventory": "[]" })).unwrap();
        assert_eq!(
            data.remove("Hel.inventory", "Rope", 1).unwrap(),
            RemoveOutcome::PathEmpty
        );
        assert!(data.get("Hel.inventory").is_none());
        assert!(data.render().is_none());

        let mut data: ChatData =
            serde_json::from_value(serde_json::json!({ "Hel.inventory": "[]" })).unwrap();
        assert_eq!(
            data.add("Hel.inventory", "Rope", 2).unwrap(),
            AddOutcome::Added { quantity: 2 }
        );
        assert_eq!(data.get("Hel.inventory").unwrap().to_string(), "Rope (x2)");
    }

    #[test]
    fn test_add_on_scalar_is_storage_error() {
        let mut data = ChatData::new();
        data.set("Hel.inventory", "a sword");
        let err = data.add("Hel.inventory", "Sword", 1).unwrap_err();
        assert!(matches!(err, StoreError::NotAnInventory { .. }));
        let err = data.remove("Hel.inventory", "Sword", 1).unwrap_err();
        assert!(matches!(err, StoreError::NotAnInventory { .. }));
    }

    #[test]
    fn test_add_uses_supplied_quantity() {
        let mut data = ChatData::new();
        assert_eq!(
            data.add("Thif.inventory", "Arrow", 20).unwrap(),
            AddOutcome::Added { quantity: 20 }
        );
        assert_eq!(
            data.add("Thif.inventory", "Arrow", 5).unwrap(),
            AddOutcome::Incremented { total: 25 }
        );
        assert_eq!(
            data.remove("Thif.inventory", "Arrow", 7).unwrap(),
            RemoveOutcome::Decremented { removed: 7, total: 18 }
        );
    }

    #[test]
    fn test_remove_more_than_held_drops_item_and_keeps_others() {
        let mut data = ChatData::new();
        data.add("Hel.inventory", "Sword", 1).unwrap();
        data.add("Hel.inventory", "Torch", 2).unwrap();

        assert_eq!(
            data.remove("Hel.inventory", "Torch", 5).unwrap(),
            RemoveOutcome::Removed
        );
        assert_eq!(
            data.get("Hel.inventory").unwrap().to_string(),
            "Sword (x1)"
        );
    }

    #[test]
    fn test_render_orders_paths_and_formats_lists() {
        let mut data = ChatData::new();
        assert!(data.render().is_none());

        data.set("Thif.hp", "12");
        data.add("Hel.inventory", "Sword", 2).unwrap();
        data.add("Hel.inventory", "Shield", 1).unwrap();

        assert_eq!(
            data.render().unwrap(),
            "Current chat data:\n- Hel.inventory: Sword (x2), Shield (x1)\n- Thif.hp: 12\n"
        );
    }

    #[test]
    fn test_delete_does_not_touch_lookalike_subjects() {
        let mut data = ChatData::new();
        data.set("Hel.hp", "25");
        data.set("Helga.hp", "30");
        let deleted = data.delete("Hel");
        assert_eq!(deleted, vec!["Hel.hp".to_string()]);
        assert!(data.get("Helga.hp").is_some());
    }
}
