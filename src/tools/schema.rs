//! 工具参数 JSON Schema 生成（schemars 自动生成，裁剪为 Gemini 可接受的子集）
//!
//! Gemini 的 Schema 不接受 `$schema`、`title`、`definitions`、可空联合类型与非标准 format，
//! 因此内联所有子 schema、关闭 Option 的 null 类型，并递归删掉不支持的键。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

/// Gemini 接受的 format 取值
const SUPPORTED_FORMATS: &[&str] = &["int32", "int64", "float", "double", "enum", "date-time"];

/// 为参数结构体生成 schema
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = false;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    });
    strip_unsupported(&mut value);
    value
}

fn strip_unsupported(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("title");
            map.remove("definitions");
            map.remove("$schema");
            let unsupported_format = map
                .get("format")
                .and_then(Value::as_str)
                .is_some_and(|f| !SUPPORTED_FORMATS.contains(&f));
            if unsupported_format {
                map.remove("format");
            }
            for (key, child) in map.iter_mut() {
                // properties 下的键是字段名，不能当作 schema 关键字删除
                if key == "properties" {
                    if let Value::Object(props) = child {
                        props.values_mut().for_each(strip_unsupported);
                    }
                } else {
                    strip_unsupported(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_unsupported),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    #[serde(rename_all = "lowercase")]
    enum Mode {
        Fast,
        Slow,
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Sample {
        /// Which mode to use
        mode: Mode,
        /// Optional title text
        title: Option<String>,
        count: Option<u32>,
    }

    #[test]
    fn test_schema_is_inline_and_gemini_compatible() {
        let schema = parameters_schema::<Sample>();

        assert_eq!(schema["type"], "object");
        assert!(schema.get("title").is_none());
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("definitions").is_none());

        let props = &schema["properties"];
        assert_eq!(props["mode"]["enum"], serde_json::json!(["fast", "slow"]));
        assert_eq!(props["mode"]["description"], "Which mode to use");
        // 字段名叫 title 时不能被删掉
        assert_eq!(props["title"]["type"], "string");
        assert_eq!(props["count"]["type"], "integer");
        assert!(props["count"].get("format").is_none());

        assert_eq!(schema["required"], serde_json::json!(["mode"]));
    }
}
