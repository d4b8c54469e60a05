//! 工具清单
//!
//! 每轮随历史一起发给模型的静态描述（name / description / parameters）。
//! 参数 schema 由类型化参数结构经 schemars 生成，再裁剪为模型 function declaration 接受的子集。

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};

/// 单个工具的描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolManifest {
    tools: Vec<ToolSpec>,
}

impl ToolManifest {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.tools).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 由参数结构生成 schema（字段 doc 注释成为 description）
pub fn schema_for_args<T: JsonSchema>() -> Value {
    let root = schemars::schema_for!(T);
    let value = serde_json::to_value(root).unwrap_or(Value::Null);
    to_declaration_schema(value)
}

/// 裁剪为 OpenAPI 子集：去掉 $schema / title / definitions / format，
/// `["integer", "null"]` 这类可空类型取非 null 的那个，并保证 object 有 properties
pub fn to_declaration_schema(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map {
                match key.as_str() {
                    "$schema" | "title" | "definitions" | "format" => {}
                    "type" => {
                        out.insert(key, collapse_nullable(v));
                    }
                    "properties" => {
                        let props = match v {
                            Value::Object(props) => props
                                .into_iter()
                                .map(|(k, p)| (k, to_declaration_schema(p)))
                                .collect(),
                            _ => Map::new(),
                        };
                        out.insert(key, Value::Object(props));
                    }
                    _ => {
                        out.insert(key, to_declaration_schema(v));
                    }
                }
            }
            if out.get("type") == Some(&Value::String("object".into()))
                && !out.contains_key("properties")
            {
                out.insert("properties".into(), Value::Object(Map::new()));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(to_declaration_schema).collect()),
        other => other,
    }
}

fn collapse_nullable(v: Value) -> Value {
    match v {
        Value::Array(types) => types
            .into_iter()
            .find(|t| t.as_str() != Some("null"))
            .unwrap_or(Value::String("string".into())),
        other => other,
    }
}
