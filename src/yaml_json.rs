//! `FrontMatter` (see [`crate::types`]) is keyed on `serde_json::Value` so it
//! can share machinery with the GitHub API layer; manifests and document
//! front-matter blocks are YAML. This is the one conversion point between
//! the two.

use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

pub fn yaml_to_json(value: &YamlValue) -> JsonValue {
    match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(b) => JsonValue::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            } else {
                JsonValue::Null
            }
        }
        YamlValue::String(s) => JsonValue::String(s.clone()),
        YamlValue::Sequence(seq) => JsonValue::Array(seq.iter().map(yaml_to_json).collect()),
        YamlValue::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    YamlValue::String(s) => s.clone(),
                    other => yaml_to_json(other).to_string(),
                };
                out.insert(key, yaml_to_json(v));
            }
            JsonValue::Object(out)
        }
        YamlValue::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

pub fn json_to_yaml(value: &JsonValue) -> YamlValue {
    match value {
        JsonValue::Null => YamlValue::Null,
        JsonValue::Bool(b) => YamlValue::Bool(*b),
        JsonValue::Number(n) => {
            serde_yaml::from_str(&n.to_string()).unwrap_or(YamlValue::Null)
        }
        JsonValue::String(s) => YamlValue::String(s.clone()),
        JsonValue::Array(arr) => YamlValue::Sequence(arr.iter().map(json_to_yaml).collect()),
        JsonValue::Object(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                out.insert(YamlValue::String(k.clone()), json_to_yaml(v));
            }
            YamlValue::Mapping(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_map() {
        let yaml: YamlValue = serde_yaml::from_str("title: Hello\ntags: [a, b]\ncount: 3\n").unwrap();
        let json = yaml_to_json(&yaml);
        assert_eq!(json["title"], JsonValue::String("Hello".to_string()));
        assert_eq!(json["count"], JsonValue::from(3));
        assert_eq!(json["tags"], JsonValue::Array(vec!["a".into(), "b".into()]));

        let back = json_to_yaml(&json);
        assert_eq!(back["title"], YamlValue::String("Hello".to_string()));
    }
}
