use serde_json::Value;

use super::error::FilterError;
use super::types::{is_valid_identifier, FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                // Expect array of strings like ["created_at desc", "title asc"]
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => {
                            return Err(FilterError::InvalidOrder(format!("Unsupported order entry: {}", other)))
                        }
                    }
                }
                out
            }
            Value::Object(obj) => {
                // { "created_at": "desc", "title": "asc" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    let sort = Self::parse_direction(v.as_str().unwrap_or("asc"))?;
                    out.push(FilterOrderInfo { column: k.clone(), sort });
                }
                out
            }
            Value::Null => vec![],
            other => return Err(FilterError::InvalidOrder(format!("Unsupported order format: {}", other))),
        };

        for info in &infos {
            if !is_valid_identifier(&info.column) {
                return Err(FilterError::InvalidColumn(info.column.clone()));
            }
        }
        Ok(infos)
    }

    fn parse_direction(dir: &str) -> Result<SortDirection, FilterError> {
        match dir.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(FilterError::InvalidOrder(format!("Unknown sort direction: {}", other))),
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let sort = Self::parse_direction(it.next().unwrap_or("asc"))?;
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() { return String::new(); }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_with_multiple_columns() {
        let infos = FilterOrder::validate_and_parse(&json!("is_pinned desc, created_at desc")).unwrap();
        assert_eq!(FilterOrder::generate(&infos), "ORDER BY \"is_pinned\" DESC, \"created_at\" DESC");
    }

    #[test]
    fn defaults_to_ascending() {
        let infos = FilterOrder::validate_and_parse(&json!(["title"])).unwrap();
        assert_eq!(infos[0].sort, SortDirection::Asc);
    }

    #[test]
    fn rejects_bad_direction_and_column() {
        assert!(FilterOrder::validate_and_parse(&json!("title sideways")).is_err());
        assert!(FilterOrder::validate_and_parse(&json!({"title; drop": "asc"})).is_err());
    }
}
