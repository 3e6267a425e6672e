//! YAML parsing helpers
//!
//! Parses YAML into `serde_json::Value` so CRD specs can be deserialized
//! through the same serde path the API server uses.

use crate::Error;

/// Parse a YAML document into a JSON value
pub fn parse_yaml(input: &str) -> Result<serde_json::Value, Error> {
    serde_yaml::from_str(input).map_err(|e| Error::serialization(format!("invalid YAML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_mapping() {
        let value = parse_yaml("schedule: \"0 2 * * *\"\ndisabled: true\n").unwrap();
        assert_eq!(value["schedule"], "0 2 * * *");
        assert_eq!(value["disabled"], true);
    }

    #[test]
    fn test_parse_yaml_invalid() {
        assert!(parse_yaml("not: valid: yaml: {{").is_err());
    }
}
