//! Loads the pipeline configuration from TOML.

use std::path::Path;

use dkpublish_engine::PipelineConfig;

/// Read `path`, or fall back to defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<PipelineConfig, String> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    parse(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

pub fn parse(content: &str) -> Result<PipelineConfig, toml::de::Error> {
    toml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(parse("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse(
            r#"
countries_of_interest = ["BE"]

[eks]
tek_count_min = 5
tek_count_max = 10

[federation]
base_url = "https://gateway.example.org"
days_to_look_back = 3

[signing]
national_key = "keys/national.secret"
"#,
        )
        .unwrap();
        assert_eq!(config.eks.tek_count_min, 5);
        assert_eq!(config.eks.tek_count_max, 10);
        assert_eq!(config.eks.page_size, 10_000);
        assert_eq!(config.countries_of_interest, vec!["BE".to_string()]);
        assert_eq!(config.federation.days_to_look_back, 3);
        assert_eq!(
            config.signing.national_key.as_deref(),
            Some(Path::new("keys/national.secret"))
        );
        assert!(config.signing.platform_key.is_none());
    }

    #[test]
    fn unknown_types_are_reported() {
        assert!(parse("[eks]\ntek_count_min = \"many\"").is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load(Some(Path::new("/nonexistent/dkpublish.toml"))).unwrap_err();
        assert!(err.contains("/nonexistent/dkpublish.toml"));
    }
}
