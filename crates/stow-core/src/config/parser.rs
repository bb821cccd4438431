//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::EngineConfig;

/// Parse an engine config file with detailed error messages
pub fn load(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse engine config content from a string
pub fn parse_str(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate().context("Invalid engine configuration")?;

    Ok(config)
}

/// Serialize a configuration to TOML
pub fn to_toml(config: &EngineConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

/// Attach the offending lines to a TOML error
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    match error.span() {
        Some(span) => {
            let line_num = content[..span.start.min(content.len())]
                .matches('\n')
                .count()
                + 1;
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                get_line_context(content, line_num),
                message
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::error::ConfigError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn release_key() -> String {
        use base64::Engine;
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
failure_policy = "continue"

[phases.collect]
weight = 20
split = [0, 100, 1000]

[collect]
max_parallel = 8
http_timeout_secs = 15

[trust]
allow_unsigned = false

[trust.keys]
release = "KEY"
"#
        .replace("KEY", &release_key());

        let config = parse_str(&toml).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.phase("collect").unwrap().weight, Some(20));
        assert_eq!(config.phase("collect").unwrap().split, Some([0, 100, 1000]));
        assert_eq!(config.collect.max_parallel, 8);
        assert!(!config.trust.allow_unsigned);
        assert_eq!(config.trust.keys.len(), 1);
    }

    #[test]
    fn test_parse_empty_config() {
        assert_eq!(parse_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_error_reports_line() {
        let toml = "failure_policy = \"abort\"\n\n[collect\nmax_parallel = 2\n";
        let err = parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{err}");
        assert!(err.contains("[collect"), "{err}");
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(parse_str("failure_policy = \"retry\"").is_err());
    }

    #[test]
    fn test_validation_errors_are_typed() {
        let err = parse_str("[collect]\nmax_parallel = 0\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroParallelism)
        );

        let err = parse_str("[trust.keys]\nbroken = \"abc\"\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut original = EngineConfig::default();
        original.failure_policy = FailurePolicy::Continue;
        original.collect.max_parallel = 2;

        let parsed = parse_str(&to_toml(&original).unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[collect]\nmax_parallel = 3").unwrap();

        let config = load(temp_file.path()).unwrap();
        assert_eq!(config.collect.max_parallel, 3);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = load(Path::new("/nonexistent/path/engine.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
