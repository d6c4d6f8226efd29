//! Parser (§4.C): reads a memory file's YAML frontmatter and Markdown body.

use sha2::{Digest, Sha256};

use crate::config::ValidationConfig;
use crate::models::{MemoryFile, MemoryHeader};
use crate::tokens::count_tokens;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing frontmatter: file must start with '---' and contain a closing '---' line")]
    MissingFrontmatter,
    #[error("invalid yaml: {0}")]
    InvalidYaml(String),
    #[error("missing required fields: {0:?}")]
    MissingRequiredFields(Vec<&'static str>),
    #[error("field '{field}' has the wrong type: expected {expected}")]
    InvalidType { field: &'static str, expected: &'static str },
    #[error("field '{field}' has an invalid value '{value}': expected one of {allowed:?}")]
    InvalidEnum { field: &'static str, value: String, allowed: &'static [&'static str] },
    #[error("token count {0} exceeds hard limit {1}")]
    TokenCountHardLimit(usize, usize),
}

/// Required header fields enforced by §4.C step 4 / §3's `MemoryFile` invariants.
const REQUIRED_FIELDS: &[&str] = &["id", "tags", "scope", "priority", "confidence", "status"];
const SCOPE_VALUES: &[&str] = &["baseline", "global", "agent", "project", "ephemeral", "deprecated"];
const CONFIDENCE_VALUES: &[&str] = &["experimental", "active", "stable", "deprecated"];
const STATUS_VALUES: &[&str] = &["active", "deprecated"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    LowTokenCount,
    HighTokenCount,
    MissingTitle,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub message: String,
}

/// The result of parsing one memory file: either a parsed `MemoryFile` or a structured
/// error, plus any non-fatal warnings collected along the way.
#[derive(Debug)]
pub struct ParseResult {
    pub memory: Option<MemoryFile>,
    pub error: Option<ParserError>,
    pub warnings: Vec<ValidationWarning>,
}

const FRONTMATTER_FENCE: &str = "---";

/// Parses raw file bytes into a `MemoryFile`. `relative_path` is the path from the
/// memory root (its first segment becomes `directory`, per §4.C step 9).
pub fn parse_memory_file(raw_bytes: &[u8], relative_path: &str, validation: &ValidationConfig) -> ParseResult {
    let mut warnings = Vec::new();

    let text = match std::str::from_utf8(raw_bytes) {
        Ok(t) => t,
        Err(_) => {
            return ParseResult {
                memory: None,
                error: Some(ParserError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "file is not valid UTF-8",
                ))),
                warnings,
            }
        }
    };

    let (header_raw, body) = match split_frontmatter(text) {
        Some(parts) => parts,
        None => {
            return ParseResult {
                memory: None,
                error: Some(ParserError::MissingFrontmatter),
                warnings,
            }
        }
    };

    let header_value: serde_yaml::Value = match serde_yaml::from_str(header_raw) {
        Ok(v) => v,
        Err(e) => {
            return ParseResult {
                memory: None,
                error: Some(ParserError::InvalidYaml(e.to_string())),
                warnings,
            }
        }
    };

    let mapping = match header_value.as_mapping() {
        Some(m) => m,
        None => {
            return ParseResult {
                memory: None,
                error: Some(ParserError::InvalidYaml("frontmatter must be a YAML mapping".to_string())),
                warnings,
            }
        }
    };

    if let Some(err) = validate_header_fields(mapping) {
        return ParseResult { memory: None, error: Some(err), warnings };
    }

    let header: MemoryHeader = match serde_yaml::from_value(header_value.clone()) {
        Ok(h) => h,
        Err(e) => {
            return ParseResult {
                memory: None,
                error: Some(ParserError::InvalidYaml(e.to_string())),
                warnings,
            }
        }
    };

    if header.id.is_empty() {
        return ParseResult {
            memory: None,
            error: Some(ParserError::MissingRequiredFields(vec!["id"])),
            warnings,
        };
    }

    let token_count = count_tokens(body);
    if token_count > validation.max_hard_tokens {
        return ParseResult {
            memory: None,
            error: Some(ParserError::TokenCountHardLimit(token_count, validation.max_hard_tokens)),
            warnings,
        };
    }
    if token_count < validation.min_tokens {
        warnings.push(ValidationWarning {
            kind: WarningKind::LowTokenCount,
            message: format!("token_count {token_count} is below the soft minimum {}", validation.min_tokens),
        });
    } else if token_count > validation.max_tokens {
        warnings.push(ValidationWarning {
            kind: WarningKind::HighTokenCount,
            message: format!("token_count {token_count} is above the soft maximum {}", validation.max_tokens),
        });
    }

    let title = match extract_title(body) {
        Some(t) => t,
        None => {
            warnings.push(ValidationWarning {
                kind: WarningKind::MissingTitle,
                message: "body has no leading '#' heading".to_string(),
            });
            String::new()
        }
    };

    let memory = MemoryFile {
        header,
        path: relative_path.to_string(),
        title,
        body: body.to_string(),
        token_count,
    };

    ParseResult {
        memory: Some(memory),
        error: None,
        warnings,
    }
}

/// Enumerates missing required fields, then checks types and enum values for the
/// fields that are present (§4.C steps 4-5). Returns the first structural problem
/// found; presence is checked exhaustively before any type/enum check runs, so a
/// file missing several fields reports all of them in one `missing_required_fields`.
fn validate_header_fields(mapping: &serde_yaml::Mapping) -> Option<ParserError> {
    let get = |key: &str| mapping.get(serde_yaml::Value::String(key.to_string()));

    let missing: Vec<&'static str> = REQUIRED_FIELDS.iter().copied().filter(|f| get(f).is_none()).collect();
    if !missing.is_empty() {
        return Some(ParserError::MissingRequiredFields(missing));
    }

    if get("id").and_then(|v| v.as_str()).is_none() {
        return Some(ParserError::InvalidType { field: "id", expected: "string" });
    }

    match get("tags") {
        Some(serde_yaml::Value::Sequence(seq)) if seq.iter().all(|v| v.as_str().is_some()) => {}
        _ => return Some(ParserError::InvalidType { field: "tags", expected: "sequence of strings" }),
    }

    match get("scope").and_then(|v| v.as_str()) {
        None => return Some(ParserError::InvalidType { field: "scope", expected: "string" }),
        Some(s) if !SCOPE_VALUES.contains(&s) => {
            return Some(ParserError::InvalidEnum { field: "scope", value: s.to_string(), allowed: SCOPE_VALUES })
        }
        _ => {}
    }

    if get("priority").and_then(|v| v.as_f64()).is_none() {
        return Some(ParserError::InvalidType { field: "priority", expected: "number" });
    }

    match get("confidence").and_then(|v| v.as_str()) {
        None => return Some(ParserError::InvalidType { field: "confidence", expected: "string" }),
        Some(s) if !CONFIDENCE_VALUES.contains(&s) => {
            return Some(ParserError::InvalidEnum { field: "confidence", value: s.to_string(), allowed: CONFIDENCE_VALUES })
        }
        _ => {}
    }

    match get("status").and_then(|v| v.as_str()) {
        None => return Some(ParserError::InvalidType { field: "status", expected: "string" }),
        Some(s) if !STATUS_VALUES.contains(&s) => {
            return Some(ParserError::InvalidEnum { field: "status", value: s.to_string(), allowed: STATUS_VALUES })
        }
        _ => {}
    }

    None
}

/// Splits `---\n<yaml>\n---\n<body>` into its header and body halves.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix(FRONTMATTER_FENCE)?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let close_idx = rest.find("\n---")?;
    let header = &rest[..close_idx];
    let after_fence = &rest[close_idx + 4..];
    let body = after_fence.strip_prefix('\n').unwrap_or(after_fence);
    let body = body.trim_start_matches('\n');
    Some((header, body))
}

/// Extracts the text after the first `# ` heading line in the body.
fn extract_title(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let trimmed = line.trim_start();
        trimmed.strip_prefix("# ").map(|t| t.trim().to_string())
    })
}

pub fn file_hash(raw_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_bytes);
    format!("{:x}", hasher.finalize())
}

/// First path segment of a relative path, used as the memory's `directory`.
pub fn directory_of(relative_path: &str) -> &str {
    relative_path.split('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(body_tokens: &str) -> String {
        format!(
            "---\nid: mem_2026_01_01_001\ntags: [auth]\nscope: project\npriority: 0.5\nconfidence: active\nstatus: active\n---\n\n# JWT Rotation\n\n{body_tokens}\n"
        )
    }

    #[test]
    fn parses_well_formed_file() {
        let body = "word ".repeat(400);
        let raw = sample(&body);
        let validation = ValidationConfig::default();
        let result = parse_memory_file(raw.as_bytes(), "project/auth/jwt.md", &validation);
        assert!(result.error.is_none());
        let memory = result.memory.unwrap();
        assert_eq!(memory.header.id, "mem_2026_01_01_001");
        assert_eq!(memory.title, "JWT Rotation");
        assert_eq!(memory.directory(), "project");
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        let validation = ValidationConfig::default();
        let result = parse_memory_file(b"# no header here", "project/x.md", &validation);
        assert!(matches!(result.error, Some(ParserError::MissingFrontmatter)));
    }

    #[test]
    fn low_token_count_is_a_warning_not_an_error() {
        let raw = sample("short body");
        let validation = ValidationConfig::default();
        let result = parse_memory_file(raw.as_bytes(), "project/x.md", &validation);
        assert!(result.error.is_none());
        assert!(result.warnings.iter().any(|w| w.kind == WarningKind::LowTokenCount));
    }

    #[test]
    fn hard_token_limit_is_an_error() {
        let body = "word ".repeat(2500);
        let raw = sample(&body);
        let validation = ValidationConfig::default();
        let result = parse_memory_file(raw.as_bytes(), "project/x.md", &validation);
        assert!(matches!(result.error, Some(ParserError::TokenCountHardLimit(_, _))));
    }

    #[test]
    fn file_hash_is_deterministic() {
        let raw = b"same content";
        assert_eq!(file_hash(raw), file_hash(raw));
    }

    #[test]
    fn missing_header_fields_are_enumerated() {
        let validation = ValidationConfig::default();
        let raw = "---\nid: mem_2026_01_01_001\n---\n\n# T\n\nbody";
        let result = parse_memory_file(raw.as_bytes(), "project/x.md", &validation);
        match result.error {
            Some(ParserError::MissingRequiredFields(fields)) => {
                assert!(fields.contains(&"tags"));
                assert!(fields.contains(&"scope"));
                assert!(fields.contains(&"priority"));
                assert!(fields.contains(&"confidence"));
                assert!(fields.contains(&"status"));
            }
            other => panic!("expected MissingRequiredFields, got {other:?}"),
        }
    }

    #[test]
    fn wrong_type_priority_is_invalid_type() {
        let validation = ValidationConfig::default();
        let raw = "---\nid: mem_2026_01_01_001\ntags: [auth]\nscope: project\npriority: not-a-number\nconfidence: active\nstatus: active\n---\n\n# T\n\nbody";
        let result = parse_memory_file(raw.as_bytes(), "project/x.md", &validation);
        assert!(matches!(result.error, Some(ParserError::InvalidType { field: "priority", .. })));
    }

    #[test]
    fn bad_scope_enum_value_is_invalid_enum() {
        let validation = ValidationConfig::default();
        let raw = "---\nid: mem_2026_01_01_001\ntags: [auth]\nscope: nonsense\npriority: 0.5\nconfidence: active\nstatus: active\n---\n\n# T\n\nbody";
        let result = parse_memory_file(raw.as_bytes(), "project/x.md", &validation);
        assert!(matches!(result.error, Some(ParserError::InvalidEnum { field: "scope", .. })));
    }

    #[test]
    fn directory_is_first_path_segment() {
        assert_eq!(directory_of("project/auth/jwt.md"), "project");
        assert_eq!(directory_of("baseline/identity.md"), "baseline");
    }
}
