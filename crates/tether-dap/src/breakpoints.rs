//! Breakpoint validation and conversion.
//!
//! Callers hand in loosely-typed JSON specs; structural problems are hard
//! [`BreakpointError`]s, while file-level checks (missing file, line out of
//! range, blank or non-executable line) are advisory and reported as
//! `(false, reason)` by [`validate_breakpoint_line`].

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::BreakpointError;
use crate::protocol::{SetBreakpointsArguments, Source, SourceBreakpoint};

/// A validated breakpoint request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakpointSpec {
    /// Normalized source path.
    pub file: String,
    /// 1-based line.
    pub line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl BreakpointSpec {
    /// A plain line breakpoint.
    pub fn new(file: impl Into<String>, line: i64) -> Self {
        Self {
            file: file.into(),
            line,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: None,
        }
    }

    pub fn with_column(mut self, column: i64) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_hit_condition(mut self, hit_condition: impl Into<String>) -> Self {
        self.hit_condition = Some(hit_condition.into());
        self
    }

    /// Make this a logpoint.
    pub fn with_log_message(mut self, msg: impl Into<String>) -> Self {
        self.log_message = Some(msg.into());
        self
    }

    /// The spec as a plain mapping with the input field names.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn to_source_breakpoint(&self) -> SourceBreakpoint {
        SourceBreakpoint {
            line: self.line,
            column: self.column,
            condition: self.condition.clone(),
            hit_condition: self.hit_condition.clone(),
            log_message: self.log_message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Hit conditions
// ---------------------------------------------------------------------------

/// Comparison in a hit condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOperator {
    /// Bare count; same as `>=`.
    Count,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    /// Every Nth hit.
    Modulo,
}

/// A parsed hit condition such as `>=3` or `%2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitCondition {
    pub op: HitOperator,
    pub count: u64,
}

impl HitCondition {
    /// Whether the breakpoint should fire on hit number `hits` (1-based).
    pub fn matches(&self, hits: u64) -> bool {
        match self.op {
            HitOperator::Count | HitOperator::GreaterOrEqual => hits >= self.count,
            HitOperator::Greater => hits > self.count,
            HitOperator::Less => hits < self.count,
            HitOperator::LessOrEqual => hits <= self.count,
            HitOperator::Equal => hits == self.count,
            HitOperator::Modulo => self.count != 0 && hits % self.count == 0,
        }
    }
}

// Longest operators first so `>=` is not read as `>`.
const HIT_OPERATORS: &[(&str, HitOperator)] = &[
    (">=", HitOperator::GreaterOrEqual),
    ("<=", HitOperator::LessOrEqual),
    ("==", HitOperator::Equal),
    (">", HitOperator::Greater),
    ("<", HitOperator::Less),
    ("%", HitOperator::Modulo),
];

/// Parse a hit condition: an optional operator followed by a count.
pub fn parse_hit_condition(input: &str) -> Result<HitCondition, BreakpointError> {
    let invalid = || BreakpointError::InvalidHitCondition(input.to_string());
    let trimmed = input.trim();

    let (op, rest) = HIT_OPERATORS
        .iter()
        .find_map(|(token, op)| trimmed.strip_prefix(token).map(|rest| (*op, rest)))
        .unwrap_or((HitOperator::Count, trimmed));

    let digits = rest.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count: u64 = digits.parse().map_err(|_| invalid())?;
    if op == HitOperator::Modulo && count == 0 {
        return Err(invalid());
    }
    Ok(HitCondition { op, count })
}

// ---------------------------------------------------------------------------
// Spec validation
// ---------------------------------------------------------------------------

/// Validate and normalize one spec mapping.
///
/// `file` and `line` are required. Unrecognised keys are dropped.
pub fn validate_breakpoint_spec(spec: &Map<String, Value>) -> Result<BreakpointSpec, BreakpointError> {
    let file = match spec.get("file") {
        None | Some(Value::Null) => return Err(BreakpointError::MissingField("file")),
        Some(Value::String(s)) if !s.trim().is_empty() => normalize_path(s.trim()),
        Some(Value::String(_)) => {
            return Err(BreakpointError::InvalidField {
                field: "file",
                message: "must not be empty".into(),
            })
        }
        Some(other) => {
            return Err(BreakpointError::InvalidField {
                field: "file",
                message: format!("expected a string, got {}", json_type(other)),
            })
        }
    };

    let line = match spec.get("line") {
        None | Some(Value::Null) => return Err(BreakpointError::MissingField("line")),
        Some(v) => positive_int("line", v)?,
    };
    let column = optional(spec, "column")
        .map(|v| positive_int("column", v))
        .transpose()?;

    let condition = optional_string(spec, "condition")?;
    let hit_condition = optional_string(spec, "hit_condition")?;
    if let Some(hit) = &hit_condition {
        parse_hit_condition(hit)?;
    }
    let log_message = optional_string(spec, "log_message")?;

    Ok(BreakpointSpec {
        file,
        line,
        column,
        condition,
        hit_condition,
        log_message,
    })
}

/// Accept a single spec or a list of specs and validate each, in order.
///
/// `null` and `[]` both yield an empty list.
pub fn process_breakpoint_inputs(input: &Value) -> Result<Vec<BreakpointSpec>, BreakpointError> {
    match input {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(vec![validate_breakpoint_spec(map)?]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => validate_breakpoint_spec(map),
                other => Err(BreakpointError::NotAMapping {
                    index,
                    found: json_type(other),
                }),
            })
            .collect(),
        other => Err(BreakpointError::NotAMapping {
            index: 0,
            found: json_type(other),
        }),
    }
}

fn optional<'a>(spec: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    spec.get(field).filter(|v| !v.is_null())
}

fn optional_string(
    spec: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, BreakpointError> {
    match optional(spec, field) {
        None => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(BreakpointError::InvalidField {
            field,
            message: format!("expected a string, got {}", json_type(other)),
        }),
    }
}

fn positive_int(field: &'static str, value: &Value) -> Result<i64, BreakpointError> {
    match value.as_i64() {
        Some(n) if n > 0 => Ok(n),
        Some(n) => Err(BreakpointError::InvalidField {
            field,
            message: format!("must be a positive integer, got {n}"),
        }),
        None => Err(BreakpointError::InvalidField {
            field,
            message: format!("must be a positive integer, got {value}"),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Lexically collapse `.`, `..` and repeated separators.
///
/// The filesystem is not consulted and relative paths stay relative.
pub fn normalize_path(path: &str) -> String {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        return ".".to_string();
    }
    out.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Grouping and conversion
// ---------------------------------------------------------------------------

/// Partition specs by file. Files appear in first-seen order and each
/// group keeps the input order.
pub fn group_breakpoints_by_source(
    breakpoints: &[BreakpointSpec],
) -> Vec<(String, Vec<BreakpointSpec>)> {
    let mut groups: Vec<(String, Vec<BreakpointSpec>)> = Vec::new();
    for bp in breakpoints {
        match groups.iter_mut().find(|(file, _)| *file == bp.file) {
            Some((_, group)) => group.push(bp.clone()),
            None => groups.push((bp.file.clone(), vec![bp.clone()])),
        }
    }
    groups
}

/// One `setBreakpoints` request per source file.
pub fn convert_breakpoints(breakpoints: &[BreakpointSpec]) -> Vec<SetBreakpointsArguments> {
    group_breakpoints_by_source(breakpoints)
        .into_iter()
        .map(|(file, group)| {
            let name = Path::new(&file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            SetBreakpointsArguments {
                source: Source {
                    name,
                    path: Some(file),
                    source_reference: None,
                },
                breakpoints: Some(group.iter().map(BreakpointSpec::to_source_breakpoint).collect()),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Line checks
// ---------------------------------------------------------------------------

/// Lines a given adapter can never stop on.
#[derive(Debug, Clone)]
pub struct AdapterLinePatterns {
    pub adapter: String,
    patterns: Vec<(Regex, String)>,
}

const COMMENT_HASH: (&str, &str) = (r"^\s*#", "comment");
const COMMENT_SLASH: (&str, &str) = (r"^\s*//", "comment");
const BLOCK_COMMENT: (&str, &str) = (r"^\s*(/\*|\*)", "block comment");
const BRACES_ONLY: (&str, &str) = (r"^\s*[{}()\[\];,]+\s*$", "brace-only line");

impl AdapterLinePatterns {
    /// Built-in patterns for a language or adapter name.
    pub fn builtin(adapter: &str) -> Option<Self> {
        let table: &[(&str, &str)] = match adapter {
            "python" | "debugpy" => &[COMMENT_HASH],
            "javascript" | "node" | "js" | "typescript" | "pwa-node" => {
                &[COMMENT_SLASH, BLOCK_COMMENT, BRACES_ONLY]
            }
            "java" => &[
                COMMENT_SLASH,
                BLOCK_COMMENT,
                BRACES_ONLY,
                (r"^\s*(import|package)\s", "import declaration"),
                (r"^\s*@\w+", "annotation"),
            ],
            "ruby" | "rdbg" => &[COMMENT_HASH],
            "go" | "delve" => &[
                COMMENT_SLASH,
                BLOCK_COMMENT,
                BRACES_ONLY,
                (r"^\s*(package|import)\b", "import declaration"),
            ],
            "rust" | "lldb" | "codelldb" => &[
                COMMENT_SLASH,
                BRACES_ONLY,
                (r"^\s*(use|mod)\s", "import declaration"),
                (r"^\s*#!?\[", "attribute"),
            ],
            _ => return None,
        };
        let patterns = table
            .iter()
            .filter_map(|(re, what)| Regex::new(re).ok().map(|r| (r, what.to_string())))
            .collect();
        Some(Self {
            adapter: adapter.to_string(),
            patterns,
        })
    }

    /// Patterns from configuration, with no built-ins.
    pub fn from_patterns(adapter: &str, patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Ok((Regex::new(p)?, format!("matches pattern {p:?}"))))
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self {
            adapter: adapter.to_string(),
            patterns,
        })
    }

    /// Built-ins for `adapter` (if any) plus the configured extras.
    pub fn for_adapter(
        adapter: &str,
        entry: Option<&tether_config::AdapterEntry>,
    ) -> Result<Option<Self>, regex::Error> {
        let builtin = Self::builtin(adapter);
        let extra = match entry {
            Some(e) if !e.non_executable_patterns.is_empty() => {
                Some(Self::from_patterns(adapter, &e.non_executable_patterns)?)
            }
            _ => None,
        };
        Ok(match (builtin, extra) {
            (Some(mut b), Some(e)) => {
                b.patterns.extend(e.patterns);
                Some(b)
            }
            (b, e) => b.or(e),
        })
    }

    /// Reason the line is non-executable, if it is.
    pub fn non_executable_reason(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, why)| why.as_str())
    }
}

/// Advisory check that `line` of `file` can hold a breakpoint.
///
/// Returns `(true, "OK")` or `(false, reason)`.
pub fn validate_breakpoint_line(
    file: &Path,
    line: i64,
    adapter: Option<&AdapterLinePatterns>,
) -> (bool, String) {
    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (false, format!("File not found: {}", file.display()))
        }
        Err(e) => return (false, format!("Cannot read {}: {e}", file.display())),
    };

    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    if line <= 0 || line as usize > total {
        return (
            false,
            format!("Line {line} is out of range (file has {total} lines)"),
        );
    }

    let text = lines[line as usize - 1];
    if text.trim().is_empty() {
        return (false, format!("Line {line} is a blank line"));
    }
    if let Some(patterns) = adapter {
        if let Some(reason) = patterns.non_executable_reason(text) {
            return (
                false,
                format!(
                    "Line {line} is not executable for {}: {reason}",
                    patterns.adapter
                ),
            );
        }
    }
    (true, "OK".to_string())
}

/// An advisory problem with one breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointWarning {
    pub file: String,
    pub line: i64,
    pub reason: String,
}

/// Run [`validate_breakpoint_line`] over a batch when `enabled`.
pub fn check_breakpoint_lines(
    breakpoints: &[BreakpointSpec],
    adapter: Option<&AdapterLinePatterns>,
    enabled: bool,
) -> Vec<BreakpointWarning> {
    if !enabled {
        return Vec::new();
    }
    breakpoints
        .iter()
        .filter_map(|bp| {
            let (ok, reason) = validate_breakpoint_line(Path::new(&bp.file), bp.line, adapter);
            if !ok {
                tracing::warn!(file = %bp.file, line = bp.line, "{reason}");
            }
            (!ok).then(|| BreakpointWarning {
                file: bp.file.clone(),
                line: bp.line,
                reason,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    fn spec(v: Value) -> Result<BreakpointSpec, BreakpointError> {
        validate_breakpoint_spec(v.as_object().unwrap())
    }

    // -- validate_breakpoint_line -------------------------------------------

    #[test]
    fn line_out_of_range_mentions_length() {
        let f = source_file("a = 1\nb = 2\nc = 3\n");
        let (ok, reason) = validate_breakpoint_line(f.path(), 10, None);
        assert!(!ok);
        assert!(reason.contains("out of range"), "{reason}");
        assert!(reason.contains("3 lines"), "{reason}");

        let (ok, reason) = validate_breakpoint_line(f.path(), 0, None);
        assert!(!ok);
        assert!(reason.contains("out of range"));
    }

    #[test]
    fn blank_line_rejected() {
        let f = source_file("line1\n\nline3\n");
        let (ok, reason) = validate_breakpoint_line(f.path(), 2, None);
        assert!(!ok);
        assert!(reason.contains("blank"), "{reason}");

        let f = source_file("x\n   \t\ny\n");
        assert!(!validate_breakpoint_line(f.path(), 2, None).0);
    }

    #[test]
    fn valid_line_is_ok() {
        let f = source_file("line1\n\nline3\n");
        assert_eq!(
            validate_breakpoint_line(f.path(), 3, None),
            (true, "OK".to_string())
        );
    }

    #[test]
    fn missing_file_reported() {
        let (ok, reason) =
            validate_breakpoint_line(Path::new("/definitely/not/here.py"), 1, None);
        assert!(!ok);
        assert!(reason.starts_with("File not found"), "{reason}");
    }

    #[test]
    fn adapter_patterns_flag_comments() {
        let f = source_file("def f():\n    # just a comment\n    return 1\n");
        let python = AdapterLinePatterns::builtin("python").unwrap();
        let (ok, reason) = validate_breakpoint_line(f.path(), 2, Some(&python));
        assert!(!ok);
        assert!(reason.contains("comment"), "{reason}");
        assert!(validate_breakpoint_line(f.path(), 3, Some(&python)).0);
        // Without patterns the comment line is accepted.
        assert!(validate_breakpoint_line(f.path(), 2, None).0);
    }

    #[test]
    fn java_patterns() {
        let java = AdapterLinePatterns::builtin("java").unwrap();
        assert_eq!(java.non_executable_reason("import java.util.List;"), Some("import declaration"));
        assert_eq!(java.non_executable_reason("  @Override"), Some("annotation"));
        assert_eq!(java.non_executable_reason("    }"), Some("brace-only line"));
        assert_eq!(java.non_executable_reason("    int x = 1;"), None);
    }

    #[test]
    fn configured_patterns_extend_builtins() {
        let entry = tether_config::AdapterEntry {
            adapter_id: None,
            non_executable_patterns: vec![r"^\s*pass\s*$".into()],
        };
        let patterns = AdapterLinePatterns::for_adapter("python", Some(&entry))
            .unwrap()
            .unwrap();
        assert_eq!(patterns.non_executable_reason("# c"), Some("comment"));
        assert!(patterns.non_executable_reason("    pass").is_some());

        let custom = AdapterLinePatterns::for_adapter("cobol", Some(&entry)).unwrap();
        assert!(custom.is_some());
        assert!(AdapterLinePatterns::for_adapter("cobol", None).unwrap().is_none());

        let bad = tether_config::AdapterEntry {
            adapter_id: None,
            non_executable_patterns: vec!["(".into()],
        };
        assert!(AdapterLinePatterns::for_adapter("python", Some(&bad)).is_err());
    }

    // -- hit conditions ------------------------------------------------------

    #[test]
    fn hit_condition_grammar() {
        let ok = [
            ("5", HitOperator::Count, 5),
            (">3", HitOperator::Greater, 3),
            (">=3", HitOperator::GreaterOrEqual, 3),
            ("< 4", HitOperator::Less, 4),
            ("<=4", HitOperator::LessOrEqual, 4),
            ("==2", HitOperator::Equal, 2),
            ("%2", HitOperator::Modulo, 2),
            (" >= 10 ", HitOperator::GreaterOrEqual, 10),
        ];
        for (text, op, count) in ok {
            assert_eq!(
                parse_hit_condition(text).unwrap(),
                HitCondition { op, count },
                "{text}"
            );
        }
        for bad in ["", ">", "abc", ">=x", "=>3", "%0", "-1", "3.5", ">>3"] {
            assert!(parse_hit_condition(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn hit_condition_matching() {
        let every_other = parse_hit_condition("%2").unwrap();
        assert!(!every_other.matches(1));
        assert!(every_other.matches(2));
        assert!(parse_hit_condition("3").unwrap().matches(3));
        assert!(!parse_hit_condition(">3").unwrap().matches(3));
        assert!(parse_hit_condition("==1").unwrap().matches(1));
    }

    // -- spec validation -----------------------------------------------------

    #[test]
    fn spec_requires_file_and_line() {
        assert_eq!(
            spec(json!({"line": 3})).unwrap_err(),
            BreakpointError::MissingField("file")
        );
        assert_eq!(
            spec(json!({"file": "a.py"})).unwrap_err(),
            BreakpointError::MissingField("line")
        );
    }

    #[test]
    fn spec_rejects_bad_numbers() {
        for bad in [json!(0), json!(-2), json!("7"), json!(1.5)] {
            let err = spec(json!({"file": "a.py", "line": bad})).unwrap_err();
            assert!(matches!(err, BreakpointError::InvalidField { field: "line", .. }));
        }
        let err = spec(json!({"file": "a.py", "line": 1, "column": 0})).unwrap_err();
        assert!(matches!(err, BreakpointError::InvalidField { field: "column", .. }));
    }

    #[test]
    fn spec_rejects_bad_hit_condition() {
        let err = spec(json!({"file": "a.py", "line": 1, "hit_condition": "often"})).unwrap_err();
        assert_eq!(err, BreakpointError::InvalidHitCondition("often".into()));
    }

    #[test]
    fn spec_normalizes_and_drops_unknown_fields() {
        let s = spec(json!({
            "file": "/srv//app/./lib/../main.py",
            "line": 12,
            "column": 4,
            "condition": "x > 1",
            "hit_condition": ">=2",
            "log_message": "x={x}",
            "colour": "red"
        }))
        .unwrap();
        assert_eq!(s.file, "/srv/app/main.py");
        assert_eq!(
            s,
            BreakpointSpec::new("/srv/app/main.py", 12)
                .with_column(4)
                .with_condition("x > 1")
                .with_hit_condition(">=2")
                .with_log_message("x={x}")
        );
        let value = s.to_value();
        assert!(value.get("colour").is_none());
        assert_eq!(value["hit_condition"], ">=2");
    }

    #[test]
    fn normalize_path_cases() {
        assert_eq!(normalize_path("a/./b//c"), "a/b/c");
        assert_eq!(normalize_path("a/../../b"), "../b");
        assert_eq!(normalize_path("/../x"), "/x");
        assert_eq!(normalize_path("./"), ".");
    }

    // -- batches -------------------------------------------------------------

    #[test]
    fn process_inputs_wraps_single_mapping() {
        let out = process_breakpoint_inputs(&json!({"file": "a.py", "line": 1})).unwrap();
        assert_eq!(out, vec![BreakpointSpec::new("a.py", 1)]);
    }

    #[test]
    fn process_inputs_preserves_order_and_empty() {
        let out = process_breakpoint_inputs(&json!([
            {"file": "b.py", "line": 2},
            {"file": "a.py", "line": 1}
        ]))
        .unwrap();
        assert_eq!(out[0].file, "b.py");
        assert_eq!(out[1].file, "a.py");

        assert!(process_breakpoint_inputs(&json!([])).unwrap().is_empty());
        assert!(process_breakpoint_inputs(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn process_inputs_rejects_non_mappings() {
        let err = process_breakpoint_inputs(&json!([{"file": "a.py", "line": 1}, "b.py:3"])).unwrap_err();
        assert_eq!(
            err,
            BreakpointError::NotAMapping {
                index: 1,
                found: "string"
            }
        );
        assert!(process_breakpoint_inputs(&json!(42)).is_err());
    }

    #[test]
    fn grouping_preserves_per_file_order_and_multiset() {
        let input = vec![
            BreakpointSpec::new("a.py", 10),
            BreakpointSpec::new("b.py", 5),
            BreakpointSpec::new("a.py", 2),
            BreakpointSpec::new("c.py", 1),
            BreakpointSpec::new("b.py", 1).with_condition("y"),
            BreakpointSpec::new("a.py", 7),
        ];
        let groups = group_breakpoints_by_source(&input);

        let files: Vec<&str> = groups.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(files, vec!["a.py", "b.py", "c.py"]);
        let a_lines: Vec<i64> = groups[0].1.iter().map(|b| b.line).collect();
        assert_eq!(a_lines, vec![10, 2, 7]);

        let mut flattened: Vec<BreakpointSpec> =
            groups.into_iter().flat_map(|(_, g)| g).collect();
        let mut expected = input.clone();
        let key = |b: &BreakpointSpec| (b.file.clone(), b.line);
        flattened.sort_by_key(key);
        expected.sort_by_key(key);
        assert_eq!(flattened, expected);
    }

    #[test]
    fn convert_empty_is_empty() {
        assert!(convert_breakpoints(&[]).is_empty());
    }

    #[test]
    fn convert_emits_one_request_per_file() {
        let input = vec![
            BreakpointSpec::new("/src/a.py", 3).with_hit_condition("%2"),
            BreakpointSpec::new("/src/b.py", 8),
            BreakpointSpec::new("/src/a.py", 9).with_log_message("hit"),
        ];
        let requests = convert_breakpoints(&input);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].source.path.as_deref(), Some("/src/a.py"));
        assert_eq!(requests[0].source.name.as_deref(), Some("a.py"));

        let wire = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(wire["breakpoints"][0]["line"], 3);
        assert_eq!(wire["breakpoints"][0]["hitCondition"], "%2");
        assert_eq!(wire["breakpoints"][1]["logMessage"], "hit");
    }

    #[test]
    fn check_lines_respects_toggle() {
        let f = source_file("x = 1\n\n");
        let path = f.path().to_string_lossy().into_owned();
        let batch = vec![
            BreakpointSpec::new(path.clone(), 1),
            BreakpointSpec::new(path.clone(), 2),
            BreakpointSpec::new("/nope/missing.py", 1),
        ];

        let warnings = check_breakpoint_lines(&batch, None, true);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].line, 2);
        assert!(warnings[1].reason.contains("File not found"));

        assert!(check_breakpoint_lines(&batch, None, false).is_empty());
    }
}
