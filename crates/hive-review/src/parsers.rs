//! Format-specific parsers for validator output, one per tool family:
//! test runner, linter, type checker.

use hive_core::types::{ParsedError, Severity};

/// Lint codes that mechanical fixers handle reliably.
const AUTO_FIXABLE_CODES: &[&str] = &["F401", "W291", "W292", "W293", "E303"];

pub fn is_auto_fixable(code: &str) -> bool {
    AUTO_FIXABLE_CODES.contains(&code)
}

/// Extracts [`ParsedError`]s from raw validator output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAnalyzer;

impl ErrorAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Run every tool-family parser over the output and concatenate.
    pub fn analyze(&self, output: &str) -> Vec<ParsedError> {
        let mut errors = self.parse_test_output(output);
        errors.extend(self.parse_lint_output(output));
        errors.extend(self.parse_typecheck_output(output));
        errors
    }

    /// Only the errors a fixer is allowed to touch.
    pub fn fixable(&self, errors: &[ParsedError]) -> Vec<ParsedError> {
        errors.iter().filter(|e| e.auto_fixable).cloned().collect()
    }

    /// Test-runner failures: `FAILED path::test_name - Message` and
    /// collection errors `ERROR path - Message`.
    pub fn parse_test_output(&self, output: &str) -> Vec<ParsedError> {
        let mut errors = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            let (code, rest) = if let Some(rest) = line.strip_prefix("FAILED ") {
                ("test-failure", rest)
            } else if let Some(rest) = line.strip_prefix("ERROR ") {
                ("test-error", rest)
            } else {
                continue;
            };

            let (location, message) = match rest.split_once(" - ") {
                Some((loc, msg)) => (loc, msg),
                None => (rest, ""),
            };
            let file_path = location.split("::").next().unwrap_or(location);
            errors.push(ParsedError {
                file_path: file_path.to_string(),
                line: 0,
                error_code: code.to_string(),
                error_message: message.to_string(),
                severity: Severity::Error,
                // Test failures need debugging, not mechanical fixes.
                auto_fixable: false,
            });
        }
        errors
    }

    /// Linter diagnostics: `path:line:col: CODE message`.
    pub fn parse_lint_output(&self, output: &str) -> Vec<ParsedError> {
        let mut errors = Vec::new();
        for line in output.lines() {
            let Some(err) = parse_lint_line(line.trim()) else {
                continue;
            };
            errors.push(err);
        }
        errors
    }

    /// Type-checker diagnostics: `path:line: error: message [code]`.
    pub fn parse_typecheck_output(&self, output: &str) -> Vec<ParsedError> {
        let mut errors = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            let Some((location, rest)) = line.split_once(": error: ") else {
                continue;
            };
            let mut parts = location.rsplitn(2, ':');
            let line_no = parts.next().and_then(|n| n.parse::<u32>().ok());
            let file_path = parts.next();
            let (Some(line_no), Some(file_path)) = (line_no, file_path) else {
                continue;
            };

            let (message, code) = match rest.rfind(" [") {
                Some(idx) if rest.ends_with(']') => {
                    (&rest[..idx], rest[idx + 2..rest.len() - 1].to_string())
                }
                _ => (rest, "type-error".to_string()),
            };
            errors.push(ParsedError {
                file_path: file_path.to_string(),
                line: line_no,
                error_code: code,
                error_message: message.to_string(),
                severity: Severity::Error,
                auto_fixable: false,
            });
        }
        errors
    }
}

fn parse_lint_line(line: &str) -> Option<ParsedError> {
    // path:line:col: CODE message  (column is optional)
    let mut segments = line.splitn(4, ':');
    let file_path = segments.next()?.trim();
    if file_path.is_empty() || file_path.contains(' ') {
        return None;
    }
    let line_no: u32 = segments.next()?.trim().parse().ok()?;

    let third = segments.next()?.trim();
    let tail = segments.next().unwrap_or("").trim();
    let diagnostic = if third.parse::<u32>().is_ok() {
        tail
    } else if tail.is_empty() {
        third
    } else {
        // No column: the third segment starts the diagnostic.
        return build_lint_error(file_path, line_no, &format!("{third}:{tail}"));
    };

    build_lint_error(file_path, line_no, diagnostic)
}

fn build_lint_error(file_path: &str, line_no: u32, diagnostic: &str) -> Option<ParsedError> {
    let (code, message) = diagnostic.split_once(' ')?;
    if code.is_empty() || !code.chars().next()?.is_ascii_uppercase() {
        return None;
    }
    let severity = if code.starts_with('S') {
        Severity::Critical
    } else if code.starts_with('W') {
        Severity::Warn
    } else {
        Severity::Error
    };
    Some(ParsedError {
        file_path: file_path.to_string(),
        line: line_no,
        error_code: code.to_string(),
        error_message: message.trim().to_string(),
        severity,
        auto_fixable: is_auto_fixable(code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lint_lines_with_and_without_column() {
        let analyzer = ErrorAnalyzer::new();
        let output = "\
            src/app.py:12:80: E501 line too long (88 > 79)\n\
            src/app.py:3:1: F401 'os' imported but unused\n\
            src/util.py:7: W291 trailing whitespace\n\
            not a diagnostic line\n";
        let errors = analyzer.parse_lint_output(output);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].error_code, "E501");
        assert_eq!(errors[0].line, 12);
        assert!(!errors[0].auto_fixable);
        assert_eq!(errors[1].error_code, "F401");
        assert!(errors[1].auto_fixable);
        assert_eq!(errors[2].file_path, "src/util.py");
        assert_eq!(errors[2].severity, Severity::Warn);
    }

    #[test]
    fn parses_test_failures() {
        let analyzer = ErrorAnalyzer::new();
        let output = "\
            FAILED tests/test_api.py::test_health - AssertionError: 404 != 200\n\
            ERROR tests/test_db.py - ImportError: cannot import name 'pool'\n";
        let errors = analyzer.parse_test_output(output);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].file_path, "tests/test_api.py");
        assert_eq!(errors[0].error_code, "test-failure");
        assert!(!errors[0].auto_fixable);
        assert_eq!(errors[1].error_code, "test-error");
    }

    #[test]
    fn parses_typecheck_lines() {
        let analyzer = ErrorAnalyzer::new();
        let output = "src/app.py:42: error: Incompatible return value type [return-value]\n";
        let errors = analyzer.parse_typecheck_output(output);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 42);
        assert_eq!(errors[0].error_code, "return-value");
    }

    #[test]
    fn security_codes_are_critical() {
        let analyzer = ErrorAnalyzer::new();
        let errors =
            analyzer.parse_lint_output("src/auth.py:10:5: S105 hardcoded password string\n");
        assert_eq!(errors[0].severity, Severity::Critical);
    }

    #[test]
    fn fixable_filter_keeps_only_mechanical_errors() {
        let analyzer = ErrorAnalyzer::new();
        let output = "\
            src/app.py:3:1: F401 'os' imported but unused\n\
            src/app.py:12:80: E501 line too long\n";
        let errors = analyzer.analyze(output);
        let fixable = analyzer.fixable(&errors);
        assert_eq!(fixable.len(), 1);
        assert_eq!(fixable[0].error_code, "F401");
    }
}
