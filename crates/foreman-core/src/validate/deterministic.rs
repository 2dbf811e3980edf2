//! Stage 2 — Deterministic Validation: rule-mapped file/JSON/regex checks
//! against the sandbox, with no AI call.

use std::path::Path;

use regex::Regex;

use foreman_db::model::Confidence;

/// Scan bounds: deterministic checks never read more of the sandbox than
/// this, regardless of task size.
pub const MAX_FILES_SCANNED: usize = 2000;
pub const MAX_BYTES_READ: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    FileExists(String),
    FileNotExists(String),
    DirectoryExists(String),
    JsonContains { path: String, key_path: String, value: Option<String> },
    FileCount { glob: String, min: Option<usize>, max: Option<usize> },
    GrepFound { path: String, pattern: String },
    GrepNotFound { path: String, pattern: String },
    AstHas { symbol_kind: String, name: String },
}

impl Check {
    /// HIGH for pure existence checks, MEDIUM for content/count checks.
    pub fn confidence(&self) -> Confidence {
        match self {
            Check::FileExists(_) | Check::FileNotExists(_) | Check::DirectoryExists(_) => Confidence::High,
            _ => Confidence::Medium,
        }
    }
}

pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

/// Reject regexes with nested unbounded quantifiers that risk catastrophic
/// backtracking, e.g. `(.*)+`, `(a+)+`, `(.+)*`.
pub fn is_pathological_regex(pattern: &str) -> bool {
    static SUSPECT: &[&str] = &[
        ")+", ")*", "){2,}",
    ];
    // A nested quantified group followed by another quantifier is the
    // classic pathological shape: find "(...)+"/"(...)*" where the group
    // body itself ends in a quantifier.
    let mut chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '(' {
            if let Some(close) = find_matching_paren(&chars, i) {
                let body: String = chars[i + 1..close].iter().collect();
                let trailer: String = chars[close + 1..].iter().take(2).collect();
                let outer_quantified = SUSPECT.iter().any(|s| trailer.starts_with(&s[1..]));
                let body_quantified = body.ends_with('+') || body.ends_with('*') || body.ends_with("}");
                if outer_quantified && body_quantified {
                    return true;
                }
            }
        }
        i += 1;
    }
    chars.clear();
    false
}

fn find_matching_paren(chars: &[char], open_idx: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, &c) in chars.iter().enumerate().skip(open_idx) {
        if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Map a failed acceptance criterion to an ordered list of checks via
/// keyword regex. Criteria this table cannot interpret yield no checks
/// (caller treats that as LOW confidence / defer to helper agent).
pub fn map_criterion_to_checks(criterion: &str) -> Vec<Check> {
    static FILE_EXISTS: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"(?i)\b([\w./-]+\.\w+)\s+(?:exists|is created|was created)").unwrap());
    static FILE_NOT_EXISTS: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"(?i)\b([\w./-]+\.\w+)\s+(?:does not exist|is removed|was deleted)").unwrap());
    static DIR_EXISTS: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"(?i)directory\s+([\w./-]+)\s+exists").unwrap());
    static ENDPOINT: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"(?i)(?:endpoint|route)\s+([\w/{}:-]+)\s+exists").unwrap());

    if let Some(caps) = FILE_NOT_EXISTS.captures(criterion) {
        return vec![Check::FileNotExists(caps[1].to_string())];
    }
    if let Some(caps) = FILE_EXISTS.captures(criterion) {
        return vec![Check::FileExists(caps[1].to_string())];
    }
    if let Some(caps) = DIR_EXISTS.captures(criterion) {
        return vec![Check::DirectoryExists(caps[1].to_string())];
    }
    if let Some(caps) = ENDPOINT.captures(criterion) {
        let route = caps[1].to_string();
        return vec![Check::GrepFound { path: ".".to_string(), pattern: regex::escape(&route) }];
    }
    Vec::new()
}

/// Execute one check against the sandbox, honoring scan bounds.
/// When `use_ripgrep` is set, grep-shaped checks shell out to `rg` instead
/// of the in-process regex walker.
pub fn run_check(check: &Check, sandbox_dir: &Path, use_ripgrep: bool) -> CheckResult {
    match check {
        Check::FileExists(path) => {
            let exists = sandbox_dir.join(path).is_file();
            CheckResult { passed: exists, detail: format!("file {path} exists: {exists}") }
        }
        Check::FileNotExists(path) => {
            let exists = sandbox_dir.join(path).is_file();
            CheckResult { passed: !exists, detail: format!("file {path} exists: {exists}") }
        }
        Check::DirectoryExists(path) => {
            let exists = sandbox_dir.join(path).is_dir();
            CheckResult { passed: exists, detail: format!("directory {path} exists: {exists}") }
        }
        Check::JsonContains { path, key_path, value } => run_json_contains(sandbox_dir, path, key_path, value.as_deref()),
        Check::FileCount { glob, min, max } => run_file_count(sandbox_dir, glob, *min, *max),
        Check::GrepFound { path, pattern } => run_grep(sandbox_dir, path, pattern, true, use_ripgrep),
        Check::GrepNotFound { path, pattern } => run_grep(sandbox_dir, path, pattern, false, use_ripgrep),
        Check::AstHas { symbol_kind, name } => run_ast_has_fallback(sandbox_dir, symbol_kind, name, use_ripgrep),
    }
}

fn run_json_contains(sandbox_dir: &Path, path: &str, key_path: &str, expected: Option<&str>) -> CheckResult {
    let full = sandbox_dir.join(path);
    let Ok(contents) = std::fs::read_to_string(&full) else {
        return CheckResult { passed: false, detail: format!("could not read {path}") };
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) else {
        return CheckResult { passed: false, detail: format!("{path} is not valid JSON") };
    };
    let mut current = &value;
    for segment in key_path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return CheckResult { passed: false, detail: format!("key path {key_path} not found in {path}") },
        }
    }
    let passed = match expected {
        Some(expected) => current.as_str() == Some(expected) || *current == expected,
        None => true,
    };
    CheckResult { passed, detail: format!("{path}:{key_path} = {current}") }
}

fn run_file_count(sandbox_dir: &Path, glob: &str, min: Option<usize>, max: Option<usize>) -> CheckResult {
    let pattern = Regex::new(&glob_to_regex(glob)).unwrap_or_else(|_| Regex::new("$^").unwrap());
    let mut count = 0;
    let mut scanned = 0;
    let mut bytes_read: u64 = 0;
    for entry in walk_bounded(sandbox_dir, &mut scanned, &mut bytes_read) {
        if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
            if pattern.is_match(name) {
                count += 1;
            }
        }
    }
    let passed = min.is_none_or(|m| count >= m) && max.is_none_or(|m| count <= m);
    CheckResult { passed, detail: format!("matched {count} files against {glob}") }
}

fn run_grep(sandbox_dir: &Path, path: &str, pattern: &str, expect_found: bool, use_ripgrep: bool) -> CheckResult {
    if is_pathological_regex(pattern) {
        return CheckResult { passed: false, detail: "rejected pathological regex".to_string() };
    }
    if use_ripgrep {
        if let Some(result) = run_grep_ripgrep(sandbox_dir, path, pattern, expect_found) {
            return result;
        }
    }

    let Ok(re) = Regex::new(pattern) else {
        return CheckResult { passed: false, detail: format!("invalid regex: {pattern}") };
    };
    let search_root = sandbox_dir.join(path);
    let mut scanned = 0;
    let mut bytes_read: u64 = 0;
    let mut found = false;
    for entry in walk_bounded(&search_root, &mut scanned, &mut bytes_read) {
        if !entry.is_file() {
            continue;
        }
        if bytes_read >= MAX_BYTES_READ {
            break;
        }
        if let Ok(contents) = std::fs::read_to_string(&entry) {
            bytes_read += contents.len() as u64;
            if re.is_match(&contents) {
                found = true;
                break;
            }
        }
    }
    let passed = found == expect_found;
    CheckResult { passed, detail: format!("pattern {pattern} found: {found}") }
}

/// Shell out to `rg` for the grep check. Returns `None` when `rg` cannot be
/// spawned at all (not installed), so the caller falls back to the regex
/// walker rather than failing the check outright.
fn run_grep_ripgrep(sandbox_dir: &Path, path: &str, pattern: &str, expect_found: bool) -> Option<CheckResult> {
    let search_root = sandbox_dir.join(path);
    let output = std::process::Command::new("rg").arg("--quiet").arg("--regexp").arg(pattern).arg(&search_root).output().ok()?;
    let found = output.status.success();
    let passed = found == expect_found;
    Some(CheckResult { passed, detail: format!("rg pattern {pattern} found: {found}") })
}

fn run_ast_has_fallback(sandbox_dir: &Path, symbol_kind: &str, name: &str, use_ripgrep: bool) -> CheckResult {
    // Non-JS/TS languages (and this port, lacking an AST adapter) fall
    // back to a regex keyed on the symbol kind.
    let pattern = match symbol_kind {
        "function" => format!(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+{}\b", regex::escape(name)),
        "class" => format!(r"(?m)^\s*(?:export\s+)?class\s+{}\b", regex::escape(name)),
        _ => format!(r"\b{}\b", regex::escape(name)),
    };
    run_grep(sandbox_dir, ".", &pattern, true, use_ripgrep)
}

fn walk_bounded(root: &Path, scanned: &mut usize, _bytes_read: &mut u64) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if *scanned >= MAX_FILES_SCANNED {
            break;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            if *scanned >= MAX_FILES_SCANNED {
                break;
            }
            let path = entry.path();
            *scanned += 1;
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' => out.push_str("\\."),
            other => out.push(other),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_nested_unbounded_quantifiers() {
        assert!(is_pathological_regex("(a+)+"));
        assert!(is_pathological_regex("(.*)+"));
    }

    #[test]
    fn accepts_ordinary_regex() {
        assert!(!is_pathological_regex(r"^\d{3}-\d{4}$"));
        assert!(!is_pathological_regex("package.json"));
    }

    #[test]
    fn maps_file_exists_criterion() {
        let checks = map_criterion_to_checks("package.json exists");
        assert_eq!(checks, vec![Check::FileExists("package.json".to_string())]);
    }

    #[test]
    fn maps_unrecognized_criterion_to_no_checks() {
        let checks = map_criterion_to_checks("the code is elegant");
        assert!(checks.is_empty());
    }

    #[test]
    fn file_exists_check_runs_against_sandbox() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let result = run_check(&Check::FileExists("package.json".to_string()), dir.path(), false);
        assert!(result.passed);
    }

    #[test]
    fn file_exists_check_fails_when_missing() {
        let dir = tempdir().unwrap();
        let result = run_check(&Check::FileExists("package.json".to_string()), dir.path(), false);
        assert!(!result.passed);
    }

    #[test]
    fn grep_found_matches_content_in_sandbox() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/routes.rs"), "GET /api/users").unwrap();
        let result = run_check(&Check::GrepFound { path: ".".to_string(), pattern: "/api/users".to_string() }, dir.path(), false);
        assert!(result.passed);
    }

    #[test]
    fn grep_found_rejects_pathological_pattern() {
        let dir = tempdir().unwrap();
        let result = run_check(&Check::GrepFound { path: ".".to_string(), pattern: "(a+)+".to_string() }, dir.path(), false);
        assert!(!result.passed);
    }

    #[test]
    fn json_contains_checks_nested_key() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"name": "demo"}"#).unwrap();
        let result = run_check(
            &Check::JsonContains { path: "package.json".to_string(), key_path: "name".to_string(), value: Some("demo".to_string()) },
            dir.path(),
            false,
        );
        assert!(result.passed);
    }

    #[test]
    fn grep_found_matches_via_ripgrep_when_enabled() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/routes.rs"), "GET /api/users").unwrap();
        let result = run_check(&Check::GrepFound { path: ".".to_string(), pattern: "/api/users".to_string() }, dir.path(), true);
        assert!(result.passed);
    }

    #[test]
    fn check_confidence_matches_spec_tiers() {
        assert_eq!(Check::FileExists("x".into()).confidence(), Confidence::High);
        assert_eq!(Check::GrepFound { path: ".".into(), pattern: "x".into() }.confidence(), Confidence::Medium);
    }
}
