use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories whose Rust sources are held to the lint rules.
const SCANNED_DIRECTORIES: [&str; 2] = ["src", "tests"];

// One forbidden construct: what to look for and what to tell the author.
struct Rule {
    label: &'static str,
    pattern: &'static str,
    advice: &'static str,
}

const RULES: [Rule; 3] = [
    Rule {
        label: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        advice: "Either use the code (removing the attribute) or remove it completely.",
    },
    Rule {
        label: "#[ignore] test attributes",
        pattern: r"#\s*\[\s*ignore\b",
        advice: "Fix the test so it can run properly without being ignored.",
    },
    Rule {
        label: "debug_assert! macros",
        pattern: r"\bdebug_assert(_eq|_ne)?\s*!",
        advice: "Return an error or use assert! so the check also holds in release builds.",
    },
];

// Collects every matching line of a single file.
struct ViolationCollector {
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(file_path: &Path) -> Self {
        Self {
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self, rule: &Rule) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            rule.label,
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {} are forbidden in this crate.\n", rule.label));
        error_msg.push_str(&format!("   {}\n", rule.advice));
        Some(error_msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SCANNED_DIRECTORIES
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan(rule: &Rule, files: &[PathBuf]) -> Vec<String> {
    let matcher = match RegexMatcher::new_line_matcher(rule.pattern) {
        Ok(matcher) => matcher,
        Err(e) => return vec![format!("Error creating regex matcher for {}: {e}", rule.label)],
    };

    let mut searcher = Searcher::new();
    let mut all_violations = Vec::new();
    for path in files {
        let mut collector = ViolationCollector::new(path);
        if searcher.search_path(&matcher, path, &mut collector).is_err() {
            continue;
        }
        if let Some(error_message) = collector.check_and_get_error_message(rule) {
            all_violations.push(error_message);
        }
    }
    all_violations
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SCANNED_DIRECTORIES {
        println!("cargo:rerun-if-changed={dir}");
    }

    if std::env::var("NEWTON_SOLVERS_SKIP_LINT_CHECKS").is_ok() || std::env::var("DOCS_RS").is_ok() {
        return;
    }

    let files = rust_sources();
    let all_violations: Vec<String> = RULES.iter().flat_map(|rule| scan(rule, &files)).collect();

    if !all_violations.is_empty() {
        eprintln!("\n❌ VALIDATION ERRORS");
        eprintln!("====================");
        let violation_count = all_violations.len();
        for violation in all_violations {
            eprintln!("{violation}");
            eprintln!("--------------------");
        }
        eprintln!(
            "\n⚠️ Found {violation_count} total code quality violations. Fix all issues before committing."
        );
        std::process::exit(1);
    }
}
