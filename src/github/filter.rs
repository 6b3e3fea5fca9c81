/// Substrings that mark a path as generated, vendored, binary or editor noise
const EXCLUDED_PATTERNS: &[&str] = &[
    // Dependencies
    "node_modules/", "vendor/", "venv/",
    // Compiled files
    ".min.", ".pyc", ".pyo", ".pyd", ".so", ".dll", ".class",
    // Asset files
    ".jpg", ".jpeg", ".png", ".gif", ".ico", ".svg", ".ttf", ".woff", ".webp",
    // Cache and temporary files
    "__pycache__/", ".cache/", ".tmp/",
    // Lock files and logs
    "yarn.lock", "poetry.lock", ".log",
    // Editor configuration
    ".vscode/", ".idea/",
];

/// Returns `true` when a repository path is worth showing to the model
pub fn should_include_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    !EXCLUDED_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Filters a raw tree listing, preserving order
pub fn filter_tree<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    paths
        .into_iter()
        .map(Into::into)
        .filter(|p| should_include_path(p))
        .collect()
}
