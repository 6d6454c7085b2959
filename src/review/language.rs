// Language detection from file extensions

static LANGUAGE_MAP: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("dart", "dart"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("rs", "rust"),
    ("rb", "ruby"),
    ("php", "php"),
    ("c", "c"),
    ("cpp", "cpp"),
    ("cs", "csharp"),
    ("swift", "swift"),
];

/// Detect the programming language from a file extension.
pub fn detect_language(filepath: &str) -> Option<&'static str> {
    let ext = filepath.rsplit('.').next()?.to_lowercase();
    if ext == filepath.to_lowercase() {
        // No '.' in the path at all.
        return None;
    }
    LANGUAGE_MAP
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
}
