//! Session configuration.
//!
//! Constructed once per editor session and injected into the store; nothing
//! here is a process-wide singleton.

/// Knobs for the editor session.
#[derive(Debug, Clone)]
pub struct WorkbenchConfig {
    /// Extension for tag/variable code files.
    pub code_extension: String,
    /// Code body given to newly created tags.
    pub default_tag_code: String,
    /// Code body given to newly created variables.
    pub default_variable_code: String,
    /// Container usage contexts the editor supports; containers outside this
    /// list are filtered from pickers.
    pub usage_contexts: Vec<String>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            code_extension: "js".to_string(),
            default_tag_code: "<script>\n</script>".to_string(),
            default_variable_code: "function() { return undefined; }".to_string(),
            usage_contexts: vec!["web".to_string(), "server".to_string()],
        }
    }
}

impl WorkbenchConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// Recognized variables:
    /// - `TAG_WORKBENCH_CODE_EXT`: code file extension (without the dot)
    /// - `TAG_WORKBENCH_USAGE_CONTEXTS`: comma-separated usage contexts
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injected variable
    /// lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ext) = lookup("TAG_WORKBENCH_CODE_EXT") {
            let ext = ext.trim().trim_start_matches('.').to_string();
            if !ext.is_empty() {
                config.code_extension = ext;
            }
        }
        if let Some(contexts) = lookup("TAG_WORKBENCH_USAGE_CONTEXTS") {
            let parsed = parse_contexts(&contexts);
            if !parsed.is_empty() {
                config.usage_contexts = parsed;
            }
        }
        config
    }

    /// Whether a container's usage context is one the editor supports.
    pub fn supports_usage_context(&self, usage_context: &[String]) -> bool {
        usage_context
            .iter()
            .any(|ctx| self.usage_contexts.iter().any(|s| s.eq_ignore_ascii_case(ctx)))
    }
}

fn parse_contexts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
