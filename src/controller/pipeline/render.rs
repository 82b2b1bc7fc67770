//! # Directive Rendering
//!
//! Pipeline manifests may carry activation directives as YAML comments:
//!
//! ```yaml
//! #Kabanero! on activate substitute StackId for text 'my-stack'
//! metadata:
//!   name: my-stack-build-task
//! ```
//!
//! Every later occurrence of the quoted text in the same file is replaced by
//! the value of the named key in the [`RenderContext`].

use super::error::PipelineError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const DIGEST_KEY: &str = "Digest";
pub const STACK_NAME_KEY: &str = "StackName";
pub const STACK_ID_KEY: &str = "StackId";

/// Key/value substitutions available to pipeline templates
pub type RenderContext = BTreeMap<String, String>;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*Kabanero!\s+on\s+activate\s+substitute\s+([A-Za-z0-9_.]+)\s+for\s+text\s+'([^']*)'\s*$")
        .expect("directive regex is valid")
});

/// Directive marker, used to report lines that look like directives but do not parse
const DIRECTIVE_MARKER: &str = "Kabanero!";

/// Turns raw manifest bytes into rendered manifest bytes
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    fn render(&self, raw: &[u8], context: &RenderContext) -> Result<Vec<u8>, PipelineError>;
}

/// Renderer understanding `#Kabanero! on activate substitute` directives
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectiveRenderer;

impl Renderer for DirectiveRenderer {
    fn render(&self, raw: &[u8], context: &RenderContext) -> Result<Vec<u8>, PipelineError> {
        let text = std::str::from_utf8(raw).map_err(|e| PipelineError::Render {
            file: String::new(),
            message: format!("manifest is not valid UTF-8: {e}"),
        })?;

        let mut substitutions: Vec<(String, String)> = Vec::new();
        let mut out = String::with_capacity(text.len());

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if let Some(caps) = DIRECTIVE.captures(trimmed) {
                let key = &caps[1];
                let pattern = &caps[2];
                let value = context.get(key).ok_or_else(|| PipelineError::Render {
                    file: String::new(),
                    message: format!("directive references unknown key {key}"),
                })?;
                if !pattern.is_empty() {
                    substitutions.push((pattern.to_string(), value.clone()));
                }
                out.push_str(line);
                continue;
            }
            if trimmed.trim_start().starts_with('#') && trimmed.contains(DIRECTIVE_MARKER) {
                return Err(PipelineError::Render {
                    file: String::new(),
                    message: format!("malformed directive: {}", trimmed.trim()),
                });
            }

            let mut rendered = line.to_string();
            for (pattern, value) in &substitutions {
                rendered = rendered.replace(pattern.as_str(), value);
            }
            out.push_str(&rendered);
        }

        Ok(out.into_bytes())
    }
}
