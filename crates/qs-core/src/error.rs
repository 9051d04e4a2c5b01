use crate::types::SourceSpan;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{}", self.headline())]
pub struct ScriptLangError {
    pub code: String,
    pub message: String,
    pub span: Option<SourceSpan>,
    /// Identity of the script the error was raised in, when known.
    pub script: Option<String>,
    /// Rendered call-stack frames, innermost first.
    pub trace: Vec<String>,
}

impl ScriptLangError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: None,
            script: None,
            trace: Vec::new(),
        }
    }

    pub fn with_span(
        code: impl Into<String>,
        message: impl Into<String>,
        span: SourceSpan,
    ) -> Self {
        Self {
            span: Some(span),
            ..Self::new(code, message)
        }
    }

    /// Attaches a location unless one is already present.
    pub fn at(mut self, span: &SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }

    pub fn in_script(mut self, script: &str) -> Self {
        if self.script.is_none() {
            self.script = Some(script.to_string());
        }
        self
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        if self.trace.is_empty() {
            self.trace = trace;
        }
        self
    }

    /// `script:line:column: CODE: message`, omitting whatever is unknown.
    pub fn headline(&self) -> String {
        let mut out = String::new();
        if let Some(script) = &self.script {
            out.push_str(script);
            out.push(':');
        }
        if let Some(span) = &self.span {
            out.push_str(&format!("{}:{}:", span.start.line, span.start.column));
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("{}: {}", self.code, self.message));
        out
    }

    /// The headline followed by one `at` line per call-stack frame.
    pub fn diagnostic(&self) -> String {
        let mut out = self.headline();
        for frame in &self.trace {
            out.push_str("\n    at ");
            out.push_str(frame);
        }
        out
    }
}
