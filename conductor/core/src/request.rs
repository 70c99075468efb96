//! Generation Requests
//!
//! A [`GenerationRequest`] is built once with the `with_*` builder methods
//! and never mutated after it is handed to the orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// How live text is delivered to the caller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Forward every delta as it arrives
    #[default]
    Stream,
    /// Return only the final text
    Sync,
}

/// Shape of recognized document text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    /// Page markdown kept verbatim
    #[default]
    Markdown,
    /// Markup flattened to prose
    Text,
}

/// What a request produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ArtifactKind {
    /// Markdown mind map from a single chat completion
    MindMap,
    /// Slide deck from the multi-step presentation provider
    Presentation,
    /// Text extracted from a document by the OCR provider
    RecognizedText {
        /// Output shape
        mode: ResultMode,
    },
}

impl ArtifactKind {
    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::MindMap => "mindmap",
            Self::Presentation => "presentation",
            Self::RecognizedText { .. } => "recognized_text",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference material attached to a request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDocument {
    /// Publicly reachable document URL
    Url(String),
    /// Plain text supplied by the caller
    Inline(String),
}

impl SourceDocument {
    /// Whether the source carries no usable content
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Url(s) | Self::Inline(s) => s.trim().is_empty(),
        }
    }
}

/// One generation request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    kind: ArtifactKind,
    topic: String,
    mode: ExecutionMode,
    source: Option<SourceDocument>,
    principal: String,
    extra_prompt: Option<String>,
    resolve_download: bool,
    archive: bool,
    #[serde(default)]
    direct: bool,
}

impl GenerationRequest {
    /// Create a request with default options
    pub fn new(kind: ArtifactKind, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            mode: ExecutionMode::default(),
            source: None,
            principal: String::new(),
            extra_prompt: None,
            resolve_download: true,
            archive: false,
            direct: false,
        }
    }

    /// Mind-map request
    pub fn mind_map(topic: impl Into<String>) -> Self {
        Self::new(ArtifactKind::MindMap, topic)
    }

    /// Presentation request
    pub fn presentation(topic: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Presentation, topic)
    }

    /// Document recognition request
    pub fn recognize(source_url: impl Into<String>, mode: ResultMode) -> Self {
        Self::new(ArtifactKind::RecognizedText { mode }, String::new())
            .with_source(SourceDocument::Url(source_url.into()))
    }

    /// Set execution mode
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach a source document
    #[must_use]
    pub fn with_source(mut self, source: SourceDocument) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the principal credentials are issued for
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    /// Add instructions appended to provider prompts
    #[must_use]
    pub fn with_extra_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.extra_prompt = Some(prompt.into());
        self
    }

    /// Whether to resolve a download URL for the produced file
    #[must_use]
    pub fn with_resolve_download(mut self, resolve: bool) -> Self {
        self.resolve_download = resolve;
        self
    }

    /// Whether to copy the produced file into the file store
    #[must_use]
    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    /// Whether a presentation is produced by one provider call instead of
    /// separate outline, content and render steps
    #[must_use]
    pub fn with_direct_generation(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Artifact kind
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Prompt text
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Execution mode
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Source document, if any
    #[must_use]
    pub fn source(&self) -> Option<&SourceDocument> {
        self.source.as_ref()
    }

    /// Principal identifier
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Extra prompt, if any
    #[must_use]
    pub fn extra_prompt(&self) -> Option<&str> {
        self.extra_prompt.as_deref()
    }

    /// Whether download resolution is requested
    #[must_use]
    pub fn resolve_download(&self) -> bool {
        self.resolve_download
    }

    /// Whether archiving is requested
    #[must_use]
    pub fn archive(&self) -> bool {
        self.archive
    }

    /// Whether one-call presentation generation is requested
    #[must_use]
    pub fn direct_generation(&self) -> bool {
        self.direct
    }

    /// Reject requests that cannot succeed before any network call
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Validation`] for a blank principal, a blank
    /// topic (presentations may instead carry a source), or a recognition
    /// request without a usable source.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.principal.trim().is_empty() {
            return Err(GenerationError::validation("principal is required"));
        }
        let blank_source = self.source.as_ref().map_or(true, SourceDocument::is_blank);
        match self.kind {
            ArtifactKind::MindMap if self.topic.trim().is_empty() => {
                Err(GenerationError::validation("topic is required"))
            }
            ArtifactKind::Presentation if self.topic.trim().is_empty() && blank_source => Err(
                GenerationError::validation("topic or source document is required"),
            ),
            ArtifactKind::RecognizedText { .. } if blank_source => {
                Err(GenerationError::validation("source document is required"))
            }
            _ => Ok(()),
        }
    }
}
