//! Error types for include normalization, serializer resolution, and rendering.

use thiserror::Error;

/// Errors while normalizing an include request into a canonical tree.
#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("unrecognized include value: expected string, array, or object, got {actual}")]
    Malformed { actual: String },

    #[error("empty relation name in include path {path:?}")]
    EmptyName { path: String },
}

/// Errors while resolving a serializer for a tag, model, or record.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no serializer registered for type tag {tag:?}")]
    UnknownTag { tag: String },

    #[error("no serializer found for model {model:?} or any of its ancestors")]
    UnknownModel { model: String },

    #[error("cannot resolve a serializer for an empty collection")]
    EmptyCollection,
}

/// Errors while rendering a document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("a document cannot contain both data and errors")]
    DataWithErrors,

    #[error("relationship {name:?} not found on serializer {type_tag:?}")]
    UnknownRelationship { name: String, type_tag: String },

    #[error("belongs_to relationship {name:?} on model {model:?} declares no foreign key")]
    MissingForeignKey { name: String, model: String },

    #[error(
        "polymorphic relationship {name:?} on model {model:?}: \
         discriminator field {field:?} is {actual}, expected a string"
    )]
    MissingDiscriminator {
        name: String,
        model: String,
        field: String,
        actual: String,
    },

    #[error(transparent)]
    Include(#[from] IncludeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl RenderError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        // All render errors are configuration or contract errors
        2
    }
}

/// Errors while loading a manifest file.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to read manifest {path}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest is not valid JSON")]
    InvalidJson {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid manifest: {message}")]
    Invalid { message: String },
}

impl ManifestError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. } | Self::ReadError { .. } => 3,
            Self::InvalidJson { .. } | Self::Invalid { .. } => 2,
        }
    }
}
