//! Error types for the SVO builder

use std::fmt;

use glam::UVec3;
use thiserror::Error;

/// Stage of a single chunk build, used to report where a build failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Reset,
    FragmentList,
    Readback,
    Octree,
    Allocate,
    Commit,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Reset => "reset",
            BuildStage::FragmentList => "fragment list creation",
            BuildStage::Readback => "size readback",
            BuildStage::Octree => "octree creation",
            BuildStage::Allocate => "arena allocation",
            BuildStage::Commit => "arena commit",
        };
        f.write_str(name)
    }
}

/// Main error type for the builder
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Device wait failed: {0}")]
    DeviceWait(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Arena capacity exceeded: requested {requested} bytes, {available} of {capacity} bytes available")]
    Capacity {
        requested: u64,
        available: u64,
        capacity: u64,
    },

    #[error("Address out of range: {0}")]
    AddressRange(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Chunk {chunk} failed during {stage}: {source}")]
    Chunk {
        chunk: UVec3,
        stage: BuildStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the chunk index and build stage to an error raised inside the chunk loop
    pub fn in_chunk(self, chunk: UVec3, stage: BuildStage) -> Self {
        Error::Chunk {
            chunk,
            stage,
            source: Box::new(self),
        }
    }

    /// Returns true if this error (or the error it wraps) is an arena capacity failure
    pub fn is_capacity(&self) -> bool {
        match self {
            Error::Capacity { .. } => true,
            Error::Chunk { source, .. } => source.is_capacity(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_error_message() {
        let err = Error::Capacity {
            requested: 30,
            available: 20,
            capacity: 100,
        }
        .in_chunk(UVec3::new(1, 0, 2), BuildStage::Allocate);

        let msg = err.to_string();
        assert!(msg.contains("[1, 0, 2]"), "{}", msg);
        assert!(msg.contains("arena allocation"), "{}", msg);
        assert!(msg.contains("requested 30 bytes"), "{}", msg);
        assert!(err.is_capacity());
    }

    #[test]
    fn test_non_capacity_error() {
        let err = Error::Gpu("lost".into()).in_chunk(UVec3::ZERO, BuildStage::Octree);
        assert!(!err.is_capacity());
    }
}
