use thiserror::Error;

/// Fatal scene-compilation failures. All of these are raised while the
/// acceleration structure is being built, before anything reaches the
/// device.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("scene has no attached shapes")]
    EmptyScene,

    #[error("mesh has no triangles")]
    EmptyMesh,

    #[error("expected {expected} {kind} nodes, built {actual}")]
    NodeCountMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}
