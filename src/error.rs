use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentationError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Segment {segment_index} already exists in segmentation {segmentation_id}")]
    Conflict {
        segmentation_id: String,
        segment_index: u32,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

impl SegmentationError {
    pub(crate) fn segmentation_not_found(segmentation_id: &str) -> Self {
        Self::NotFound {
            kind: "Segmentation",
            id: segmentation_id.to_owned(),
        }
    }

    pub(crate) fn segment_not_found(segmentation_id: &str, segment_index: u32) -> Self {
        Self::NotFound {
            kind: "Segment",
            id: format!("{segmentation_id}/{segment_index}"),
        }
    }

    pub(crate) fn volume_not_found(volume_id: &str) -> Self {
        Self::NotFound {
            kind: "Volume",
            id: volume_id.to_owned(),
        }
    }

    pub(crate) fn background_index() -> Self {
        Self::InvalidArgument("segment index 0 is reserved for background".to_owned())
    }

    pub(crate) fn segment_index_out_of_range(segment_index: u32) -> Self {
        Self::InvalidArgument(format!(
            "segment index {segment_index} exceeds {}",
            crate::segmentation::MAX_SEGMENT_INDEX
        ))
    }
}
