use thiserror::Error;
use vulkanalia::prelude::v1_0::*;

/// Failure categories of the renderer.
///
/// Surface staleness (out-of-date / suboptimal) is deliberately not part of
/// this taxonomy; it is reported through `swapchain::SurfaceStatus` and
/// handled by recreation rather than propagated as an error.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Any creation-time failure. Halts startup.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A layout transition outside the closed table in `upload`. The request
    /// performs no GPU work.
    #[error("unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// A mid-frame submission or presentation failure that is not surface
    /// staleness. Forward progress cannot be guaranteed; the frame loop must
    /// stop.
    #[error("fatal submission failure: {0}")]
    FatalSubmission(vk::ErrorCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_transition_names_both_layouts() {
        let err = RenderError::UnsupportedTransition {
            old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        };
        let message = err.to_string();
        assert!(message.contains("SHADER_READ_ONLY_OPTIMAL"));
        assert!(message.contains("TRANSFER_DST_OPTIMAL"));
    }
}
