//! Image layout transitions.
//!
//! Only the layout pairs the upload and mip paths need are supported. Any
//! other pair is rejected with [`RhiError::UnsupportedTransition`] rather
//! than approximated with a conservative barrier.
//!
//! | old | new | stages |
//! |-----|-----|--------|
//! | UNDEFINED | TRANSFER_DST | top of pipe -> transfer |
//! | TRANSFER_DST | SHADER_READ_ONLY | transfer -> fragment shader |
//! | TRANSFER_DST | TRANSFER_SRC | transfer -> transfer |
//! | TRANSFER_SRC | TRANSFER_DST | transfer -> transfer |
//! | TRANSFER_SRC | SHADER_READ_ONLY | transfer -> fragment shader |

use ash::vk;

use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};

/// Access masks and stages for one supported transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Looks up the barrier parameters for `old -> new`.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::TRANSFER_READ, S::TRANSFER, S::TRANSFER)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => {
            (A::TRANSFER_READ, A::TRANSFER_WRITE, S::TRANSFER, S::TRANSFER)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_READ, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        _ => return Err(RhiError::UnsupportedTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    })
}

/// Records a barrier moving `range` of `image` from `old` to `new`.
///
/// Nothing is recorded when the pair is unsupported.
pub fn record_transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let masks = transition_masks(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use vk::ImageLayout as L;

    #[test]
    fn test_upload_transitions() {
        let to_dst = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_read =
            transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_mip_transitions_both_directions() {
        let forward = transition_masks(L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        let back = transition_masks(L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(forward.src_access, back.dst_access);
        assert_eq!(forward.dst_access, back.src_access);
        assert_eq!(forward.src_stage, vk::PipelineStageFlags::TRANSFER);

        let done = transition_masks(L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(done.src_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(done.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_shader_read_to_undefined_rejected() {
        let result = transition_masks(L::SHADER_READ_ONLY_OPTIMAL, L::UNDEFINED);
        match result {
            Err(RhiError::UnsupportedTransition { old, new }) => {
                assert_eq!(old, L::SHADER_READ_ONLY_OPTIMAL);
                assert_eq!(new, L::UNDEFINED);
            }
            other => panic!("expected UnsupportedTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_set_rejects_everything_else() {
        let layouts = [
            L::UNDEFINED,
            L::GENERAL,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            L::TRANSFER_SRC_OPTIMAL,
            L::TRANSFER_DST_OPTIMAL,
            L::PRESENT_SRC_KHR,
        ];
        let supported = [
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
            (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
            (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
        ];

        for old in layouts {
            for new in layouts {
                let ok = transition_masks(old, new).is_ok();
                assert_eq!(ok, supported.contains(&(old, new)), "{:?} -> {:?}", old, new);
            }
        }
    }
}
