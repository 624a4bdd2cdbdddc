//! Mip chain generation by successive linear blits.

use ash::vk;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, subresource_range};
use crate::layout::record_transition;

/// Next mip dimension, never below 1.
#[inline]
pub fn next_mip_dimension(dimension: i32) -> i32 {
    (dimension / 2).max(1)
}

/// Extents of every mip level, level 0 first.
pub fn mip_extents(width: u32, height: u32, mip_levels: u32) -> Vec<(i32, i32)> {
    let mut extents = Vec::with_capacity(mip_levels as usize);
    let (mut w, mut h) = (width as i32, height as i32);
    for _ in 0..mip_levels {
        extents.push((w, h));
        w = next_mip_dimension(w);
        h = next_mip_dimension(h);
    }
    extents
}

/// Whether optimal-tiling images with `properties` can be blitted with a
/// linear filter.
#[inline]
pub fn supports_linear_blit(properties: &vk::FormatProperties) -> bool {
    properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
}

/// Fails unless optimal-tiling images of `format` can be blitted with a
/// linear filter.
pub fn check_linear_blit_support(device: &Device, format: vk::Format) -> RhiResult<()> {
    if supports_linear_blit(&device.format_properties(format)) {
        Ok(())
    } else {
        Err(RhiError::UnsupportedFormat {
            format,
            feature: "linear blit filtering",
        })
    }
}

/// Records blits filling levels `1..mip_levels` from level 0.
///
/// Every level must be in `TRANSFER_DST_OPTIMAL`; on return every level is
/// in `SHADER_READ_ONLY_OPTIMAL`.
pub fn record_mip_chain(cmd: &CommandBuffer, image: &Image) -> RhiResult<()> {
    use vk::ImageLayout as L;

    let handle = image.handle();
    let aspect = image.aspect();
    let levels = image.mip_levels();
    let extents = mip_extents(image.extent().width, image.extent().height, levels);

    for level in 1..levels {
        let (src_w, src_h) = extents[level as usize - 1];
        let (dst_w, dst_h) = extents[level as usize];

        record_transition(cmd, handle, subresource_range(aspect, level - 1, 1), L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL)?;

        let blit = vk::ImageBlit {
            src_subresource: layers(aspect, level - 1),
            src_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: src_w, y: src_h, z: 1 },
            ],
            dst_subresource: layers(aspect, level),
            dst_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: dst_w, y: dst_h, z: 1 },
            ],
        };
        cmd.blit_image(
            handle,
            L::TRANSFER_SRC_OPTIMAL,
            handle,
            L::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::LINEAR,
        );

        record_transition(cmd, handle, subresource_range(aspect, level - 1, 1), L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)?;
    }

    // Last level was only ever written
    record_transition(cmd, handle, subresource_range(aspect, levels - 1, 1), L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)
}

fn layers(aspect: vk::ImageAspectFlags, mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::mip_levels_for;

    #[test]
    fn test_next_mip_dimension_clamps() {
        assert_eq!(next_mip_dimension(512), 256);
        assert_eq!(next_mip_dimension(3), 1);
        assert_eq!(next_mip_dimension(1), 1);
    }

    #[test]
    fn test_mip_extents_end_at_one() {
        let extents = mip_extents(256, 64, mip_levels_for(256, 64));
        assert_eq!(extents.len(), 9);
        assert_eq!(extents[0], (256, 64));
        assert_eq!(extents[1], (128, 32));
        assert_eq!(extents[6], (4, 1));
        assert_eq!(*extents.last().unwrap(), (1, 1));
    }

    #[test]
    fn test_linear_blit_needs_optimal_tiling_filter() {
        let sampled = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST,
            ..Default::default()
        };
        assert!(supports_linear_blit(&sampled));

        // Linear tiling support does not count; mips live in optimal images
        let linear_only = vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::BLIT_SRC,
            ..Default::default()
        };
        assert!(!supports_linear_blit(&linear_only));
        assert!(!supports_linear_blit(&vk::FormatProperties::default()));
    }

    #[test]
    fn test_mip_extents_non_power_of_two() {
        let extents = mip_extents(800, 600, mip_levels_for(800, 600));
        assert_eq!(extents[1], (400, 300));
        assert_eq!(extents[3], (100, 75));
        assert_eq!(extents[4], (50, 37));
        assert_eq!(*extents.last().unwrap(), (1, 1));
    }
}
