//! Texture creation helpers.
//!
//! [`TextureFactory`] covers the common cases on top of [`ImageBuilder`]:
//! render-target colour and depth textures, and sampled textures uploaded
//! from decoded pixels (2D or cubemap) with a generated mip chain.
//!
//! Pixel data arrives already decoded, tightly packed, 8 bits per channel.
//! Fewer than four channels are widened to RGBA before upload.

use std::borrow::Cow;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::barrier::{TrackedLayout, generate_mipmaps, image_transition_barrier, mipmap_plan};
use crate::buffer::BufferBuilder;
use crate::command::{CommandPools, UPLOAD_QUEUE};
use crate::device::DeviceContext;
use crate::error::RhiResult;
use crate::image::{Image, ImageBuilder};

/// Widens tightly packed 1-4 channel pixels to RGBA8.
///
/// Missing colour channels repeat the last one for greyscale, alpha is
/// opaque.
///
/// # Panics
///
/// Panics if `channels` is not in `1..=4` or `data` is not exactly
/// `pixel_count * channels` bytes.
pub fn expand_to_rgba(data: &[u8], channels: u32, pixel_count: usize) -> Cow<'_, [u8]> {
    assert!(
        (1..=4).contains(&channels),
        "unsupported channel count {channels}"
    );
    let channels = channels as usize;
    assert_eq!(
        data.len(),
        pixel_count * channels,
        "pixel data is {} bytes, expected {} pixels x {} channels",
        data.len(),
        pixel_count,
        channels
    );

    if channels == 4 {
        return Cow::Borrowed(data);
    }

    let mut out = Vec::with_capacity(pixel_count * 4);
    for pixel in data.chunks_exact(channels) {
        match *pixel {
            [l] => out.extend_from_slice(&[l, l, l, 255]),
            [l, a] => out.extend_from_slice(&[l, l, l, a]),
            [r, g, b] => out.extend_from_slice(&[r, g, b, 255]),
            _ => unreachable!(),
        }
    }
    Cow::Owned(out)
}

/// Creates textures on one device.
pub struct TextureFactory<'a> {
    device: &'a Arc<DeviceContext>,
    pools: &'a CommandPools,
}

impl<'a> TextureFactory<'a> {
    pub fn new(device: &'a Arc<DeviceContext>, pools: &'a CommandPools) -> Self {
        Self { device, pools }
    }

    /// Colour render target that can also be sampled.
    ///
    /// `B8G8R8A8_UNORM`, or `R32G32B32A32_SFLOAT` when `float` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be created or transitioned.
    pub fn create_colour_texture(
        &self,
        width: u32,
        height: u32,
        name: &str,
        float: bool,
    ) -> RhiResult<Image> {
        let format = if float {
            vk::Format::R32G32B32A32_SFLOAT
        } else {
            vk::Format::B8G8R8A8_UNORM
        };
        ImageBuilder::new(width, height, name)
            .with_format(format)
            .with_usages(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
            .with_layout(TrackedLayout::ColourAttachment)
            .build(self.device, self.pools)
    }

    /// Depth render target that can also be sampled.
    ///
    /// `D24_UNORM_S8_UINT` with stencil, `D32_SFLOAT` without.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be created or transitioned.
    pub fn create_depth_texture(
        &self,
        width: u32,
        height: u32,
        name: &str,
        with_stencil: bool,
    ) -> RhiResult<Image> {
        let format = if with_stencil {
            vk::Format::D24_UNORM_S8_UINT
        } else {
            vk::Format::D32_SFLOAT
        };
        ImageBuilder::new(width, height, name)
            .with_format(format)
            .with_usages(
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            )
            .with_layout(TrackedLayout::DepthStencilAttachment)
            .build(self.device, self.pools)
    }

    /// Sampled 2D texture from decoded pixels, with a full mip chain.
    ///
    /// # Panics
    ///
    /// Panics if the pixel data does not match the dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or the upload submission fails.
    pub fn texture_from_pixels(
        &self,
        width: u32,
        height: u32,
        channels: u32,
        data: &[u8],
        name: &str,
    ) -> RhiResult<Image> {
        self.upload(width, height, channels, &[data], false, name)
    }

    /// Sampled cubemap from six decoded faces, in +X, -X, +Y, -Y, +Z, -Z
    /// order, with a full mip chain per face.
    ///
    /// # Panics
    ///
    /// Panics if any face does not match the dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or the upload submission fails.
    pub fn cubemap_from_pixels(
        &self,
        width: u32,
        height: u32,
        channels: u32,
        faces: [&[u8]; 6],
        name: &str,
    ) -> RhiResult<Image> {
        self.upload(width, height, channels, &faces, true, name)
    }

    fn upload(
        &self,
        width: u32,
        height: u32,
        channels: u32,
        layers: &[&[u8]],
        cubemap: bool,
        name: &str,
    ) -> RhiResult<Image> {
        let pixel_count = width as usize * height as usize;
        let face_size = pixel_count * 4;

        let mut builder = ImageBuilder::new(width, height, name)
            .with_format(vk::Format::R8G8B8A8_UNORM)
            .with_usages(
                vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .with_full_mip_chain();
        if cubemap {
            builder = builder.as_cubemap();
        }
        let image = builder.build_undefined(self.device)?;

        let mut staging = BufferBuilder::new(
            (face_size * layers.len()) as vk::DeviceSize,
            format!("{name} staging"),
        )
        .with_buffer_usage(vk::BufferUsageFlags::TRANSFER_SRC)
        .with_host_visibility()
        .build(self.device)?;
        {
            let mut mapping = staging.map()?;
            for (layer, pixels) in layers.iter().enumerate() {
                let rgba = expand_to_rgba(pixels, channels, pixel_count);
                mapping.write((layer * face_size) as vk::DeviceSize, &rgba)?;
            }
        }

        let layer_count = image.layers();
        let mip_levels = image.mip_levels();
        let extent = image.extent();
        let handle = image.handle();

        let (mut image, _staging) = self.pools.submit_one_shot_keeping(
            UPLOAD_QUEUE,
            "texture upload",
            (image, staging),
            |cmd, (_, staging)| {
                for layer in 0..layer_count {
                    image_transition_barrier(
                        cmd,
                        handle,
                        TrackedLayout::Undefined,
                        TrackedLayout::TransferDst,
                        vk::ImageAspectFlags::COLOR,
                        vk::PipelineStageFlags::HOST,
                        vk::PipelineStageFlags::TRANSFER,
                        0,
                        layer,
                    );
                }

                let copy = vk::BufferImageCopy::default()
                    .image_subresource(
                        vk::ImageSubresourceLayers::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .mip_level(0)
                            .base_array_layer(0)
                            .layer_count(layer_count),
                    )
                    .image_extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    });
                cmd.copy_buffer_to_image(
                    staging.handle(),
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy],
                );

                generate_mipmaps(
                    cmd,
                    handle,
                    extent,
                    mip_levels,
                    layer_count,
                    TrackedLayout::ShaderReadOnly,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                );
            },
        )?;

        let tracker = image.tracker_mut();
        for layer in 0..layer_count {
            tracker.set(0, layer, TrackedLayout::TransferDst);
        }
        tracker.apply(&mipmap_plan(
            mip_levels,
            layer_count,
            TrackedLayout::ShaderReadOnly,
        ));

        debug!(
            "Uploaded texture '{}': {}x{}, {} layer(s), {} mip(s)",
            name, width, height, layer_count, mip_levels
        );

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_passes_through() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert!(matches!(expand_to_rgba(&data, 4, 2), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rgb_gets_opaque_alpha() {
        let data = [10u8, 20, 30, 40, 50, 60];
        let rgba = expand_to_rgba(&data, 3, 2);
        assert_eq!(&*rgba, &[10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_grey_and_grey_alpha() {
        assert_eq!(&*expand_to_rgba(&[7], 1, 1), &[7, 7, 7, 255]);
        assert_eq!(&*expand_to_rgba(&[7, 9], 2, 1), &[7, 7, 7, 9]);
    }

    #[test]
    #[should_panic(expected = "pixel data")]
    fn test_size_mismatch_panics() {
        expand_to_rgba(&[0u8; 5], 4, 2);
    }

    #[test]
    #[should_panic(expected = "unsupported channel count")]
    fn test_channel_count_checked() {
        expand_to_rgba(&[0u8; 5], 5, 1);
    }
}
