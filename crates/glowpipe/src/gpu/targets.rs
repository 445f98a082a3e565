use std::collections::HashMap;

use crate::error::{PipelineError, PipelineResult};
use crate::graph::Target;
use crate::types::Viewport;

use super::context::OFFSCREEN_FORMAT;

pub(crate) struct TargetTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Off-screen render targets, sized to the last synced viewport.
#[derive(Default)]
pub(crate) struct RenderTargets {
    viewport: Option<Viewport>,
    textures: HashMap<Target, TargetTexture>,
}

impl RenderTargets {
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Reallocates every target when `viewport` differs from the current
    /// size. Returns whether storage was recreated; old contents are lost.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        viewport: Viewport,
        layer_count: usize,
        offscreen_screen: bool,
    ) -> bool {
        if self.viewport == Some(viewport) {
            return false;
        }

        let mut targets = Target::offscreen(layer_count);
        if offscreen_screen {
            targets.push(Target::Screen);
        }
        self.textures = targets
            .into_iter()
            .map(|target| (target, create_texture(device, target, viewport)))
            .collect();
        self.viewport = Some(viewport);
        tracing::debug!(
            width = viewport.width,
            height = viewport.height,
            targets = self.textures.len(),
            "allocated render targets"
        );
        true
    }

    /// Forces reallocation on the next [`RenderTargets::ensure`].
    pub fn invalidate(&mut self) {
        self.viewport = None;
    }

    pub fn get(&self, target: Target) -> PipelineResult<&TargetTexture> {
        self.textures
            .get(&target)
            .ok_or_else(|| PipelineError::MissingTarget(target.to_string()))
    }
}

fn create_texture(device: &wgpu::Device, target: Target, viewport: Viewport) -> TargetTexture {
    let label = target.to_string();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&label),
        size: wgpu::Extent3d {
            width: viewport.width,
            height: viewport.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TargetTexture { texture, view }
}
