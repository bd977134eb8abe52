//! GPU buffers belonging to one drawable object.

use std::sync::Arc;

use tracing::debug;

use gpuframe_rhi::{
    Backend, Buffer as _, BufferDesc, BufferUsage, CommandList as _, Device as _, IndexFormat,
    RhiError, RhiResult, Vertex,
};

use crate::error::{RendererError, RendererResult};

/// How the buffers of an asset are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub vertex_stride: u32,
    pub vertex_count: u32,
    /// Index count and format when the second buffer is an index buffer.
    pub indexed: Option<(u32, IndexFormat)>,
}

/// Shared handles to the buffers an object is drawn from.
///
/// The renderer never looks inside an asset; whoever records draws decides
/// what the buffers mean. Assets built by [`DrawableAsset::from_geometry`]
/// also know how to draw themselves.
pub struct DrawableAsset<B: Backend> {
    buffers: Vec<Arc<B::Buffer>>,
    draw: Option<DrawCall>,
}

impl<B: Backend> Default for DrawableAsset<B> {
    fn default() -> Self {
        Self {
            buffers: Vec::new(),
            draw: None,
        }
    }
}

impl<B: Backend> DrawableAsset<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a buffer handle. The asset keeps it alive.
    pub fn add_gpu_buffer(&mut self, buffer: Arc<B::Buffer>) {
        self.buffers.push(buffer);
    }

    pub fn buffers(&self) -> &[Arc<B::Buffer>] {
        &self.buffers
    }

    pub fn draw_call(&self) -> Option<DrawCall> {
        self.draw
    }

    /// Uploads `vertices` and, if not empty, `indices` into new buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if `vertices` is empty, an index points past the last
    /// vertex, or buffer creation fails.
    pub fn from_geometry(
        device: &Arc<B::Device>,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RhiResult<Self> {
        if vertices.is_empty() {
            return Err(RhiError::InvalidArgument(
                "geometry needs at least one vertex".to_string(),
            ));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RhiError::InvalidArgument(format!(
                "index {} out of range for {} vertices",
                index,
                vertices.len()
            )));
        }

        let mut asset = Self::new();
        asset.add_gpu_buffer(Arc::new(upload::<B>(
            device,
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?));

        let indexed = if indices.is_empty() {
            None
        } else {
            asset.add_gpu_buffer(Arc::new(upload::<B>(
                device,
                BufferUsage::Index,
                bytemuck::cast_slice(indices),
            )?));
            Some((indices.len() as u32, IndexFormat::U32))
        };

        asset.draw = Some(DrawCall {
            vertex_stride: Vertex::size() as u32,
            vertex_count: vertices.len() as u32,
            indexed,
        });

        debug!(
            "Created drawable: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );
        Ok(asset)
    }

    /// Binds the asset's buffers and records one instance of it.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidArgument`] for assets assembled from
    /// raw buffers, which carry no draw description.
    pub fn record_draw(&self, list: &mut B::CommandList) -> RendererResult<()> {
        let draw = self.draw.ok_or_else(|| {
            RendererError::InvalidArgument("asset has no draw description".to_string())
        })?;

        list.set_vertex_buffer(&self.buffers[0], draw.vertex_stride);
        match draw.indexed {
            Some((index_count, format)) => {
                list.set_index_buffer(&self.buffers[1], format);
                list.draw_indexed_instanced(index_count, 1, 0, 0, 0);
            }
            None => list.draw_instanced(draw.vertex_count, 1, 0, 0),
        }
        Ok(())
    }
}

fn upload<B: Backend>(device: &Arc<B::Device>, usage: BufferUsage, bytes: &[u8]) -> RhiResult<B::Buffer> {
    let mut buffer = device.create_buffer(&BufferDesc {
        size: bytes.len() as u64,
        usage,
    })?;
    buffer.write(0, bytes)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use gpuframe_rhi::DeviceDesc;
    use gpuframe_rhi::headless::{Headless, HeadlessDevice, HeadlessWindow};

    fn device() -> Arc<HeadlessDevice> {
        Headless::create_device(&HeadlessWindow::new(64, 64), &DeviceDesc::default()).unwrap()
    }

    fn triangle() -> [Vertex; 3] {
        [
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, Vec2::new(0.5, 0.0)),
        ]
    }

    #[test]
    fn test_add_gpu_buffer_keeps_order() {
        let device = device();
        let a = Arc::new(upload::<Headless>(&device, BufferUsage::Vertex, &[0; 16]).unwrap());
        let b = Arc::new(upload::<Headless>(&device, BufferUsage::Index, &[0; 8]).unwrap());

        let mut asset = DrawableAsset::<Headless>::new();
        asset.add_gpu_buffer(a.clone());
        asset.add_gpu_buffer(b.clone());
        assert_eq!(asset.buffers().len(), 2);
        assert!(Arc::ptr_eq(&asset.buffers()[0], &a));
        assert!(Arc::ptr_eq(&asset.buffers()[1], &b));
        assert!(asset.draw_call().is_none());
    }

    #[test]
    fn test_from_geometry_uploads_vertices() {
        let device = device();
        let vertices = triangle();
        let asset = DrawableAsset::<Headless>::from_geometry(&device, &vertices, &[0, 1, 2]).unwrap();

        assert_eq!(asset.buffers().len(), 2);
        let bytes = asset.buffers()[0].read(0, 96).unwrap();
        assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<Vertex, u8>(&vertices));
        assert_eq!(
            asset.draw_call(),
            Some(DrawCall {
                vertex_stride: 32,
                vertex_count: 3,
                indexed: Some((3, IndexFormat::U32)),
            })
        );
    }

    #[test]
    fn test_non_indexed_geometry() {
        let device = device();
        let asset = DrawableAsset::<Headless>::from_geometry(&device, &triangle(), &[]).unwrap();
        assert_eq!(asset.buffers().len(), 1);
        assert_eq!(asset.draw_call().unwrap().indexed, None);
    }

    #[test]
    fn test_invalid_geometry_is_rejected() {
        let device = device();
        assert!(DrawableAsset::<Headless>::from_geometry(&device, &[], &[]).is_err());
        assert!(DrawableAsset::<Headless>::from_geometry(&device, &triangle(), &[0, 3]).is_err());
    }

    #[test]
    fn test_raw_asset_cannot_record_draw() {
        let device = device();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(&allocator).unwrap();
        list.reset(&allocator).unwrap();

        let asset = DrawableAsset::<Headless>::new();
        assert!(matches!(
            asset.record_draw(&mut list),
            Err(RendererError::InvalidArgument(_))
        ));
        assert_eq!(list.recorded_len(), 0);
    }
}
