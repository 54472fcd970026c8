use std::sync::Arc;
use voxstream_mesh::{MeshBackend, MeshData, MeshVertex, UploadedMesh};
use wgpu::util::DeviceExt;

/// Vertex and index buffers holding one bucket's geometry.
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// [`MeshBackend`] that creates immutable wgpu buffers for every upload.
pub struct WgpuMeshBackend {
    device: Arc<wgpu::Device>,
}

impl WgpuMeshBackend {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl MeshBackend for WgpuMeshBackend {
    type Buffer = GpuMesh;

    fn upload(&self, label: &str, mesh: &MeshData) -> GpuMesh {
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}_vertices")),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}_indices")),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        tracing::trace!(label, bytes = mesh.byte_size(), "terrain buffers uploaded");
        GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        }
    }
}

/// Layout of [`MeshVertex`] for a render pipeline: position, normal, colour.
pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x4,
    ];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<MeshVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// Record one indexed draw per uploaded bucket on an already configured pass.
pub fn record_draws(pass: &mut wgpu::RenderPass<'_>, meshes: &[Arc<UploadedMesh<GpuMesh>>]) {
    for mesh in meshes {
        let gpu = &mesh.buffer;
        pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
        pass.set_index_buffer(gpu.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..gpu.index_count, 0, 0..1);
    }
}
