use std::sync::Arc;

use parking_lot::Mutex;

use super::device::DeviceShared;
use crate::backend::{Buffer, Texture};
use crate::error::{RhiError, RhiResult};
use crate::shader::ParsedShader;
use crate::types::{
    BufferDesc, ImageHandle, PipelineStateDesc, RootSignatureDesc, ShaderStage, TextureDesc,
};

/// Backing store shared between a buffer and the descriptors pointing at it.
#[derive(Debug)]
pub(crate) struct BufferMemory {
    bytes: Mutex<Vec<u8>>,
}

impl BufferMemory {
    /// Copies `len` bytes at `offset`, truncated at the end of the buffer.
    pub(crate) fn snapshot(&self, offset: u64, len: u64) -> Vec<u8> {
        let bytes = self.bytes.lock();
        let start = (offset as usize).min(bytes.len());
        let end = (offset.saturating_add(len) as usize).min(bytes.len());
        bytes[start..end].to_vec()
    }
}

/// Zero-initialized host memory.
#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u64,
    desc: BufferDesc,
    memory: Arc<BufferMemory>,
    shared: Arc<DeviceShared>,
}

impl HeadlessBuffer {
    pub(crate) fn new(shared: Arc<DeviceShared>, desc: BufferDesc) -> Self {
        Self {
            id: shared.next_id(),
            desc,
            shared,
            memory: Arc::new(BufferMemory {
                bytes: Mutex::new(vec![0; desc.size as usize]),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn memory(&self) -> &Arc<BufferMemory> {
        &self.memory
    }

    /// Reads back `len` bytes starting at `offset`.
    pub fn read(&self, offset: u64, len: u64) -> RhiResult<Vec<u8>> {
        if offset.saturating_add(len) > self.desc.size {
            return Err(RhiError::InvalidArgument(format!(
                "readback {}..{} exceeds buffer size {}",
                offset,
                offset.saturating_add(len),
                self.desc.size
            )));
        }
        Ok(self.memory.snapshot(offset, len))
    }
}

impl Buffer for HeadlessBuffer {
    fn desc(&self) -> BufferDesc {
        self.desc
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.shared.ensure_alive()?;
        let end = offset.saturating_add(data.len() as u64);
        if end > self.desc.size {
            return Err(RhiError::InvalidArgument(format!(
                "write {}..{} exceeds buffer size {}",
                offset, end, self.desc.size
            )));
        }
        let mut bytes = self.memory.bytes.lock();
        bytes[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }
}

#[derive(Debug)]
pub struct HeadlessTexture {
    id: u64,
    desc: TextureDesc,
}

impl HeadlessTexture {
    pub(crate) fn new(id: u64, desc: TextureDesc) -> Self {
        Self { id, desc }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Texture for HeadlessTexture {
    fn desc(&self) -> TextureDesc {
        self.desc
    }

    fn image(&self) -> ImageHandle {
        ImageHandle {
            raw: self.id,
            format: self.desc.format,
            mip_levels: self.desc.mip_levels,
        }
    }
}

/// A validated shader module.
pub struct HeadlessShader {
    id: u64,
    parsed: ParsedShader,
}

impl HeadlessShader {
    pub(crate) fn new(id: u64, parsed: ParsedShader) -> Self {
        Self { id, parsed }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.parsed.stage()
    }

    pub fn entry_point(&self) -> &str {
        self.parsed.entry_point()
    }
}

#[derive(Debug)]
pub struct HeadlessRootSignature {
    id: u64,
    desc: RootSignatureDesc,
}

impl HeadlessRootSignature {
    pub(crate) fn new(id: u64, desc: RootSignatureDesc) -> Self {
        Self { id, desc }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }
}

#[derive(Debug)]
pub struct HeadlessPipelineState {
    id: u64,
    root_signature: u64,
    desc: PipelineStateDesc,
}

impl HeadlessPipelineState {
    pub(crate) fn new(id: u64, root_signature: u64, desc: PipelineStateDesc) -> Self {
        Self {
            id,
            root_signature,
            desc,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn root_signature(&self) -> u64 {
        self.root_signature
    }

    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Device as _;
    use crate::headless::HeadlessDevice;
    use crate::types::{BufferUsage, DeviceDesc};

    fn buffer(size: u64, usage: BufferUsage) -> (Arc<HeadlessDevice>, HeadlessBuffer) {
        let device = HeadlessDevice::new(&DeviceDesc::default());
        let buffer = device.create_buffer(&BufferDesc { size, usage }).unwrap();
        (device, buffer)
    }

    #[test]
    fn test_buffer_write_then_read() {
        let (_device, mut buffer) = buffer(16, BufferUsage::Constant);
        buffer.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.read(2, 6).unwrap(), vec![0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_buffer_bounds_are_checked() {
        let (_device, mut buffer) = buffer(8, BufferUsage::Vertex);
        assert!(buffer.write(6, &[0; 4]).is_err());
        assert!(buffer.read(4, 5).is_err());
        assert!(buffer.read(0, 8).is_ok());
    }

    #[test]
    fn test_buffer_write_fails_after_device_loss() {
        let (device, mut buffer) = buffer(8, BufferUsage::Constant);
        device.simulate_device_loss();
        assert!(matches!(buffer.write(0, &[1]), Err(RhiError::DeviceLost)));
    }
}
