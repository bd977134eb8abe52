//! Backend-neutral value types passed across the RHI traits.
//!
//! Everything here is plain data. Backends translate these into their native
//! structures (see `vulkan::convert`) or interpret them directly (`headless`).

use std::borrow::Cow;
use std::fmt;

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (e.g. a minimized window).
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for Extent2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Viewport transform applied to rasterized primitives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport covering depth range `[0, 1]`.
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle, right/bottom exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            left: 0,
            top: 0,
            right: extent.width as i32,
            bottom: extent.height as i32,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

/// Pixel formats used for render targets, depth buffers and textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D32Float | Format::D24UnormS8Uint | Format::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32FloatS8Uint)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::Bgra8Unorm
            | Format::Bgra8UnormSrgb
            | Format::Rgba8Unorm
            | Format::Rgba8UnormSrgb
            | Format::D32Float
            | Format::D24UnormS8Uint => 4,
            Format::Rgba16Float | Format::D32FloatS8Uint => 8,
        }
    }
}

/// A fullscreen display mode offered by the output the window is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate_millihertz: u32,
    pub format: Format,
}

impl DisplayMode {
    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }

    pub fn refresh_rate_hz(&self) -> f32 {
        self.refresh_rate_millihertz as f32 / 1000.0
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {:.2} Hz ({:?})",
            self.width,
            self.height,
            self.refresh_rate_hz(),
            self.format
        )
    }
}

/// Descriptor heap types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    RenderTarget,
    DepthStencil,
    ConstantBuffer,
    ShaderResource,
    Sampler,
}

impl DescriptorHeapKind {
    /// Render-target and depth-stencil heaps are never bound to shaders.
    pub fn can_be_shader_visible(self) -> bool {
        !matches!(
            self,
            DescriptorHeapKind::RenderTarget | DescriptorHeapKind::DepthStencil
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            DescriptorHeapKind::RenderTarget => "render-target",
            DescriptorHeapKind::DepthStencil => "depth-stencil",
            DescriptorHeapKind::ConstantBuffer => "constant-buffer",
            DescriptorHeapKind::ShaderResource => "shader-resource",
            DescriptorHeapKind::Sampler => "sampler",
        }
    }
}

impl fmt::Display for DescriptorHeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    pub kind: DescriptorHeapKind,
    pub capacity: u32,
    pub shader_visible: bool,
}

/// Opaque address of one descriptor slot.
///
/// The upper 32 bits identify the heap; the lower 32 bits are the byte
/// offset inside it, so handles from different heaps never compare equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorHandle {
    pub ptr: u64,
}

impl DescriptorHandle {
    pub fn heap_start(heap_id: u32) -> Self {
        Self {
            ptr: (heap_id as u64) << 32,
        }
    }

    /// Handle of slot `index` given the heap's increment size.
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self {
            ptr: self.ptr + index as u64 * increment as u64,
        }
    }

    pub fn heap_id(self) -> u32 {
        (self.ptr >> 32) as u32
    }
}

/// Identifies an image for barriers and attachments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    pub raw: u64,
    pub format: Format,
    pub mip_levels: u32,
}

/// A render-target or depth-stencil view as stored in a non-shader-visible heap.
///
/// Values are only valid until the owning resource is recreated (present,
/// resize, fullscreen toggle); re-query instead of caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentView {
    pub handle: DescriptorHandle,
    pub view: u64,
    pub image: ImageHandle,
    pub extent: Extent2D,
}

impl AttachmentView {
    pub fn format(&self) -> Format {
        self.image.format
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Point,
    Linear,
    Anisotropic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Static sampler state written into a sampler heap slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_mode: AddressMode,
    pub max_anisotropy: u32,
    pub mip_lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_mode: AddressMode::Wrap,
            max_anisotropy: 1,
            mip_lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    pub fn point_clamp() -> Self {
        Self {
            filter: Filter::Point,
            address_mode: AddressMode::Clamp,
            ..Self::default()
        }
    }

    pub fn anisotropic_wrap(max_anisotropy: u32) -> Self {
        Self {
            filter: Filter::Anisotropic,
            max_anisotropy: max_anisotropy.clamp(1, 16),
            ..Self::default()
        }
    }
}

/// Resource usage states tracked by explicit transition barriers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    Present,
    RenderTarget,
    DepthWrite,
    ShaderResource,
    CopyDest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// CPU-written constant data read by shaders.
    Constant,
}

impl BufferUsage {
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Constant => "constant",
        }
    }
}

/// Buffers are always host-visible and persistently mapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    Sampled,
    DepthStencil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub extent: Extent2D,
    pub format: Format,
    pub mip_levels: u32,
    pub usage: TextureUsage,
}

impl TextureDesc {
    pub fn depth_stencil(extent: Extent2D, format: Format) -> Self {
        Self {
            extent,
            format,
            mip_levels: 1,
            usage: TextureUsage::DepthStencil,
        }
    }

    pub fn sampled(extent: Extent2D, format: Format) -> Self {
        Self {
            extent,
            format,
            mip_levels: 1,
            usage: TextureUsage::Sampled,
        }
    }
}

/// Swap chain creation and resize parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub extent: Extent2D,
    pub buffer_count: u32,
    pub format: Format,
    pub vsync: bool,
}

/// Outcome of a present call that did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented, but the chain no longer matches the surface exactly.
    Suboptimal,
    /// Nothing was presented; the chain must be resized before the next frame.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Pixel => "pixel",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shader source compiled by the device at init.
#[derive(Clone, Debug)]
pub enum ShaderSource {
    Wgsl {
        source: Cow<'static, str>,
        entry_point: Cow<'static, str>,
    },
    /// Pre-compiled SPIR-V words.
    SpirV {
        words: Vec<u32>,
        entry_point: Cow<'static, str>,
    },
}

impl ShaderSource {
    pub fn wgsl(source: impl Into<Cow<'static, str>>, entry_point: impl Into<Cow<'static, str>>) -> Self {
        ShaderSource::Wgsl {
            source: source.into(),
            entry_point: entry_point.into(),
        }
    }

    pub fn entry_point(&self) -> &str {
        match self {
            ShaderSource::Wgsl { entry_point, .. } | ShaderSource::SpirV { entry_point, .. } => {
                entry_point
            }
        }
    }
}

/// One root signature slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootParameter {
    /// A constant buffer selected at bind time by heap slot and byte offset.
    ConstantBuffer { heap_capacity: u32 },
    /// A table covering a whole shader-visible heap.
    DescriptorTable { kind: DescriptorHeapKind, count: u32 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Fixed-function state baked into a pipeline state object.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineStateDesc {
    pub input_layout: InputLayout,
    pub render_target_format: Format,
    pub depth_format: Format,
    pub cull_mode: CullMode,
    pub depth_test: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Software,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub kind: AdapterKind,
}

/// Device creation parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDesc {
    pub application_name: String,
    pub debug_layer: bool,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            application_name: "gpuframe".to_string(),
            debug_layer: cfg!(debug_assertions),
        }
    }
}
