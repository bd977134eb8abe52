//! Shader front end shared by the backends.
//!
//! WGSL sources are parsed and validated with `naga` at device level, so a
//! broken shader fails `compile_shader` on every backend. The Vulkan backend
//! additionally lowers the validated module to SPIR-V.

use std::path::Path;

use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::types::{ShaderSource, ShaderStage};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Intermediate form of a compiled shader.
pub enum ShaderIr {
    Naga {
        module: Box<naga::Module>,
        info: naga::valid::ModuleInfo,
    },
    SpirV(Vec<u32>),
}

/// A shader that parsed, validated and exposes the requested entry point.
pub struct ParsedShader {
    stage: ShaderStage,
    entry_point: String,
    ir: ShaderIr,
}

impl ParsedShader {
    /// Parses and validates `source` for `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the source does not parse, fails
    /// validation, or lacks an entry point of the right stage.
    pub fn parse(stage: ShaderStage, source: &ShaderSource) -> RhiResult<Self> {
        let entry_point = source.entry_point().to_string();

        let ir = match source {
            ShaderSource::Wgsl { source, .. } => {
                let module = naga::front::wgsl::parse_str(source).map_err(|e| {
                    RhiError::ShaderError(format!(
                        "{} shader failed to parse:\n{}",
                        stage,
                        e.emit_to_string(source)
                    ))
                })?;

                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module)
                .map_err(|e| {
                    RhiError::ShaderError(format!(
                        "{} shader failed validation:\n{}",
                        stage,
                        e.emit_to_string(source)
                    ))
                })?;

                let naga_stage = to_naga_stage(stage);
                if !module
                    .entry_points
                    .iter()
                    .any(|ep| ep.name == entry_point && ep.stage == naga_stage)
                {
                    return Err(RhiError::ShaderError(format!(
                        "no {} entry point named '{}'",
                        stage, entry_point
                    )));
                }

                ShaderIr::Naga {
                    module: Box::new(module),
                    info,
                }
            }
            ShaderSource::SpirV { words, .. } => {
                if words.first() != Some(&SPIRV_MAGIC) {
                    return Err(RhiError::ShaderError(format!(
                        "{} shader is not SPIR-V (bad magic number)",
                        stage
                    )));
                }
                ShaderIr::SpirV(words.clone())
            }
        };

        debug!("Compiled {} shader, entry point '{}'", stage, entry_point);

        Ok(Self {
            stage,
            entry_point,
            ir,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn ir(&self) -> &ShaderIr {
        &self.ir
    }

    /// Lowers the shader to SPIR-V words for the selected entry point.
    pub fn to_spirv(&self) -> RhiResult<Vec<u32>> {
        match &self.ir {
            ShaderIr::SpirV(words) => Ok(words.clone()),
            ShaderIr::Naga { module, info } => {
                let pipeline_options = naga::back::spv::PipelineOptions {
                    shader_stage: to_naga_stage(self.stage),
                    entry_point: self.entry_point.clone(),
                };
                naga::back::spv::write_vec(
                    module,
                    info,
                    &naga::back::spv::Options::default(),
                    Some(&pipeline_options),
                )
                .map_err(|e| {
                    RhiError::ShaderError(format!("{} shader SPIR-V output failed: {}", self.stage, e))
                })
            }
        }
    }
}

fn to_naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Pixel => naga::ShaderStage::Fragment,
    }
}

/// Converts SPIR-V bytes to words.
///
/// # Errors
///
/// Returns an error if the byte length is not a multiple of 4.
pub fn spirv_words_from_bytes(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V byte length must be a multiple of 4, got {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Loads a shader source from disk, choosing WGSL or SPIR-V by extension.
pub fn load_shader_source(path: &Path, entry_point: &str) -> RhiResult<ShaderSource> {
    let read_error =
        |e: std::io::Error| RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e));

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("spv") => {
            let bytes = std::fs::read(path).map_err(read_error)?;
            Ok(ShaderSource::SpirV {
                words: spirv_words_from_bytes(&bytes)?,
                entry_point: entry_point.to_string().into(),
            })
        }
        _ => {
            let text = std::fs::read_to_string(path).map_err(read_error)?;
            Ok(ShaderSource::wgsl(text, entry_point.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(index) - 1);
    let y = f32(i32(index & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn ps_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
"#;

    #[test]
    fn test_parse_valid_wgsl() {
        let shader =
            ParsedShader::parse(ShaderStage::Vertex, &ShaderSource::wgsl(TRIANGLE, "vs_main"))
                .unwrap();
        assert_eq!(shader.stage(), ShaderStage::Vertex);
        assert_eq!(shader.entry_point(), "vs_main");
        assert!(matches!(shader.ir(), ShaderIr::Naga { .. }));
    }

    #[test]
    fn test_wrong_stage_entry_point_is_rejected() {
        let result =
            ParsedShader::parse(ShaderStage::Pixel, &ShaderSource::wgsl(TRIANGLE, "vs_main"));
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let result = ParsedShader::parse(
            ShaderStage::Vertex,
            &ShaderSource::wgsl("fn vs_main( {", "vs_main"),
        );
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_output_starts_with_magic() {
        let shader =
            ParsedShader::parse(ShaderStage::Pixel, &ShaderSource::wgsl(TRIANGLE, "ps_main"))
                .unwrap();
        let words = shader.to_spirv().unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_spirv_bytes_alignment() {
        assert!(spirv_words_from_bytes(&[0u8; 5]).is_err());
        let words = spirv_words_from_bytes(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC]);
    }

    #[test]
    fn test_bad_spirv_magic_is_rejected() {
        let source = ShaderSource::SpirV {
            words: vec![0xdead_beef],
            entry_point: "main".into(),
        };
        assert!(ParsedShader::parse(ShaderStage::Vertex, &source).is_err());
    }
}
