//! Image step: per-format optimisation plugins with an incremental skip.
//!
//! Only sources that are newer than their destination (or have none) are
//! processed. Every plugin can be switched off, in which case the file is
//! copied through unchanged; so is any file with an unrecognised extension.

use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

use image::codecs::gif::{GifDecoder, GifEncoder};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{AnimationDecoder, DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;

use crate::output::{is_up_to_date, read, write_all, Pending};
use crate::traits::{SourceFile, StepOutput, TransformError, TransformStep};

/// GIF re-encoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GifOptions {
    pub enabled: bool,
    /// Not supported by the encoder; `true` is reported at startup
    pub interlaced: bool,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            interlaced: false,
        }
    }
}

/// JPEG re-encoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JpegOptions {
    pub enabled: bool,
    /// Encoder quality, 1-100
    pub quality: u8,
    /// Not supported, output is baseline; `true` is reported at startup
    pub progressive: bool,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: 75,
            progressive: false,
        }
    }
}

/// PNG recompression.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PngOptions {
    pub enabled: bool,
    /// Palette quality range, 0.0-1.0. Not supported, PNGs are recompressed
    /// losslessly; a value is reported at startup
    pub quality: Option<[f32; 2]>,
    /// 1 (slowest, smallest) to 11 (fastest)
    pub speed: u8,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: None,
            speed: 4,
        }
    }
}

impl PngOptions {
    fn compression(&self) -> CompressionType {
        match self.speed {
            0..=4 => CompressionType::Best,
            5..=8 => CompressionType::Default,
            _ => CompressionType::Fast,
        }
    }
}

/// WebP re-encoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebpOptions {
    pub enabled: bool,
    /// Lossy quality. Not supported, WebP is encoded losslessly; a value is
    /// reported at startup
    pub quality: Option<u8>,
}

impl Default for WebpOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: None,
        }
    }
}

/// SVG markup cleanup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SvgOptions {
    pub enabled: bool,
    /// Drop `viewBox` when it only restates `width` and `height`
    pub remove_view_box: bool,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            remove_view_box: true,
        }
    }
}

/// Options for the image step, one table per plugin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub gifsicle: GifOptions,
    pub mozjpeg: JpegOptions,
    pub pngquant: PngOptions,
    pub webp: WebpOptions,
    pub svgo: SvgOptions,
}

impl ImageOptions {
    /// Settings that are configured but cannot be honoured by the encoders.
    pub fn unsupported(&self) -> Vec<&'static str> {
        let mut settings = Vec::new();
        if self.gifsicle.interlaced {
            settings.push("gifsicle.interlaced");
        }
        if self.mozjpeg.progressive {
            settings.push("mozjpeg.progressive");
        }
        if self.pngquant.quality.is_some() {
            settings.push("pngquant.quality");
        }
        if self.webp.quality.is_some() {
            settings.push("webp.quality");
        }
        settings
    }
}

/// Optimises raster and vector images.
#[derive(Debug, Clone, Default)]
pub struct ImageStep {
    options: ImageOptions,
}

impl ImageStep {
    pub fn new(options: ImageOptions) -> Self {
        for setting in options.unsupported() {
            tracing::warn!("images: '{}' is not supported and will be ignored", setting);
        }
        Self { options }
    }

    /// Optimise one file. Returns the input unchanged when no plugin applies
    /// or when the optimised result is not smaller.
    pub fn optimize(&self, bytes: Vec<u8>, path: &Path) -> Result<Vec<u8>, TransformError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let optimized = match ext.as_str() {
            "svg" if self.options.svgo.enabled => {
                let text = String::from_utf8_lossy(&bytes);
                Some(optimize_svg(&text, &self.options.svgo).into_bytes())
            }
            "svg" => None,
            _ => match ImageFormat::from_extension(&ext) {
                Some(format) => self.encode_raster(&bytes, format, path)?,
                None => None,
            },
        };

        Ok(match optimized {
            Some(out) if out.len() < bytes.len() => out,
            _ => bytes,
        })
    }

    fn encode_raster(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        path: &Path,
    ) -> Result<Option<Vec<u8>>, TransformError> {
        let encode_error = |e: image::ImageError| TransformError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let decode = || {
            image::load_from_memory_with_format(bytes, format).map_err(|e| TransformError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        };

        let mut out = Vec::new();
        match format {
            ImageFormat::Jpeg if self.options.mozjpeg.enabled => {
                let img = decode()?;
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut out, self.options.mozjpeg.quality.clamp(1, 100))
                    .encode(&rgb, rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                    .map_err(encode_error)?;
            }
            ImageFormat::Png if self.options.pngquant.enabled => {
                let img = decode()?;
                write_png(&img, &mut out, self.options.pngquant.compression()).map_err(encode_error)?;
            }
            ImageFormat::WebP if self.options.webp.enabled => {
                let img = decode()?;
                let rgba = img.to_rgba8();
                WebPEncoder::new_lossless(&mut out)
                    .encode(&rgba, rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
                    .map_err(encode_error)?;
            }
            ImageFormat::Gif if self.options.gifsicle.enabled => {
                let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| TransformError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                let frames = decoder.into_frames().collect_frames().map_err(encode_error)?;
                // The trailer is written when the encoder drops.
                let mut encoder = GifEncoder::new(&mut out);
                encoder.encode_frames(frames).map_err(encode_error)?;
                drop(encoder);
            }
            _ => return Ok(None),
        }

        Ok(Some(out))
    }
}

fn write_png(
    img: &DynamicImage,
    out: &mut Vec<u8>,
    compression: CompressionType,
) -> image::ImageResult<()> {
    PngEncoder::new_with_quality(out, compression, FilterType::Adaptive).write_image(
        img.as_bytes(),
        img.width(),
        img.height(),
        img.color().into(),
    )
}

static SVG_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SVG_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").unwrap());
static SVG_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text\b.*?</text\s*>").unwrap());
static SVG_ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<svg\b[^>]*>").unwrap());
static SVG_VIEW_BOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+viewBox\s*=\s*"([^"]*)""#).unwrap());

fn svg_attr(tag: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"\s{}\s*=\s*"([^"]*)""#, regex::escape(name))).ok()?;
    re.captures(tag).map(|c| c[1].trim().to_string())
}

/// Drop whitespace-only runs between tags, except inside `<text>` where
/// they separate rendered words.
fn collapse_gaps(svg: &str) -> String {
    let text: Vec<_> = SVG_TEXT.find_iter(svg).map(|m| m.range()).collect();

    SVG_GAP
        .replace_all(svg, |caps: &regex::Captures| {
            let gap = caps.get(0).map(|m| m.range()).unwrap_or_default();
            if text.iter().any(|t| t.start <= gap.start && gap.end <= t.end) {
                svg[gap].to_string()
            } else {
                "><".to_string()
            }
        })
        .into_owned()
}

/// Strip comments and inter-tag whitespace, and a redundant root `viewBox`.
fn optimize_svg(svg: &str, options: &SvgOptions) -> String {
    let stripped = SVG_COMMENT.replace_all(svg, "");
    let mut svg = collapse_gaps(stripped.trim());

    if options.remove_view_box {
        let replacement = SVG_ROOT.find(&svg).and_then(|root| {
            let tag = root.as_str();
            let redundant = match (
                svg_attr(tag, "width"),
                svg_attr(tag, "height"),
                svg_attr(tag, "viewBox"),
            ) {
                (Some(w), Some(h), Some(vb)) => {
                    let w = w.trim_end_matches("px");
                    let h = h.trim_end_matches("px");
                    vb.split_whitespace().collect::<Vec<_>>() == ["0", "0", w, h]
                }
                _ => false,
            };

            redundant.then(|| (root.range(), SVG_VIEW_BOX.replace(tag, "").into_owned()))
        });

        if let Some((range, tag)) = replacement {
            svg.replace_range(range, &tag);
        }
    }

    svg
}

impl TransformStep for ImageStep {
    fn name(&self) -> &'static str {
        "imagemin"
    }

    fn apply(&self, sources: &[SourceFile], dest: &Path) -> Result<StepOutput, TransformError> {
        let stale: Vec<&SourceFile> = sources
            .iter()
            .filter(|s| !is_up_to_date(&s.path, &dest.join(&s.relative)))
            .collect();
        let skipped = sources.len() - stale.len();

        if stale.is_empty() {
            tracing::debug!("All {} images up to date", skipped);
            return Ok(StepOutput {
                written: Vec::new(),
                skipped,
            });
        }

        let pending = stale
            .par_iter()
            .map(|source| {
                let bytes = read(&source.path)?;
                let original = bytes.len();
                let optimized = self.optimize(bytes, &source.path)?;
                tracing::debug!(
                    "{}: {} -> {} bytes",
                    source.relative.display(),
                    original,
                    optimized.len()
                );
                Ok(Pending::new(dest.join(&source.relative), optimized))
            })
            .collect::<Result<Vec<_>, TransformError>>()?;

        Ok(StepOutput {
            written: write_all(pending)?,
            skipped,
        })
    }
}
