use std::io::Cursor;

use anyhow::{Context, Result};
use fusion_contracts::wire::EncodedImage;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::backend::{ImageModel, ModelError, ModelOutput};
use crate::encoder::encode_bytes;

pub const DRYRUN_REFUSE_MARKER: &str = "[refuse]";
pub const DRYRUN_EMPTY_MARKER: &str = "[empty]";

/// Offline stand-in for the real model. Paints a solid colour derived from
/// the prompt and the number of input images.
#[derive(Debug, Clone)]
pub struct DryrunImageModel {
    width: u32,
    height: u32,
}

impl Default for DryrunImageModel {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
        }
    }
}

impl DryrunImageModel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl ImageModel for DryrunImageModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, prompt: &str, images: &[EncodedImage]) -> Result<ModelOutput, ModelError> {
        if prompt.contains(DRYRUN_REFUSE_MARKER) {
            return Ok(ModelOutput {
                image: None,
                text: Some("The dry-run model declines prompts marked [refuse].".to_string()),
            });
        }
        if prompt.contains(DRYRUN_EMPTY_MARKER) {
            return Ok(ModelOutput::default());
        }
        let color = color_from_prompt(prompt, images.len() as u64);
        let png = solid_png(self.width, self.height, color)?;
        Ok(ModelOutput {
            image: Some(encode_bytes(&png, "image/png")),
            text: None,
        })
    }
}

pub fn solid_png(width: u32, height: u32, (r, g, b): (u8, u8, u8)) -> Result<Vec<u8>> {
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode dry-run PNG")?;
    Ok(out.into_inner())
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use fusion_contracts::artifact::GenerationResult;

    use crate::backend::ImageModel;

    use super::{color_from_prompt, DryrunImageModel};

    #[test]
    fn same_prompt_same_colour() {
        assert_eq!(color_from_prompt("boat", 2), color_from_prompt("boat", 2));
        assert_ne!(color_from_prompt("boat", 2), color_from_prompt("boat", 1));
    }

    #[test]
    fn produces_decodable_png() -> anyhow::Result<()> {
        let output = DryrunImageModel::new(8, 4).generate("boat", &[])?;
        let image = output.image.ok_or_else(|| anyhow::anyhow!("no image"))?;
        assert_eq!(image.mime_type, "image/png");
        let decoded = GenerationResult::from_encoded(&image).decode()?;
        let png = image::load_from_memory(&decoded.bytes)?;
        assert_eq!((png.width(), png.height()), (8, 4));
        Ok(())
    }

    #[test]
    fn markers_reach_refusal_and_empty_branches() -> anyhow::Result<()> {
        let model = DryrunImageModel::default();
        let refused = model.generate("please [refuse] this", &[])?;
        assert!(refused.image.is_none());
        assert!(refused.text.is_some());

        let empty = model.generate("[empty]", &[])?;
        assert_eq!(empty, Default::default());
        Ok(())
    }
}
