use std::path::Path;

use crate::{
    blend::overlay_at,
    codec,
    config::{Anchor, OverlaySize, PipelineConfig},
    error::{StampError, StampResult},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositeSettings {
    pub overlay_size: OverlaySize,
    pub anchor: Anchor,
}

impl From<&PipelineConfig> for CompositeSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            overlay_size: cfg.overlay_size,
            anchor: cfg.anchor,
        }
    }
}

/// Stamps one footer onto one piece of art.
#[derive(Clone, Debug, Default)]
pub struct Compositor {
    settings: CompositeSettings,
}

impl Compositor {
    pub fn new(settings: CompositeSettings) -> Self {
        Self { settings }
    }

    /// Decode both inputs, resize the footer, blend it over the art at the
    /// anchor and write the result to `out_path` in the art's own format.
    ///
    /// The output is fully encoded before `out_path` is created, so on error
    /// the file is either absent or untouched.
    pub fn composite(
        &self,
        art_path: &Path,
        footer_path: &Path,
        out_path: &Path,
    ) -> StampResult<()> {
        let bytes = self.render(art_path, footer_path)?;
        std::fs::write(out_path, &bytes).map_err(|e| {
            let _ = std::fs::remove_file(out_path);
            StampError::encode_or_write(format!("write '{}': {e}", out_path.display()))
        })
    }

    /// Produce the encoded composite without touching the filesystem output.
    pub fn render(&self, art_path: &Path, footer_path: &Path) -> StampResult<Vec<u8>> {
        let art = read_and_decode(art_path, "art")?;
        let footer = read_and_decode(footer_path, "footer")?;

        let OverlaySize { width, height } = self.settings.overlay_size;
        let footer = codec::resize(&footer.pixels, width, height);

        let mut merged = art.pixels;
        overlay_at(&mut merged, &footer, self.settings.anchor.x, self.settings.anchor.y);

        codec::encode(merged, art.format)
    }
}

fn read_and_decode(path: &Path, role: &str) -> StampResult<codec::DecodedImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| StampError::asset(format!("open {role} '{}': {e}", path.display())))?;
    codec::decode(&bytes).map_err(|e| match e {
        StampError::Asset(msg) => StampError::asset(format!("{role} '{}': {msg}", path.display())),
        other => other,
    })
}
