//! Image encoding: `DynamicImage` → PNG bytes.
//!
//! PNG is lossless; rendered slide text stays crisp when the workspace
//! displays the image inline, and diagrams keep hard edges.

use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Media type of every extracted page.
pub const PNG_MIME: &str = "image/png";

/// Encode a rendered page or crop as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
