// src/engine/raster.rs
//
// The working raster: an ordered sequence of full RGBA frames.
// Still images are a one-frame sequence so every stage has a single code path.

use crate::error::ThumbkitError;
use image::{Delay, Frame, ImageFormat, RgbaImage};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone)]
pub struct Raster {
    frames: Vec<Frame>,
    source_format: Option<ImageFormat>,
}

impl Raster {
    pub fn single(image: RgbaImage, source_format: Option<ImageFormat>) -> Self {
        Self {
            frames: vec![Frame::new(image)],
            source_format,
        }
    }

    /// Build from coalesced frames. Every frame must be a full canvas.
    pub fn from_frames(
        frames: Vec<Frame>,
        source_format: Option<ImageFormat>,
    ) -> Result<Self, ThumbkitError> {
        if frames.is_empty() {
            return Err(ThumbkitError::decode_failed("animation contains no frames"));
        }
        Ok(Self {
            frames,
            source_format,
        })
    }

    pub fn width(&self) -> u32 {
        self.frames[0].buffer().width()
    }

    pub fn height(&self) -> u32 {
        self.frames[0].buffer().height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frames[0].buffer().dimensions()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn first(&self) -> &RgbaImage {
        self.frames[0].buffer()
    }

    #[cfg(test)]
    pub fn into_first(self) -> RgbaImage {
        // from_frames guarantees at least one frame
        self.frames
            .into_iter()
            .next()
            .map(Frame::into_buffer)
            .unwrap_or_default()
    }

    /// Apply `f` to every frame in order, keeping each frame's delay.
    pub fn map_frames<F>(self, mut f: F) -> Self
    where
        F: FnMut(RgbaImage) -> RgbaImage,
    {
        let frames = self
            .frames
            .into_iter()
            .map(|frame| {
                let delay = frame.delay();
                Frame::from_parts(f(frame.into_buffer()), 0, 0, delay)
            })
            .collect();
        Self {
            frames,
            source_format: self.source_format,
        }
    }

    /// Replace the whole sequence with one frame (used by flattening).
    pub fn collapse(self, image: RgbaImage) -> Self {
        Self::single(image, self.source_format)
    }

    /// Per-frame delays in milliseconds, in frame order.
    #[cfg(test)]
    pub fn delays_ms(&self) -> Vec<u32> {
        self.frames
            .iter()
            .map(|frame| delay_ms(frame.delay()))
            .collect()
    }

    /// SHA-256 over dimensions and pixel data of every frame, as lowercase hex.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        for frame in &self.frames {
            let buf = frame.buffer();
            hasher.update(buf.width().to_le_bytes());
            hasher.update(buf.height().to_le_bytes());
            hasher.update(buf.as_raw());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("frames", &self.frames.len())
            .field("source_format", &self.source_format)
            .finish()
    }
}

pub(crate) fn delay_ms(delay: Delay) -> u32 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        0
    } else {
        numer / denom
    }
}
