use std::sync::Arc;

use ndarray::ArrayView3;

/// Integer pixel rectangle with positive area, fully inside its frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A decoded video frame as RGB bytes in row-major order.
///
/// Pixel data sits behind an `Arc` so a frame can be handed to several
/// detector threads without copying.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data: data.into(),
            width,
            height,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `rect` into a new frame.
    ///
    /// `rect` must lie inside the frame; `Region::crop_rect` produces such
    /// rectangles.
    pub fn crop(&self, rect: CropRect) -> Frame {
        let c = self.channels as usize;
        let stride = self.width as usize * c;
        let row_len = rect.width as usize * c;
        let mut data = Vec::with_capacity(row_len * rect.height as usize);
        for row in rect.y as usize..(rect.y + rect.height) as usize {
            let start = row * stride + rect.x as usize * c;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Frame::new(data, rect.width, rect.height, self.channels)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
