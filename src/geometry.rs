//! Frame dimensions and bounding-box fit computation.

/// Width and height in pixels. Also used as the maximum bounding box a
/// preview must fit within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Byte length of one rgb24 frame at this size.
    pub fn rgb24_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Uniform scale that fits `self` inside `bounds` while preserving aspect
    /// ratio. Both dimensions are floored, so the result never exceeds the
    /// bounding box. Callers must validate `self` is nonzero first.
    pub fn scaled_to_fit(&self, bounds: FrameSize) -> FrameSize {
        let w_scale = bounds.width as f64 / self.width as f64;
        let h_scale = bounds.height as f64 / self.height as f64;
        let scale = w_scale.min(h_scale);
        FrameSize {
            width: (self.width as f64 * scale) as u32,
            height: (self.height as f64 * scale) as u32,
        }
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
