use crate::common::{ChromaFormat, PICTURE_PADDING, Sample, YuvComponent};
use crate::error::{CodecError, Result};

/// Planar picture buffer with an optional replicated border around every
/// plane.
#[derive(Debug, Clone, PartialEq)]
pub struct YuvPicture {
    planes: [Vec<Sample>; 3],
    width: [i32; 3],
    height: [i32; 3],
    stride: [usize; 3],
    pad_x: [i32; 3],
    pad_y: [i32; 3],
    chroma_format: ChromaFormat,
    bitdepth: u8,
}

impl YuvPicture {
    pub fn new(chroma_format: ChromaFormat, width: i32, height: i32, bitdepth: u8, padding: bool) -> Self {
        let mut pic = Self {
            planes: [Vec::new(), Vec::new(), Vec::new()],
            width: [0; 3],
            height: [0; 3],
            stride: [0; 3],
            pad_x: [0; 3],
            pad_y: [0; 3],
            chroma_format,
            bitdepth,
        };
        let mid = 1 << (bitdepth - 1);
        for &comp in chroma_format.components() {
            let c = comp.index();
            let (sx, sy) = if comp.is_luma() {
                (0, 0)
            } else {
                (chroma_format.shift_x(), chroma_format.shift_y())
            };
            pic.width[c] = width >> sx;
            pic.height[c] = height >> sy;
            if padding {
                pic.pad_x[c] = PICTURE_PADDING >> sx;
                pic.pad_y[c] = PICTURE_PADDING >> sy;
            }
            pic.stride[c] = (pic.width[c] + 2 * pic.pad_x[c]) as usize;
            let rows = (pic.height[c] + 2 * pic.pad_y[c]) as usize;
            pic.planes[c] = vec![mid; pic.stride[c] * rows];
        }
        pic
    }

    /// Builds a picture from tightly packed planes.
    pub fn from_planes(
        chroma_format: ChromaFormat,
        width: i32,
        height: i32,
        bitdepth: u8,
        planes: &[&[Sample]],
    ) -> Result<Self> {
        let mut pic = Self::new(chroma_format, width, height, bitdepth, false);
        for &comp in chroma_format.components() {
            let c = comp.index();
            let w = pic.width[c] as usize;
            let h = pic.height[c] as usize;
            let src = planes.get(c).copied().unwrap_or(&[]);
            if src.len() != w * h {
                return Err(CodecError::PlaneSize {
                    plane: c,
                    expected: w * h,
                    got: src.len(),
                });
            }
            for y in 0..h {
                let dst = pic.origin(comp) + y * pic.stride[c];
                pic.planes[c][dst..dst + w].copy_from_slice(&src[y * w..(y + 1) * w]);
            }
        }
        Ok(pic)
    }

    pub fn from_planes_8bit(
        chroma_format: ChromaFormat,
        width: i32,
        height: i32,
        planes: &[&[u8]],
    ) -> Result<Self> {
        let wide: Vec<Vec<Sample>> = planes
            .iter()
            .map(|p| p.iter().map(|&v| v as Sample).collect())
            .collect();
        let refs: Vec<&[Sample]> = wide.iter().map(|p| p.as_slice()).collect();
        Self::from_planes(chroma_format, width, height, 8, &refs)
    }

    /// Copies `src` into a picture of (possibly larger) coded size,
    /// replicating the last column and row into the extra area.
    pub fn padded_to(src: &YuvPicture, coded_width: i32, coded_height: i32, padding: bool) -> Self {
        let mut pic = Self::new(src.chroma_format, coded_width, coded_height, src.bitdepth, padding);
        for &comp in src.chroma_format.components() {
            let (sw, sh) = (src.width(comp), src.height(comp));
            for y in 0..pic.height(comp) {
                for x in 0..pic.width(comp) {
                    let v = src.sample(comp, x.min(sw - 1), y.min(sh - 1));
                    pic.set_sample(comp, x, y, v);
                }
            }
        }
        pic
    }

    /// Unpadded copy of the top-left `width` x `height` luma area and the
    /// matching chroma areas.
    pub fn cropped(&self, width: i32, height: i32) -> Self {
        let mut pic = Self::new(self.chroma_format, width, height, self.bitdepth, false);
        for &comp in self.chroma_format.components() {
            for y in 0..pic.height(comp) {
                let src = self.offset(comp, 0, y);
                let dst = pic.offset(comp, 0, y);
                let w = pic.width(comp) as usize;
                pic.planes[comp.index()][dst..dst + w].copy_from_slice(&self.planes[comp.index()][src..src + w]);
            }
        }
        pic
    }

    /// Tightly packed copy of the top-left `width` x `height` luma area and the
    /// matching chroma areas.
    pub fn cropped_planes(&self, width: i32, height: i32) -> Vec<Vec<Sample>> {
        let mut out = Vec::new();
        for &comp in self.chroma_format.components() {
            let (w, h) = if comp.is_luma() {
                (width, height)
            } else {
                (
                    (width + (1 << self.shift_x(comp)) - 1) >> self.shift_x(comp),
                    (height + (1 << self.shift_y(comp)) - 1) >> self.shift_y(comp),
                )
            };
            let w = w.min(self.width(comp));
            let h = h.min(self.height(comp));
            let mut plane = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                let start = self.offset(comp, 0, y);
                plane.extend_from_slice(&self.planes[comp.index()][start..start + w as usize]);
            }
            out.push(plane);
        }
        out
    }

    #[inline]
    pub fn width(&self, comp: YuvComponent) -> i32 {
        self.width[comp.index()]
    }

    #[inline]
    pub fn height(&self, comp: YuvComponent) -> i32 {
        self.height[comp.index()]
    }

    #[inline]
    pub fn stride(&self, comp: YuvComponent) -> usize {
        self.stride[comp.index()]
    }

    #[inline]
    pub fn bitdepth(&self) -> u8 {
        self.bitdepth
    }

    #[inline]
    pub fn chroma_format(&self) -> ChromaFormat {
        self.chroma_format
    }

    pub fn shift_x(&self, comp: YuvComponent) -> i32 {
        if comp.is_luma() { 0 } else { self.chroma_format.shift_x() }
    }

    pub fn shift_y(&self, comp: YuvComponent) -> i32 {
        if comp.is_luma() { 0 } else { self.chroma_format.shift_y() }
    }

    pub fn pad_x(&self, comp: YuvComponent) -> i32 {
        self.pad_x[comp.index()]
    }

    pub fn pad_y(&self, comp: YuvComponent) -> i32 {
        self.pad_y[comp.index()]
    }

    /// Index of sample (0, 0) inside the plane storage.
    #[inline]
    pub fn origin(&self, comp: YuvComponent) -> usize {
        let c = comp.index();
        self.pad_y[c] as usize * self.stride[c] + self.pad_x[c] as usize
    }

    /// Index of sample (x, y); coordinates may reach into the border.
    #[inline]
    pub fn offset(&self, comp: YuvComponent, x: i32, y: i32) -> usize {
        let c = comp.index();
        debug_assert!(x >= -self.pad_x[c] && x < self.width[c] + self.pad_x[c]);
        debug_assert!(y >= -self.pad_y[c] && y < self.height[c] + self.pad_y[c]);
        ((y + self.pad_y[c]) as usize) * self.stride[c] + (x + self.pad_x[c]) as usize
    }

    #[inline]
    pub fn sample(&self, comp: YuvComponent, x: i32, y: i32) -> Sample {
        self.planes[comp.index()][self.offset(comp, x, y)]
    }

    #[inline]
    pub fn set_sample(&mut self, comp: YuvComponent, x: i32, y: i32, value: Sample) {
        let off = self.offset(comp, x, y);
        self.planes[comp.index()][off] = value;
    }

    pub fn plane(&self, comp: YuvComponent) -> &[Sample] {
        &self.planes[comp.index()]
    }

    pub fn plane_mut(&mut self, comp: YuvComponent) -> &mut [Sample] {
        &mut self.planes[comp.index()]
    }

    /// Copies a `w` x `h` block at (x, y) into `dst` with stride `w`.
    pub fn read_block(&self, comp: YuvComponent, x: i32, y: i32, w: i32, h: i32, dst: &mut [Sample]) {
        let stride = self.stride(comp);
        let plane = &self.planes[comp.index()];
        let mut src = self.offset(comp, x, y);
        for row in dst.chunks_exact_mut(w as usize).take(h as usize) {
            row.copy_from_slice(&plane[src..src + w as usize]);
            src += stride;
        }
    }

    pub fn write_block(&mut self, comp: YuvComponent, x: i32, y: i32, w: i32, h: i32, src: &[Sample]) {
        let stride = self.stride(comp);
        let mut dst = self.offset(comp, x, y);
        let plane = &mut self.planes[comp.index()];
        for row in src.chunks_exact(w as usize).take(h as usize) {
            plane[dst..dst + w as usize].copy_from_slice(row);
            dst += stride;
        }
    }

    /// Replicates the outermost samples into the border area.
    pub fn pad_borders(&mut self) {
        for &comp in self.chroma_format.components() {
            let c = comp.index();
            let (w, h) = (self.width[c], self.height[c]);
            let (px, py) = (self.pad_x[c], self.pad_y[c]);
            if px == 0 && py == 0 {
                continue;
            }
            let stride = self.stride[c];
            for y in 0..h {
                let row = (y + py) as usize * stride;
                let left = self.planes[c][row + px as usize];
                let right = self.planes[c][row + (px + w - 1) as usize];
                self.planes[c][row..row + px as usize].fill(left);
                self.planes[c][row + (px + w) as usize..row + stride].fill(right);
            }
            let first = py as usize * stride;
            let last = (py + h - 1) as usize * stride;
            for y in 0..py as usize {
                self.planes[c].copy_within(first..first + stride, y * stride);
            }
            for y in (py + h) as usize..(h + 2 * py) as usize {
                self.planes[c].copy_within(last..last + stride, y * stride);
            }
        }
    }

    pub fn copy_from(&mut self, other: &YuvPicture) {
        debug_assert_eq!(self.chroma_format, other.chroma_format);
        for &comp in self.chroma_format.components() {
            for y in 0..self.height(comp).min(other.height(comp)) {
                let w = self.width(comp).min(other.width(comp)) as usize;
                let src = other.offset(comp, 0, y);
                let dst = self.offset(comp, 0, y);
                let c = comp.index();
                self.planes[c][dst..dst + w].copy_from_slice(&other.planes[c][src..src + w]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_420() {
        let pic = YuvPicture::new(ChromaFormat::Yuv420, 16, 8, 8, false);
        assert_eq!(pic.width(YuvComponent::Y), 16);
        assert_eq!(pic.height(YuvComponent::U), 4);
        assert_eq!(pic.width(YuvComponent::V), 8);
        assert_eq!(pic.stride(YuvComponent::Y), 16);
        assert_eq!(pic.sample(YuvComponent::Y, 3, 3), 128);
    }

    #[test]
    fn padded_stride_includes_border() {
        let pic = YuvPicture::new(ChromaFormat::Yuv420, 16, 8, 10, true);
        assert_eq!(pic.stride(YuvComponent::Y), (16 + 2 * PICTURE_PADDING) as usize);
        assert_eq!(pic.pad_x(YuvComponent::U), PICTURE_PADDING / 2);
        assert_eq!(pic.sample(YuvComponent::Y, -1, -1), 512);
    }

    #[test]
    fn pad_borders_replicates_edges() {
        let mut pic = YuvPicture::new(ChromaFormat::Yuv444, 8, 8, 8, true);
        pic.set_sample(YuvComponent::Y, 0, 0, 10);
        pic.set_sample(YuvComponent::Y, 7, 7, 200);
        pic.pad_borders();
        assert_eq!(pic.sample(YuvComponent::Y, -5, -7), 10);
        assert_eq!(pic.sample(YuvComponent::Y, 20, 30), 200);
        assert_eq!(pic.sample(YuvComponent::Y, -1, 0), 10);
    }

    #[test]
    fn block_roundtrip() {
        let mut pic = YuvPicture::new(ChromaFormat::Yuv420, 16, 16, 8, true);
        let block: Vec<Sample> = (0..16).collect();
        pic.write_block(YuvComponent::U, 2, 3, 4, 4, &block);
        let mut out = vec![0; 16];
        pic.read_block(YuvComponent::U, 2, 3, 4, 4, &mut out);
        assert_eq!(out, block);
    }

    #[test]
    fn from_planes_rejects_wrong_size() {
        let y = vec![0u8; 16 * 8];
        let u = vec![0u8; 3];
        let v = vec![0u8; 32];
        let err = YuvPicture::from_planes_8bit(ChromaFormat::Yuv420, 16, 8, &[&y, &u, &v]);
        assert!(matches!(err, Err(CodecError::PlaneSize { plane: 1, .. })));
    }

    #[test]
    fn padded_to_replicates_last_row() {
        let y: Vec<u8> = (0..12u8).collect();
        let c = vec![128u8; 6];
        let src = YuvPicture::from_planes_8bit(ChromaFormat::Yuv420, 4, 3, &[&y, &c, &c]);
        // 4x3 luma with 2x1 chroma
        assert!(src.is_err());
        let y: Vec<u8> = (0..16u8).collect();
        let c = vec![128u8; 4];
        let src = YuvPicture::from_planes_8bit(ChromaFormat::Yuv420, 4, 4, &[&y, &c, &c]).unwrap();
        let big = YuvPicture::padded_to(&src, 8, 8, false);
        assert_eq!(big.sample(YuvComponent::Y, 7, 7), 15);
        assert_eq!(big.sample(YuvComponent::Y, 1, 6), 13);
        let planes = big.cropped_planes(4, 4);
        assert_eq!(planes[0], (0..16).collect::<Vec<Sample>>());
    }
}
