use crate::common::{ChromaFormat, Cost, Distortion, MAX_QP, MIN_QP, PicturePredictionType, YuvComponent};

const CHROMA_QP_MAX: i32 = 57;
const NUM_SCALING_LIST_REM: i32 = 6;

/// Chroma QP for 4:2:0 indexed by the clamped luma QP.
const CHROMA_SCALE: [u8; (CHROMA_QP_MAX + 1) as usize] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 29, 30, 31, 32, 33, 33, 34, 34, 35, 35, 36, 36, 37, 37, 38, 39, 40, 41, 42, 43, 44,
    45, 46, 47, 48, 49, 50, 51,
];

pub const FWD_QUANT_SCALES: [i32; NUM_SCALING_LIST_REM as usize] = [26214, 23302, 20560, 18396, 16384, 14564];
pub const INV_QUANT_SCALES: [i32; NUM_SCALING_LIST_REM as usize] = [40, 45, 51, 57, 64, 72];

/// Quantization parameter of one block together with the derived
/// rate-distortion weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Qp {
    qp_raw: [i32; 3],
    qp_bitdepth: [i32; 3],
    distortion_weight: [f64; 3],
    lambda: [f64; 3],
    lambda_sqrt: f64,
}

impl Qp {
    /// `lambda` is given in the 8-bit sample domain and rescaled for the
    /// squared error range of `bitdepth`.
    pub fn new(qp: i32, chroma_format: ChromaFormat, bitdepth: u8, lambda: f64, chroma_offset: i32) -> Self {
        let qp = qp.clamp(MIN_QP, MAX_QP);
        let bd_offset = 6 * (bitdepth as i32 - 8);
        let chroma = scale_chroma_qp(qp + chroma_offset, chroma_format);
        let qp_raw = [qp, chroma, chroma];
        let qp_bitdepth = qp_raw.map(|q| q + bd_offset);
        let chroma_weight = chroma_dist_weight(qp, chroma);
        let distortion_weight = [1.0, chroma_weight, chroma_weight];
        let lambda = lambda * (1u64 << (2 * (bitdepth as u32 - 8))) as f64;
        Self {
            qp_raw,
            qp_bitdepth,
            distortion_weight,
            lambda: [lambda, lambda / chroma_weight, lambda / chroma_weight],
            lambda_sqrt: lambda.sqrt(),
        }
    }

    pub fn qp_raw(&self, comp: YuvComponent) -> i32 {
        self.qp_raw[comp.index()]
    }

    pub fn qp_per(&self, comp: YuvComponent) -> i32 {
        self.qp_bitdepth[comp.index()] / NUM_SCALING_LIST_REM
    }

    pub fn qp_rem(&self, comp: YuvComponent) -> usize {
        (self.qp_bitdepth[comp.index()] % NUM_SCALING_LIST_REM) as usize
    }

    pub fn fwd_scale(&self, comp: YuvComponent) -> i32 {
        FWD_QUANT_SCALES[self.qp_rem(comp)]
    }

    pub fn inv_scale(&self, comp: YuvComponent) -> i32 {
        INV_QUANT_SCALES[self.qp_rem(comp)] << self.qp_per(comp)
    }

    pub fn distortion_weight(&self, comp: YuvComponent) -> f64 {
        self.distortion_weight[comp.index()]
    }

    pub fn lambda(&self) -> f64 {
        self.lambda[0]
    }

    pub fn lambda_sqrt(&self) -> f64 {
        self.lambda_sqrt
    }

    pub fn lambda_scaled(&self, comp: YuvComponent) -> f64 {
        self.lambda[comp.index()]
    }

    /// Luma-equivalent distortion of one component.
    pub fn weighted_distortion(&self, comp: YuvComponent, dist: Distortion) -> Distortion {
        if comp.is_luma() {
            dist
        } else {
            (dist as f64 * self.distortion_weight[comp.index()] + 0.5) as Distortion
        }
    }

    /// Lagrangian cost `dist + lambda * bits`.
    pub fn cost(&self, dist: Distortion, bits: u32) -> Cost {
        dist + (self.lambda[0] * bits as f64 + 0.5) as Cost
    }

    /// Lambda for a picture in the 8-bit domain. Non-zero temporal layers get
    /// a larger lambda so that they spend fewer bits than their references.
    pub fn calculate_lambda(qp: i32, pic_type: PicturePredictionType, temporal_id: u32) -> f64 {
        let base = 2f64.powf((qp - 12) as f64 / 3.0);
        match pic_type {
            PicturePredictionType::Intra => 0.57 * base,
            _ => {
                let temporal_factor = if temporal_id == 0 {
                    1.0
                } else {
                    ((qp - 12) as f64 / 6.0).clamp(2.0, 4.0)
                };
                0.442 * base * temporal_factor
            }
        }
    }

    pub fn qp_from_lambda(bitdepth: u8, lambda: f64) -> i32 {
        let lambda = lambda / (1u64 << (2 * (bitdepth as u32 - 8))) as f64;
        ((4.2005 * lambda.ln() + 13.7122).round() as i32).clamp(MIN_QP, MAX_QP)
    }
}

fn scale_chroma_qp(qp: i32, chroma_format: ChromaFormat) -> i32 {
    if chroma_format == ChromaFormat::Yuv420 {
        CHROMA_SCALE[qp.clamp(0, CHROMA_QP_MAX) as usize] as i32
    } else {
        qp.clamp(0, 51)
    }
}

fn chroma_dist_weight(luma_qp: i32, chroma_qp: i32) -> f64 {
    2f64.powf((luma_qp - chroma_qp) as f64 / 3.0)
}
