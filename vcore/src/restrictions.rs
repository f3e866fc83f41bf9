//! Tool restriction flags.
//!
//! A [`Restrictions`] value is signalled once per sequence and passed by value
//! into every component that has a decision point gated by one of the flags.

macro_rules! restriction_flags {
    ($( $group:ident => [ $( $flag:ident ),* $(,)? ] ),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct Restrictions {
            $( $( pub $flag: bool, )* )*
        }

        impl Restrictions {
            pub const FLAG_NAMES: &'static [&'static str] = &[
                $( $( stringify!($flag), )* )*
            ];

            pub fn flags(&self) -> Vec<bool> {
                vec![ $( $( self.$flag, )* )* ]
            }

            pub fn from_flags(bits: &[bool]) -> Self {
                let mut it = bits.iter().copied();
                Self {
                    $( $( $flag: it.next().unwrap_or(false), )* )*
                }
            }

            pub fn set_by_name(&mut self, name: &str, value: bool) -> bool {
                match name {
                    $( $( stringify!($flag) => { self.$flag = value; true } )* )*
                    _ => false,
                }
            }

            pub fn set_all(&mut self, value: bool) {
                $( $( self.$flag = value; )* )*
            }

            $(
                pub fn $group(&self) -> bool {
                    false $( || self.$flag )*
                }
            )*
        }
    };
}

restriction_flags! {
    intra_restrictions => [
        disable_intra_ref_padding,
        disable_intra_ref_sample_filter,
        disable_intra_dc_post_filter,
        disable_intra_ver_hor_post_filter,
        disable_intra_planar,
        disable_intra_mpm_prediction,
        disable_intra_chroma_predictor,
    ],
    inter_restrictions => [
        disable_inter_mvp,
        disable_inter_scaling_mvp,
        disable_inter_tmvp_mvp,
        disable_inter_tmvp_merge,
        disable_inter_tmvp_ref_list_derivation,
        disable_inter_merge_candidates,
        disable_inter_merge_mode,
        disable_inter_merge_bipred,
        disable_inter_skip_mode,
        disable_inter_chroma_subpel,
        disable_inter_mvd_greater_than_flags,
        disable_inter_bipred,
    ],
    transform_restrictions => [
        disable_transform_adaptive_scan_order,
        disable_transform_residual_greater_than_flags,
        disable_transform_residual_greater2,
        disable_transform_last_position,
        disable_transform_root_cbf,
        disable_transform_cbf,
        disable_transform_subblock_csbf,
        disable_transform_sign_hiding,
        disable_transform_adaptive_exp_golomb,
    ],
    cabac_restrictions => [
        disable_cabac_ctx_update,
        disable_cabac_split_flag_ctx,
        disable_cabac_skip_flag_ctx,
        disable_cabac_inter_dir_ctx,
        disable_cabac_subblock_csbf_ctx,
        disable_cabac_coeff_sig_ctx,
        disable_cabac_coeff_greater1_ctx,
        disable_cabac_coeff_greater2_ctx,
        disable_cabac_coeff_last_pos_ctx,
        disable_cabac_init_per_pic_type,
        disable_cabac_init_per_qp,
    ],
    deblock_restrictions => [
        disable_deblock_strong_filter,
        disable_deblock_weak_filter,
        disable_deblock_chroma_filter,
        disable_deblock_boundary_strength_zero,
        disable_deblock_boundary_strength_one,
        disable_deblock_initial_sample_decision,
        disable_deblock_weak_sample_decision,
        disable_deblock_two_samples_weak_filter,
        disable_deblock_depending_on_qp,
    ],
    high_level_restrictions => [
        disable_high_level_default_checksum_method,
    ],
    ext_restrictions => [
        disable_ext_sink,
        disable_ext_implicit_last_ctu,
        disable_ext_tmvp_full_resolution,
        disable_ext_tmvp_exclude_intra_from_ref_list,
        disable_ext_ref_list_l0_trim,
        disable_ext_implicit_partition_type,
        disable_ext_cabac_alt_split_flag_ctx,
        disable_ext_cabac_alt_inter_dir_ctx,
        disable_ext_cabac_alt_last_pos_ctx,
        disable_ext_two_cu_trees,
        disable_ext_transform_size_64,
        disable_ext_intra_unrestricted_predictor,
        disable_ext_deblock_subblock_size_4,
    ],
    ext2_restrictions => [
        disable_ext2_intra_67_modes,
        disable_ext2_intra_6_predictors,
        disable_ext2_intra_chroma_from_luma,
        disable_ext2_inter_adaptive_fullpel_mv,
        disable_ext2_inter_affine,
        disable_ext2_inter_affine_merge,
        disable_ext2_inter_affine_mvp,
        disable_ext2_inter_bipred_l1_mvd_zero,
        disable_ext2_inter_high_precision_mv,
        disable_ext2_inter_local_illumination_comp,
        disable_ext2_transform_skip,
        disable_ext2_transform_high_precision,
        disable_ext2_transform_select,
        disable_ext2_transform_dst,
        disable_ext2_cabac_alt_residual_ctx,
    ],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestrictedMode {
    #[default]
    Unrestricted,
    ModeA,
    ModeB,
    ModeC,
    ModeD,
}

impl RestrictedMode {
    pub fn to_u8(self) -> u8 {
        match self {
            RestrictedMode::Unrestricted => 0,
            RestrictedMode::ModeA => 1,
            RestrictedMode::ModeB => 2,
            RestrictedMode::ModeC => 3,
            RestrictedMode::ModeD => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RestrictedMode::Unrestricted),
            1 => Some(RestrictedMode::ModeA),
            2 => Some(RestrictedMode::ModeB),
            3 => Some(RestrictedMode::ModeC),
            4 => Some(RestrictedMode::ModeD),
            _ => None,
        }
    }
}

impl Restrictions {
    pub fn new(mode: RestrictedMode) -> Self {
        let mut r = Self::default();
        r.enable_restricted_mode(mode);
        r
    }

    /// Applies a preset on top of the current flags. Presets are cumulative:
    /// every mode also carries the restrictions of the modes before it.
    pub fn enable_restricted_mode(&mut self, mode: RestrictedMode) {
        if mode == RestrictedMode::Unrestricted {
            return;
        }
        self.disable_ext2_intra_67_modes = true;
        self.disable_ext2_intra_6_predictors = true;
        self.disable_ext2_intra_chroma_from_luma = true;
        self.disable_ext2_inter_adaptive_fullpel_mv = true;
        self.disable_ext2_inter_affine = true;
        self.disable_ext2_inter_affine_merge = true;
        self.disable_ext2_inter_affine_mvp = true;
        self.disable_ext2_inter_local_illumination_comp = true;
        self.disable_ext2_transform_high_precision = true;
        self.disable_ext2_transform_select = true;
        if mode == RestrictedMode::ModeA {
            return;
        }
        self.disable_ext_transform_size_64 = true;
        self.disable_ext_tmvp_full_resolution = true;
        self.disable_ext_deblock_subblock_size_4 = true;
        self.disable_ext2_transform_skip = true;
        self.disable_ext2_inter_bipred_l1_mvd_zero = true;
        if mode == RestrictedMode::ModeB {
            return;
        }
        self.disable_inter_merge_bipred = true;
        self.disable_inter_tmvp_mvp = true;
        self.disable_inter_tmvp_merge = true;
        self.disable_intra_mpm_prediction = true;
        self.disable_transform_adaptive_scan_order = true;
        if mode == RestrictedMode::ModeC {
            return;
        }
        self.set_all(true);
        // Merge and cbf signalling stay on in every mode.
        self.disable_inter_merge_mode = false;
        self.disable_transform_cbf = false;
        self.disable_transform_root_cbf = false;
    }

    /// True when none of the extension tools are in use.
    pub fn check_baseline_compatibility(&self) -> bool {
        Self::FLAG_NAMES
            .iter()
            .zip(self.flags())
            .filter(|(name, _)| name.starts_with("disable_ext"))
            .all(|(_, set)| set)
    }

    pub fn max_transform_size(&self) -> i32 {
        if self.disable_ext_transform_size_64 { 32 } else { 64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unrestricted() {
        let r = Restrictions::default();
        assert!(!r.intra_restrictions());
        assert!(!r.inter_restrictions());
        assert!(!r.ext2_restrictions());
        assert_eq!(r.max_transform_size(), 64);
    }

    #[test]
    fn flags_roundtrip_through_bit_vector() {
        let mut r = Restrictions::default();
        r.disable_deblock_weak_filter = true;
        r.disable_ext2_inter_affine = true;
        let bits = r.flags();
        assert_eq!(bits.len(), Restrictions::FLAG_NAMES.len());
        assert_eq!(Restrictions::from_flags(&bits), r);
    }

    #[test]
    fn set_by_name() {
        let mut r = Restrictions::default();
        assert!(r.set_by_name("disable_inter_bipred", true));
        assert!(r.disable_inter_bipred);
        assert!(r.inter_restrictions());
        assert!(!r.set_by_name("no_such_flag", true));
    }

    #[test]
    fn modes_are_cumulative() {
        let a = Restrictions::new(RestrictedMode::ModeA);
        let b = Restrictions::new(RestrictedMode::ModeB);
        assert!(a.disable_ext2_transform_select);
        assert!(!a.disable_ext_transform_size_64);
        assert!(b.disable_ext2_transform_select);
        assert!(b.disable_ext_transform_size_64);
        assert_eq!(b.max_transform_size(), 32);
    }

    #[test]
    fn mode_d_is_baseline() {
        let d = Restrictions::new(RestrictedMode::ModeD);
        assert!(d.check_baseline_compatibility());
        assert!(!Restrictions::default().check_baseline_compatibility());
        assert!(!d.disable_inter_merge_mode);
    }
}
