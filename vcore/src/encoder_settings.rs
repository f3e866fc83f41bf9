//! Speed presets and explicit tuning knobs of the mode decision.

use std::str::FromStr;

use crate::error::{CodecError, Result};
use crate::restrictions::RestrictedMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMode {
    Placebo,
    #[default]
    Slow,
    Fast,
}

impl FromStr for SpeedMode {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "placebo" | "0" => Ok(SpeedMode::Placebo),
            "slow" | "1" => Ok(SpeedMode::Slow),
            "fast" | "2" => Ok(SpeedMode::Fast),
            _ => Err(CodecError::InvalidSettingValue {
                key: "speed_mode".into(),
                value: s.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Integer search range, in luma samples, for distant references.
    pub inter_search_range_uni_max: i32,
    /// Integer search range for the nearest reference.
    pub inter_search_range_uni_min: i32,
    pub bipred_refinement_iterations: i32,
    pub always_evaluate_intra_in_inter: bool,
    pub default_num_ref_pics: i32,
    pub max_binary_split_depth: i32,
    /// Stop trying transform select indices once one loses to DCT2.
    pub fast_transform_select_eval: bool,
    /// 0 evaluates every intra mode with full RDO, 1 and 2 preselect the
    /// candidates by SATD (2 keeps fewer of them).
    pub fast_intra_mode_eval_level: i32,
    /// Blocks with a 64 sample side keep their transform result without
    /// comparing against a zero residual.
    pub fast_transform_size_64: bool,
    /// Transform select is only tried when DCT2 leaves coefficients.
    pub fast_transform_select: bool,
    /// LIC is only tried when the prediction has a visible DC offset.
    pub fast_inter_local_illumination_comp: bool,
    /// Full-pel motion is only tried when it costs no distortion.
    pub fast_inter_adaptive_fullpel_mv: bool,
    /// The residual-free merge pass is dropped once a merge candidate won
    /// without any residual.
    pub fast_merge_eval: bool,
    /// Quad split is skipped when the leaf beats the binary splits: level 1
    /// needs both binary splits tried, level 2 and above any of them.
    pub fast_quad_split_based_on_binary_split: i32,
    pub skip_mode_decision_for_identical_cu: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::new(SpeedMode::default())
    }
}

impl EncoderSettings {
    pub fn new(speed_mode: SpeedMode) -> Self {
        let mut settings = Self {
            inter_search_range_uni_max: 256,
            inter_search_range_uni_min: 64,
            bipred_refinement_iterations: 1,
            always_evaluate_intra_in_inter: false,
            default_num_ref_pics: 2,
            max_binary_split_depth: 2,
            fast_transform_select_eval: false,
            fast_intra_mode_eval_level: 1,
            fast_transform_size_64: false,
            fast_transform_select: false,
            fast_inter_local_illumination_comp: false,
            fast_inter_adaptive_fullpel_mv: false,
            fast_merge_eval: false,
            fast_quad_split_based_on_binary_split: 0,
            skip_mode_decision_for_identical_cu: false,
        };
        settings.apply_speed_mode(speed_mode);
        settings
    }

    pub fn apply_speed_mode(&mut self, speed_mode: SpeedMode) {
        match speed_mode {
            SpeedMode::Placebo => {
                self.inter_search_range_uni_max = 384;
                self.inter_search_range_uni_min = 96;
                self.bipred_refinement_iterations = 4;
                self.always_evaluate_intra_in_inter = true;
                self.default_num_ref_pics = 3;
                self.max_binary_split_depth = 3;
                self.fast_transform_select_eval = false;
                self.fast_intra_mode_eval_level = 1;
                self.fast_transform_size_64 = false;
                self.fast_transform_select = false;
                self.fast_inter_local_illumination_comp = false;
                self.fast_inter_adaptive_fullpel_mv = false;
            }
            SpeedMode::Slow => {
                self.bipred_refinement_iterations = 1;
                self.always_evaluate_intra_in_inter = false;
                self.default_num_ref_pics = 2;
                self.max_binary_split_depth = 2;
                self.fast_transform_select_eval = true;
                self.fast_intra_mode_eval_level = 1;
                self.fast_transform_size_64 = false;
                self.fast_transform_select = false;
                self.fast_inter_local_illumination_comp = false;
                self.fast_inter_adaptive_fullpel_mv = false;
            }
            SpeedMode::Fast => {
                self.bipred_refinement_iterations = 1;
                self.always_evaluate_intra_in_inter = false;
                self.default_num_ref_pics = 1;
                self.max_binary_split_depth = 2;
                self.fast_transform_select_eval = true;
                self.fast_intra_mode_eval_level = 2;
                self.fast_transform_size_64 = true;
                self.fast_transform_select = true;
                self.fast_inter_local_illumination_comp = true;
                self.fast_inter_adaptive_fullpel_mv = true;
                self.skip_mode_decision_for_identical_cu = true;
            }
        }
    }

    /// Adjusts the settings to what a restricted decoder profile can use.
    /// Mode C keeps the speed preset untouched.
    pub fn apply_restricted_mode(&mut self, mode: RestrictedMode) {
        if matches!(mode, RestrictedMode::Unrestricted | RestrictedMode::ModeC) {
            return;
        }
        self.inter_search_range_uni_max = 256;
        self.inter_search_range_uni_min = 96;
        self.bipred_refinement_iterations = 1;
        self.always_evaluate_intra_in_inter = false;
        self.default_num_ref_pics = 2;
        self.fast_transform_select_eval = true;
        self.fast_intra_mode_eval_level = 2;
        self.fast_transform_size_64 = false;
        self.fast_transform_select = false;
        self.fast_inter_local_illumination_comp = false;
        self.fast_inter_adaptive_fullpel_mv = false;
        self.fast_merge_eval = true;
        self.fast_quad_split_based_on_binary_split = 2;
        match mode {
            RestrictedMode::ModeA => {
                self.max_binary_split_depth = 0;
                self.fast_intra_mode_eval_level = 1;
                self.fast_merge_eval = false;
            }
            RestrictedMode::ModeB => self.max_binary_split_depth = 2,
            RestrictedMode::ModeD => self.max_binary_split_depth = 3,
            RestrictedMode::Unrestricted | RestrictedMode::ModeC => {}
        }
    }

    /// Applies overrides written as `key=value` pairs separated by `;` or
    /// whitespace, e.g. `max_binary_split_depth=1; fast_merge_eval=1`.
    pub fn parse_explicit(&mut self, settings: &str) -> Result<()> {
        let pairs = settings
            .split(|c: char| c == ';' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CodecError::UnknownSetting(pair.to_string()))?;
            self.set(key.trim(), value.trim())?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let int = || -> Result<i32> {
            value.parse::<i32>().map_err(|_| CodecError::InvalidSettingValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        };
        let flag = || -> Result<bool> {
            match value {
                "0" | "false" => Ok(false),
                "1" | "true" => Ok(true),
                _ => Err(CodecError::InvalidSettingValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        };
        match key {
            "inter_search_range_uni_max" => self.inter_search_range_uni_max = int()?,
            "inter_search_range_uni_min" => self.inter_search_range_uni_min = int()?,
            "bipred_refinement_iterations" => self.bipred_refinement_iterations = int()?,
            "always_evaluate_intra_in_inter" => self.always_evaluate_intra_in_inter = flag()?,
            "default_num_ref_pics" => self.default_num_ref_pics = int()?,
            "max_binary_split_depth" => self.max_binary_split_depth = int()?,
            "fast_transform_select_eval" => self.fast_transform_select_eval = flag()?,
            "fast_intra_mode_eval_level" => self.fast_intra_mode_eval_level = int()?,
            "fast_transform_size_64" => self.fast_transform_size_64 = flag()?,
            "fast_transform_select" => self.fast_transform_select = flag()?,
            "fast_inter_local_illumination_comp" => self.fast_inter_local_illumination_comp = flag()?,
            "fast_inter_adaptive_fullpel_mv" => self.fast_inter_adaptive_fullpel_mv = flag()?,
            "fast_merge_eval" => self.fast_merge_eval = flag()?,
            "fast_quad_split_based_on_binary_split" => self.fast_quad_split_based_on_binary_split = int()?,
            "skip_mode_decision_for_identical_cu" => self.skip_mode_decision_for_identical_cu = flag()?,
            _ => return Err(CodecError::UnknownSetting(key.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_in_effort() {
        let placebo = EncoderSettings::new(SpeedMode::Placebo);
        let fast = EncoderSettings::new(SpeedMode::Fast);
        assert_eq!(placebo.max_binary_split_depth, 3);
        assert_eq!(placebo.inter_search_range_uni_max, 384);
        assert!(placebo.always_evaluate_intra_in_inter);
        assert_eq!(fast.default_num_ref_pics, 1);
        assert!(fast.fast_transform_size_64);
        assert_eq!(EncoderSettings::default(), EncoderSettings::new(SpeedMode::Slow));
    }

    #[test]
    fn explicit_overrides() {
        let mut s = EncoderSettings::default();
        s.parse_explicit("max_binary_split_depth=1; fast_merge_eval=1 default_num_ref_pics=3")
            .unwrap();
        assert_eq!(s.max_binary_split_depth, 1);
        assert!(s.fast_merge_eval);
        assert_eq!(s.default_num_ref_pics, 3);
    }

    #[test]
    fn rejects_unknown_and_invalid() {
        let mut s = EncoderSettings::default();
        assert_eq!(
            s.parse_explicit("no_such_key=1"),
            Err(CodecError::UnknownSetting("no_such_key".into()))
        );
        assert!(matches!(
            s.parse_explicit("fast_merge_eval=maybe"),
            Err(CodecError::InvalidSettingValue { .. })
        ));
        assert!(s.parse_explicit("max_binary_split_depth").is_err());
    }

    #[test]
    fn restricted_mode_a_disables_binary_splits() {
        let mut s = EncoderSettings::new(SpeedMode::Placebo);
        s.apply_restricted_mode(RestrictedMode::ModeA);
        assert_eq!(s.max_binary_split_depth, 0);
        let mut c = EncoderSettings::new(SpeedMode::Placebo);
        c.apply_restricted_mode(RestrictedMode::ModeC);
        assert_eq!(c, EncoderSettings::new(SpeedMode::Placebo));
    }

    #[test]
    fn speed_mode_names() {
        assert_eq!("fast".parse::<SpeedMode>().unwrap(), SpeedMode::Fast);
        assert_eq!("Placebo".parse::<SpeedMode>().unwrap(), SpeedMode::Placebo);
        assert!("turbo".parse::<SpeedMode>().is_err());
    }
}
