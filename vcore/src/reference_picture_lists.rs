use std::sync::Arc;

use crate::common::{PicNum, PicturePredictionType};
use crate::cu_types::{InterDir, RefPicList};
use crate::picture_data::MotionField;
use crate::yuv_pic::YuvPicture;

/// One decoded picture available for inter prediction.
#[derive(Debug, Clone)]
pub struct RefEntry {
    pub poc: PicNum,
    pub pic_type: PicturePredictionType,
    pub tid: u32,
    pub rec: Arc<YuvPicture>,
    /// Source picture, only known on the encoder side.
    pub orig: Option<Arc<YuvPicture>>,
    pub motion: Arc<MotionField>,
}

#[derive(Debug, Clone)]
pub struct ReferencePictureLists {
    lists: [Vec<RefEntry>; 2],
    current_poc: PicNum,
    only_back_references: bool,
}

impl Default for ReferencePictureLists {
    fn default() -> Self {
        Self {
            lists: [Vec::new(), Vec::new()],
            current_poc: 0,
            only_back_references: true,
        }
    }
}

impl ReferencePictureLists {
    pub fn is_list_used(list: RefPicList, dir: InterDir) -> bool {
        matches!(
            (dir, list),
            (InterDir::Bi, _) | (InterDir::L0, RefPicList::L0) | (InterDir::L1, RefPicList::L1)
        )
    }

    /// Empties both lists ahead of coding picture `current_poc`.
    pub fn reset(&mut self, current_poc: PicNum) {
        self.lists[0].clear();
        self.lists[1].clear();
        self.current_poc = current_poc;
        self.only_back_references = true;
    }

    pub fn current_poc(&self) -> PicNum {
        self.current_poc
    }

    pub fn num_ref_pics(&self, list: RefPicList) -> usize {
        self.lists[list.index()].len()
    }

    pub fn entry(&self, list: RefPicList, ref_idx: usize) -> &RefEntry {
        &self.lists[list.index()][ref_idx]
    }

    pub fn ref_pic(&self, list: RefPicList, ref_idx: usize) -> &YuvPicture {
        &self.lists[list.index()][ref_idx].rec
    }

    pub fn ref_orig_pic(&self, list: RefPicList, ref_idx: usize) -> Option<&YuvPicture> {
        self.lists[list.index()][ref_idx].orig.as_deref()
    }

    pub fn ref_poc(&self, list: RefPicList, ref_idx: usize) -> PicNum {
        self.lists[list.index()][ref_idx].poc
    }

    pub fn has_ref_poc(&self, list: RefPicList, poc: PicNum) -> bool {
        self.lists[list.index()].iter().any(|e| e.poc == poc)
    }

    pub fn has_only_back_references(&self) -> bool {
        self.only_back_references
    }

    pub fn ref_pic_type(&self, list: RefPicList, ref_idx: usize) -> PicturePredictionType {
        self.lists[list.index()][ref_idx].pic_type
    }

    pub fn ref_pic_tid(&self, list: RefPicList, ref_idx: usize) -> u32 {
        self.lists[list.index()][ref_idx].tid
    }

    pub fn motion_field(&self, list: RefPicList, ref_idx: usize) -> &MotionField {
        &self.lists[list.index()][ref_idx].motion
    }

    /// Places `entry` at `ref_idx`, appending when the index is one past
    /// the end of the list.
    pub fn set_ref_pic(&mut self, list: RefPicList, ref_idx: usize, entry: RefEntry) {
        if entry.poc > self.current_poc {
            self.only_back_references = false;
        }
        let l = &mut self.lists[list.index()];
        assert!(ref_idx <= l.len(), "reference index {ref_idx} skips entries");
        if ref_idx == l.len() {
            l.push(entry);
        } else {
            l[ref_idx] = entry;
        }
    }

    /// For every entry of `list`, the index of the entry in the other list
    /// that refers to the same picture.
    pub fn same_poc_mapping_for(&self, list: RefPicList) -> Vec<Option<usize>> {
        let other = &self.lists[list.other().index()];
        self.lists[list.index()]
            .iter()
            .map(|e| other.iter().position(|o| o.poc == e.poc))
            .collect()
    }
}
