use crate::common::{PicNum, PicturePredictionType};

/// One coded picture: headers, CTU payload and checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pic_type: PicturePredictionType,
    pub poc: PicNum,
}
