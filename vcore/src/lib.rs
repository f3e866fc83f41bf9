#![forbid(unsafe_code)]

pub mod bitreader;
pub mod bitwriter;
pub mod checksum;
pub mod coding_unit;
pub mod common;
pub mod cu_decoder;
pub mod cu_encoder;
pub mod cu_reader;
pub mod cu_types;
pub mod cu_writer;
pub mod deblocking;
pub mod decoder;
pub mod encoder;
pub mod encoder_settings;
pub mod error;
pub mod inter_prediction;
pub(crate) mod inter_search;
pub mod intra_prediction;
pub(crate) mod intra_search;
pub mod packet;
pub mod picture_data;
pub mod picture_decoder;
pub mod picture_encoder;
pub mod qp;
pub mod quantize;
pub mod reference_picture_lists;
pub mod residual;
pub mod restrictions;
pub mod sample_metric;
pub mod scan;
pub mod sequence;
pub mod syntax;
pub mod transform;
pub mod transform_encoder;
pub mod y4m;
pub mod yuv_pic;

pub use common::{ChromaFormat, PicturePredictionType, YuvComponent};
pub use decoder::{DecodedPicture, Decoder};
pub use encoder::{Encoder, EncoderConfig, PictureStats};
pub use encoder_settings::{EncoderSettings, SpeedMode};
pub use error::CodecError;
pub use packet::Packet;
pub use restrictions::{RestrictedMode, Restrictions};
pub use yuv_pic::YuvPicture;

pub const DEFAULT_QP: i32 = 32;
pub const DEFAULT_INTRA_PERIOD: u32 = 32;
