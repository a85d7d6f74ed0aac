use bytemuck::{bytes_of, Pod, Zeroable};
use ndarray::Array2;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Serialize, Serializer};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::mem::size_of;

/// Rank of an image array. The hub only produces 2-D (monochrome) frames.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub(crate) enum ImageArrayRank {
    /// 2D.
    Rank2 = 2,
}

/// Wire tag for the element type carried in an imagebytes body.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, TryFromPrimitive, Serialize_repr,
    Deserialize_repr,
)]
#[repr(i32)]
pub enum TransmissionElementType {
    /// `i16` samples.
    I16 = 1,
    /// `i32` samples (the JSON-side element type).
    I32 = 2,
    /// `u8` samples.
    U8 = 6,
    /// `u16` samples.
    U16 = 8,
}

impl TransmissionElementType {
    const fn element_size(self) -> usize {
        match self {
            Self::U8 => size_of::<u8>(),
            Self::I16 | Self::U16 => size_of::<u16>(),
            Self::I32 => size_of::<i32>(),
        }
    }
}

/// A captured frame as a packed 2-D array of pixel samples.
///
/// Samples are widened to `i32` internally (the JSON transmission type);
/// [`TransmissionElementType`] records the narrower type used on the binary
/// imagebytes path. Axis 0 is the image width, so `data[[x, y]]` addresses
/// column `x`, row `y`.
///
/// This type is cheaply clonable.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ImageArray {
    data: ndarray::ArcArray<i32, ndarray::Ix2>,
    transmission_element_type: TransmissionElementType,
}

impl ImageArray {
    /// Pack a raw 1-D frame buffer into the 2-D layout.
    ///
    /// The raw buffer is in readout order: sample `(x, y)` lives at index
    /// `x + y * width`. `bpp` is 8 or 16; 16-bit samples are little-endian.
    pub fn from_raw(width: usize, height: usize, bpp: u32, raw: &[u8]) -> eyre::Result<Self> {
        let (transmission_element_type, element_size) = match bpp {
            8 => (TransmissionElementType::U8, 1_usize),
            16 => (TransmissionElementType::U16, 2_usize),
            _ => eyre::bail!("Unsupported bit depth {bpp}"),
        };
        let expected = width * height * element_size;
        eyre::ensure!(
            raw.len() >= expected,
            "Frame buffer holds {} bytes, expected at least {expected}",
            raw.len()
        );
        let sample = |index: usize| -> i32 {
            match transmission_element_type {
                TransmissionElementType::U8 => i32::from(raw[index]),
                _ => i32::from(u16::from_le_bytes([raw[index * 2], raw[index * 2 + 1]])),
            }
        };
        let data = Array2::from_shape_fn((width, height), |(x, y)| sample(x + y * width));
        Ok(Self {
            data: data.into_shared(),
            transmission_element_type,
        })
    }

    /// Image width in samples.
    pub fn width(&self) -> usize {
        self.data.shape()[0]
    }

    /// Image height in samples.
    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    /// The element type used on the binary transmission path.
    pub fn transmission_element_type(&self) -> TransmissionElementType {
        self.transmission_element_type
    }

    /// Sample at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> i32 {
        self.data[[x, y]]
    }

    /// Serialize into the binary imagebytes envelope.
    ///
    /// Layout: a 44-byte little-endian metadata block followed by the raw
    /// samples in readout order, with the element width given by the
    /// transmission element type.
    pub fn to_image_bytes(
        &self,
        client_transaction_id: Option<u32>,
        server_transaction_id: u32,
    ) -> Vec<u8> {
        let metadata = ImageBytesMetadata {
            metadata_version: 1,
            error_number: 0,
            client_transaction_id: client_transaction_id.unwrap_or(0),
            server_transaction_id,
            data_start: i32::try_from(size_of::<ImageBytesMetadata>())
                .expect("metadata block always fits in i32"),
            image_element_type: self.transmission_element_type.into(),
            transmission_element_type: self.transmission_element_type.into(),
            rank: ImageArrayRank::Rank2.into(),
            dimension_1: i32::try_from(self.width()).expect("image width fits in i32"),
            dimension_2: i32::try_from(self.height()).expect("image height fits in i32"),
            dimension_3: 0,
        };
        let mut bytes = Vec::with_capacity(
            size_of::<ImageBytesMetadata>()
                + self.data.len() * self.transmission_element_type.element_size(),
        );
        bytes.extend_from_slice(bytes_of(&metadata));
        // Samples go out in the same order they were read off the sensor.
        for y in 0..self.height() {
            for x in 0..self.width() {
                let sample = self.data[[x, y]];
                match self.transmission_element_type {
                    TransmissionElementType::U8 => {
                        bytes.push(u8::try_from(sample).unwrap_or(u8::MAX));
                    }
                    _ => bytes.extend_from_slice(
                        &u16::try_from(sample).unwrap_or(u16::MAX).to_le_bytes(),
                    ),
                }
            }
        }
        bytes
    }

    /// Encode an error into the imagebytes envelope, with the message as body.
    pub fn error_image_bytes(
        error: &crate::ASCOMError,
        client_transaction_id: Option<u32>,
        server_transaction_id: u32,
    ) -> Vec<u8> {
        let metadata = ImageBytesMetadata {
            metadata_version: 1,
            error_number: i32::from(error.code.raw()),
            client_transaction_id: client_transaction_id.unwrap_or(0),
            server_transaction_id,
            data_start: i32::try_from(size_of::<ImageBytesMetadata>())
                .expect("metadata block always fits in i32"),
            ..Zeroable::zeroed()
        };
        let mut bytes = Vec::with_capacity(size_of::<ImageBytesMetadata>() + error.message.len());
        bytes.extend_from_slice(bytes_of(&metadata));
        bytes.extend_from_slice(error.message.as_bytes());
        bytes
    }

    /// Whether the client's `Accept` header requests the binary envelope.
    pub(crate) fn is_accepted(headers: &http::HeaderMap) -> bool {
        use mediatype::{MediaType, MediaTypeList};

        const MEDIA_TYPE: MediaType<'static> = MediaType::new(
            mediatype::names::APPLICATION,
            mediatype::Name::new_unchecked("imagebytes"),
        );

        headers
            .get_all(http::header::ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(MediaTypeList::new)
            .filter_map(Result::ok)
            .any(|media_type| media_type.essence() == MEDIA_TYPE)
    }
}

impl Serialize for ImageArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct JsonImageArray<'img> {
            #[serde(rename = "Type")]
            type_: TransmissionElementType,
            rank: ImageArrayRank,
            value: Value<'img>,
        }

        #[derive(Serialize)]
        #[serde(untagged)]
        enum Value<'img> {
            Rank2(#[serde(with = "serde_ndim")] ndarray::ArrayView2<'img, i32>),
        }

        JsonImageArray {
            type_: TransmissionElementType::I32,
            rank: ImageArrayRank::Rank2,
            value: Value::Rank2(self.data.view()),
        }
        .serialize(serializer)
    }
}

#[cfg(not(target_endian = "little"))]
compile_error!("Image handling is only supported on little-endian platforms.");

/// The fixed 44-byte header of the imagebytes envelope.
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
pub(crate) struct ImageBytesMetadata {
    pub(crate) metadata_version: i32,
    pub(crate) error_number: i32,
    pub(crate) client_transaction_id: u32,
    pub(crate) server_transaction_id: u32,
    pub(crate) data_start: i32,
    pub(crate) image_element_type: i32,
    pub(crate) transmission_element_type: i32,
    pub(crate) rank: i32,
    pub(crate) dimension_1: i32,
    pub(crate) dimension_2: i32,
    pub(crate) dimension_3: i32,
}

/// Marker for the imagebytes content-negotiated response path.
#[derive(Debug, Clone)]
pub struct ImageBytesResponse(pub ImageArray);

pub(crate) const IMAGE_BYTES_TYPE: &str = "application/imagebytes";

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> ImageArray {
        // 4x2 16-bit frame, sample (x, y) = 100*y + x.
        let mut raw = Vec::new();
        for y in 0..2_u16 {
            for x in 0..4_u16 {
                raw.extend_from_slice(&(100 * y + x).to_le_bytes());
            }
        }
        ImageArray::from_raw(4, 2, 16, &raw).unwrap()
    }

    #[test]
    fn packs_readout_order_into_columns() {
        let img = sample_frame();
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 2);
        assert_eq!(img.get(0, 0), 0);
        assert_eq!(img.get(3, 0), 3);
        assert_eq!(img.get(0, 1), 100);
        assert_eq!(img.get(3, 1), 103);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(ImageArray::from_raw(4, 2, 16, &[0_u8; 15]).is_err());
        assert!(ImageArray::from_raw(4, 2, 12, &[0_u8; 16]).is_err());
    }

    #[test]
    fn json_form_carries_type_rank_and_grid() {
        let json = serde_json::to_value(sample_frame()).unwrap();
        assert_eq!(json["Type"], 2);
        assert_eq!(json["Rank"], 2);
        // Outer dimension is the width: 4 columns of 2 samples each.
        assert_eq!(
            json["Value"],
            serde_json::json!([[0, 100], [1, 101], [2, 102], [3, 103]])
        );
    }

    #[test]
    fn image_bytes_round_trip() {
        let img = sample_frame();
        let bytes = img.to_image_bytes(Some(42), 7);
        assert_eq!(bytes.len(), 44 + 4 * 2 * 2);

        let metadata: ImageBytesMetadata = bytemuck::pod_read_unaligned(&bytes[..44]);
        assert_eq!(metadata.metadata_version, 1);
        assert_eq!(metadata.error_number, 0);
        assert_eq!(metadata.client_transaction_id, 42);
        assert_eq!(metadata.server_transaction_id, 7);
        assert_eq!(metadata.data_start, 44);
        assert_eq!(metadata.image_element_type, 8);
        assert_eq!(metadata.transmission_element_type, 8);
        assert_eq!(metadata.rank, 2);
        assert_eq!(metadata.dimension_1, 4);
        assert_eq!(metadata.dimension_2, 2);
        assert_eq!(metadata.dimension_3, 0);

        let parsed = ImageArray::from_raw(4, 2, 16, &bytes[44..]).unwrap();
        assert_eq!(parsed, img);
    }

    #[test]
    fn eight_bit_envelope_uses_single_byte_samples() {
        let raw: Vec<u8> = (0..8).collect();
        let img = ImageArray::from_raw(4, 2, 8, &raw).unwrap();
        let bytes = img.to_image_bytes(None, 1);
        assert_eq!(bytes.len(), 44 + 8);
        let metadata: ImageBytesMetadata = bytemuck::pod_read_unaligned(&bytes[..44]);
        assert_eq!(metadata.image_element_type, 6);
        assert_eq!(metadata.client_transaction_id, 0);
        assert_eq!(&bytes[44..], raw.as_slice());
    }

    #[test]
    fn error_envelope_carries_code_and_message() {
        let err = crate::ASCOMError::invalid_operation("no image");
        let bytes = ImageArray::error_image_bytes(&err, Some(9), 10);
        let metadata: ImageBytesMetadata = bytemuck::pod_read_unaligned(&bytes[..44]);
        assert_eq!(metadata.error_number, 0x40B);
        assert_eq!(metadata.rank, 0);
        assert_eq!(&bytes[44..], b"no image");
    }

    #[test]
    fn accept_header_detection() {
        let mut headers = http::HeaderMap::new();
        assert!(!ImageArray::is_accepted(&headers));
        let _ = headers.insert(
            http::header::ACCEPT,
            "application/imagebytes".parse().unwrap(),
        );
        assert!(ImageArray::is_accepted(&headers));
        let _ = headers.insert(
            http::header::ACCEPT,
            "application/json, application/imagebytes;q=0.9"
                .parse()
                .unwrap(),
        );
        assert!(ImageArray::is_accepted(&headers));
        let _ = headers.insert(http::header::ACCEPT, "application/json".parse().unwrap());
        assert!(!ImageArray::is_accepted(&headers));
    }
}
