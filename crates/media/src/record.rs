//! The narrow view of a recording that players get to see.
//!
//! A recording is a sequence of [Record]s, each belonging to one stream. A
//! record has a [RecordType], a timestamp and a list of blocks, which are
//! either structured metadata ([MetadataLayout]) or images ([ImageSpec] plus
//! bytes). How these get pulled out of a file is somebody else's problem.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::frame::{Dimensions, FrameSpec, PixelLayout};

/// What kind of sensor a stream was recorded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Camera,
    Imu,
    Magnetometer,
    Other,
}

/// Identifies one stream in a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub kind: StreamKind,
    pub instance: u16,
}

impl StreamId {
    pub const fn new(kind: StreamKind, instance: u16) -> Self {
        Self { kind, instance }
    }

    /// The stream's name, e.g. `camera-1`.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// The entity path records of this stream get logged under. The name is
    /// wrapped in double quotes so any stream name is a single path part.
    pub fn entity_path(&self) -> String {
        format!("\"{self}\"")
    }

    pub const fn might_contain_images(&self) -> bool {
        matches!(self.kind, StreamKind::Camera)
    }

    pub const fn might_contain_imu_data(&self) -> bool {
        matches!(self.kind, StreamKind::Imu | StreamKind::Magnetometer)
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StreamKind::Camera => "camera",
            StreamKind::Imu => "imu",
            StreamKind::Magnetometer => "magnetometer",
            StreamKind::Other => "other",
        };
        write!(f, "{kind}-{}", self.instance)
    }
}

/// The role of a record within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Describes the sensor. Usually sent once, before any data.
    Configuration,
    /// Sensor data.
    Data,
    State,
    Tags,
}

/// The header of the record currently being read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordInfo {
    pub stream: StreamId,
    pub record_type: RecordType,
    /// Seconds since the start of the recording's clock.
    pub timestamp: f64,
}

/// One named value in a [MetadataLayout].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    F32Array(Vec<f32>),
    String(String),
}

impl Display for MetadataValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::F32Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::String(v) => write!(f, "\"{v}\""),
        }
    }
}

/// A block of structured metadata: named values in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataLayout {
    fields: Vec<(String, MetadataValue)>,
}

impl MetadataLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style version of [Self::push].
    pub fn with(mut self, name: impl Into<String>, value: MetadataValue) -> Self {
        self.push(name, value);
        self
    }

    /// Append a field. A field with the same name that was pushed earlier
    /// shadows this one for lookups.
    pub fn push(&mut self, name: impl Into<String>, value: MetadataValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&MetadataValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// The field as a boolean, [None] if it's missing or has another type.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            MetadataValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The field as an unsigned integer. Non-negative signed values count too.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            MetadataValue::U64(v) => Some(*v),
            MetadataValue::I64(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// The field as a fixed size float array. [None] is returned if the field
    /// is missing, has another type or has a different length than `N`.
    pub fn get_f32_array<const N: usize>(&self, name: &str) -> Option<[f32; N]> {
        match self.get(name)? {
            MetadataValue::F32Array(values) => values.as_slice().try_into().ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// One `name: value` line per field.
impl Display for MetadataLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

/// How the bytes of an image block are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Uncompressed pixels.
    Raw,
    /// A frame of a video stream. Decoding depends on previous frames, so it
    /// always happens in record order on the reading thread.
    Video,
    Jpg,
    Png,
    Jxl,
    /// A codec identified by name.
    Custom(String),
}

impl ImageFormat {
    /// Whether pixels for this format are read on the reading thread (as
    /// opposed to being decoded on a stream's worker).
    pub const fn is_read_synchronously(&self) -> bool {
        matches!(self, Self::Raw | Self::Video)
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Video => f.write_str("video"),
            Self::Jpg => f.write_str("jpg"),
            Self::Png => f.write_str("png"),
            Self::Jxl => f.write_str("jxl"),
            Self::Custom(name) => write!(f, "custom_codec/{name}"),
        }
    }
}

/// Describes an image content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub format: ImageFormat,
    pub dimensions: Dimensions,
    pub layout: PixelLayout,
    /// Bytes per row in raw data, when rows are padded. [None] means rows are
    /// tightly packed.
    #[serde(default)]
    pub stride: Option<usize>,
}

impl ImageSpec {
    pub fn new(format: ImageFormat, dimensions: Dimensions, layout: PixelLayout) -> Self {
        Self {
            format,
            dimensions,
            layout,
            stride: None,
        }
    }

    pub fn raw(dimensions: Dimensions, layout: PixelLayout) -> Self {
        Self::new(ImageFormat::Raw, dimensions, layout)
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = Some(stride);
        self
    }

    pub const fn frame_spec(&self) -> FrameSpec {
        FrameSpec::new(self.dimensions, self.layout)
    }

    pub const fn channel_count(&self) -> usize {
        self.layout.channel_count()
    }
}

/// When displayed, an [ImageSpec] looks like `raw/640x480/rgb8`.
impl Display for ImageSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.format, self.dimensions, self.layout)?;
        if let Some(stride) = self.stride {
            write!(f, "/stride={stride}")?;
        }
        Ok(())
    }
}

/// An image content block as handed to a player: its [ImageSpec] plus the
/// bytes, borrowed from the reader.
#[derive(Debug, Clone, Copy)]
pub struct ImageBlock<'a> {
    pub spec: &'a ImageSpec,
    pub data: &'a [u8],
}

/// One block of a [Record].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBlock {
    Metadata(MetadataLayout),
    Image { spec: ImageSpec, data: Vec<u8> },
}

/// A fully loaded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub info: RecordInfo,
    pub blocks: Vec<RecordBlock>,
}

impl Record {
    pub fn new(stream: StreamId, record_type: RecordType, timestamp: f64) -> Self {
        Self {
            info: RecordInfo {
                stream,
                record_type,
                timestamp,
            },
            blocks: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, layout: MetadataLayout) -> Self {
        self.blocks.push(RecordBlock::Metadata(layout));
        self
    }

    pub fn with_image(mut self, spec: ImageSpec, data: Vec<u8>) -> Self {
        self.blocks.push(RecordBlock::Image { spec, data });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_path_is_quoted_stream_name() {
        let id = StreamId::new(StreamKind::Camera, 214);
        assert_eq!(id.name(), "camera-214");
        assert_eq!(id.entity_path(), "\"camera-214\"");
    }

    #[test]
    fn typed_getters_reject_mismatches() {
        let layout = MetadataLayout::new()
            .with("frame_number", MetadataValue::U64(42))
            .with("exposure", MetadataValue::I64(-3))
            .with("accelerometer", MetadataValue::F32Array(vec![0.0, 9.81, 0.5]))
            .with("has_gyroscope", MetadataValue::Bool(true));

        assert_eq!(layout.get_u64("frame_number"), Some(42));
        assert_eq!(layout.get_u64("exposure"), None);
        assert_eq!(layout.get_u64("missing"), None);
        assert_eq!(layout.get_bool("has_gyroscope"), Some(true));
        assert_eq!(layout.get_bool("frame_number"), None);
        assert_eq!(
            layout.get_f32_array::<3>("accelerometer"),
            Some([0.0, 9.81, 0.5])
        );
        assert_eq!(layout.get_f32_array::<4>("accelerometer"), None);
    }

    #[test]
    fn layout_prints_one_field_per_line() {
        let layout = MetadataLayout::new()
            .with("device_type", MetadataValue::String("slam".into()))
            .with("gains", MetadataValue::F32Array(vec![1.0, 2.5]));

        assert_eq!(layout.to_string(), "device_type: \"slam\"\ngains: [1, 2.5]\n");
    }

    #[test]
    fn image_spec_display() {
        let spec = ImageSpec::raw((4, 2).into(), PixelLayout::Grey8).with_stride(8);
        assert_eq!(spec.to_string(), "raw/4x2/grey8/stride=8");
    }
}
