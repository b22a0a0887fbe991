//! Contains [ImuPlayer], the player for IMU and magnetometer streams.

use std::sync::Arc;

use super::{StreamPlayer, log_record_metadata};
use crate::options::PlayerOptions;
use crate::record::{ImageBlock, MetadataLayout, RecordInfo, RecordType, StreamId};
use crate::sink::Sink;

/// The 3-axis sensors an IMU stream can carry. Each one's readings are logged
/// under `<entity>/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuSensor {
    /// m/s²
    Accelerometer,
    /// rad/s
    Gyroscope,
    /// Tesla
    Magnetometer,
}

impl ImuSensor {
    pub const ALL: [Self; 3] = [Self::Accelerometer, Self::Gyroscope, Self::Magnetometer];

    /// The name of the data field holding this sensor's readings.
    pub const fn field(self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
            Self::Magnetometer => "magnetometer",
        }
    }

    /// The configuration flag saying whether the sensor is present.
    pub const fn config_flag(self) -> &'static str {
        match self {
            Self::Accelerometer => "has_accelerometer",
            Self::Gyroscope => "has_gyroscope",
            Self::Magnetometer => "has_magnetometer",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Logs the readings of an IMU stream as scalar series.
///
/// Which sensors get logged is decided by the stream's configuration record.
/// Until one arrives nothing but metadata is logged. Fields that are missing
/// or have the wrong shape are skipped.
pub struct ImuPlayer {
    stream: StreamId,
    entity_path: String,
    sink: Arc<dyn Sink>,
    timestamp_timeline: String,
    present: [bool; 3],
}

impl ImuPlayer {
    pub fn new(stream: StreamId, sink: Arc<dyn Sink>, options: &PlayerOptions) -> Self {
        Self {
            stream,
            entity_path: stream.entity_path(),
            sink,
            timestamp_timeline: options.timestamp_timeline.clone(),
            present: [false; 3],
        }
    }

    pub fn has_sensor(&self, sensor: ImuSensor) -> bool {
        self.present[sensor.index()]
    }

    fn read_configuration(&mut self, layout: &MetadataLayout) {
        for sensor in ImuSensor::ALL {
            match layout.get_bool(sensor.config_flag()) {
                Some(present) => self.present[sensor.index()] = present,
                None => log::debug!(
                    "Stream {} configuration has no \"{}\" flag.",
                    self.stream,
                    sensor.config_flag()
                ),
            }
        }
    }

    fn log_readings(&self, layout: &MetadataLayout) {
        for sensor in ImuSensor::ALL.into_iter().filter(|s| self.has_sensor(*s)) {
            let Some(reading) = layout.get_f32_array::<3>(sensor.field()) else {
                log::debug!(
                    "Stream {} data record has no 3-axis \"{}\" reading.",
                    self.stream,
                    sensor.field()
                );
                continue;
            };

            self.sink.log_scalars(
                &format!("{}/{}", self.entity_path, sensor.field()),
                &reading.map(f64::from),
            );
        }
    }
}

impl StreamPlayer for ImuPlayer {
    fn on_metadata_read(
        &mut self,
        record: &RecordInfo,
        _block_index: usize,
        layout: &MetadataLayout,
    ) -> bool {
        log_record_metadata(
            &*self.sink,
            &self.entity_path,
            &self.timestamp_timeline,
            record,
            layout,
        );

        match record.record_type {
            RecordType::Configuration => self.read_configuration(layout),
            RecordType::Data => self.log_readings(layout),
            RecordType::State | RecordType::Tags => {}
        }

        true
    }

    // IMU streams don't carry images.
    fn on_image_read(
        &mut self,
        _record: &RecordInfo,
        _block_index: usize,
        _block: &ImageBlock<'_>,
    ) -> bool {
        true
    }
}
